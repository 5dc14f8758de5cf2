//! Exercises `bridge_connection` over real loopback sockets: a fake broker
//! listener stands in for the actual broker, and a tungstenite client plays
//! the browser side of the bridge.

use futures_util::{SinkExt, StreamExt};
use hypertcp::framing::{encode, read_exact, read_header, Header};
use hypertcp_bridge::relay::bridge_connection;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn forwards_tcp_frame_to_websocket_as_two_binary_messages() {
    let broker_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let broker_addr = broker_listener.local_addr().unwrap();

    let broker_task = tokio::spawn(async move {
        let (mut sock, _) = broker_listener.accept().await.unwrap();
        sock.write_all(&encode(30, 7, 5)).await.unwrap();
        sock.write_all(b"hello").await.unwrap();
    });

    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();

    let bridge_task = tokio::spawn(async move {
        let (sock, _) = ws_listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(sock).await.unwrap();
        bridge_connection(ws, broker_addr).await.unwrap();
    });

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{ws_addr}"))
        .await
        .unwrap();

    let header_msg = client.next().await.unwrap().unwrap();
    let header_bytes = header_msg.into_data().to_vec();
    let header = Header::decode(&header_bytes.as_slice().try_into().unwrap());
    assert_eq!(header.kind, 30);
    assert_eq!(header.msg_id, 7);
    assert_eq!(header.payload_len, 5);

    let payload_msg = client.next().await.unwrap().unwrap();
    assert_eq!(payload_msg.into_data().to_vec(), b"hello".to_vec());

    broker_task.await.unwrap();
    let _ = client.close(None).await;
    bridge_task.await.unwrap();
}

#[tokio::test]
async fn forwards_websocket_binary_messages_to_tcp_as_raw_bytes() {
    let broker_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let broker_addr = broker_listener.local_addr().unwrap();

    let broker_task = tokio::spawn(async move {
        let (mut sock, _) = broker_listener.accept().await.unwrap();
        let header = read_header(&mut sock).await.unwrap();
        let payload = read_exact(&mut sock, header.payload_len as usize)
            .await
            .unwrap();
        (header, payload)
    });

    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();

    let bridge_task = tokio::spawn(async move {
        let (sock, _) = ws_listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(sock).await.unwrap();
        let _ = bridge_connection(ws, broker_addr).await;
    });

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{ws_addr}"))
        .await
        .unwrap();

    client
        .send(Message::Binary(encode(29, 1, 3).to_vec().into()))
        .await
        .unwrap();
    client
        .send(Message::Binary(b"abc".to_vec().into()))
        .await
        .unwrap();

    let (header, payload) = broker_task.await.unwrap();
    assert_eq!(header.kind, 29);
    assert_eq!(header.payload_len, 3);
    assert_eq!(payload, b"abc".to_vec());

    let _ = client.close(None).await;
    let _ = bridge_task.await;
}
