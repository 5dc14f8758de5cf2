use std::net::SocketAddr;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hypertcp::framing::{read_exact, read_header};
use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

/// Bridges one already-accepted WebSocket connection to a fresh TCP
/// connection against the broker. Runs until either side closes or errors,
/// then tears the other down with a transport-failure close code.
pub async fn bridge_connection(
    ws: WebSocketStream<TcpStream>,
    broker_addr: SocketAddr,
) -> anyhow::Result<()> {
    let tcp = TcpStream::connect(broker_addr).await?;
    let (tcp_read, tcp_write) = tokio::io::split(tcp);
    let (mut ws_sink, ws_source) = ws.split();

    let result = tokio::select! {
        result = tcp_to_ws(tcp_read, &mut ws_sink) => result,
        result = ws_to_tcp(ws_source, tcp_write) => result,
    };

    let _ = ws_sink.send(Message::Close(Some(abnormal_close_frame()))).await;
    let _ = ws_sink.close().await;

    result
}

fn abnormal_close_frame() -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::Error,
        reason: "bridge lost its connection to the broker or browser".into(),
    }
}

/// Reads frames off the broker socket and forwards each as two binary
/// WebSocket messages: the header, then the payload (when non-empty).
async fn tcp_to_ws(
    mut tcp_read: ReadHalf<TcpStream>,
    ws_sink: &mut SplitSink<WebSocketStream<TcpStream>, Message>,
) -> anyhow::Result<()> {
    loop {
        let header = match read_header(&mut tcp_read).await {
            Ok(header) => header,
            Err(_) => break,
        };

        ws_sink
            .send(Message::Binary(header.encode().to_vec().into()))
            .await?;

        if header.payload_len > 0 {
            let payload = read_exact(&mut tcp_read, header.payload_len as usize).await?;
            ws_sink.send(Message::Binary(payload.into())).await?;
        }
    }

    Ok(())
}

/// Reads binary WebSocket messages off the browser socket and writes their
/// bytes straight through to the broker. Text frames are logged and dropped;
/// the browser client is expected to only ever send binary frames.
async fn ws_to_tcp(
    mut ws_source: SplitStream<WebSocketStream<TcpStream>>,
    mut tcp_write: WriteHalf<TcpStream>,
) -> anyhow::Result<()> {
    while let Some(message) = ws_source.next().await {
        match message {
            Ok(Message::Binary(bytes)) => tcp_write.write_all(&bytes).await?,
            Ok(Message::Text(text)) => {
                log::warn!("ignoring unexpected text frame: {}", &*text)
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                log::warn!("websocket read error: {err}");
                break;
            }
        }
    }

    let _ = tcp_write.shutdown().await;
    Ok(())
}
