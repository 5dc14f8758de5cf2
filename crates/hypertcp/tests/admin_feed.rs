//! End-to-end exercise of the admin attach snapshot and lifecycle feed,
//! driving full [`hypertcp::session::Session`]s over in-memory
//! `tokio::io::duplex` pairs instead of real sockets.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use hypertcp::framing::{self, FrameType, Header};
use hypertcp::session::{run_session, SessionConfig};
use hypertcp::{Registry, StaticAuthenticator};
use tokio::io::{AsyncWriteExt, DuplexStream};

fn addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9100)
}

async fn write_frame(stream: &mut DuplexStream, kind: u8, payload: &[u8]) {
    stream
        .write_all(&Header::new(kind, 0, payload.len() as u16).encode())
        .await
        .unwrap();
    if !payload.is_empty() {
        stream.write_all(payload).await.unwrap();
    }
}

async fn read_frame(stream: &mut DuplexStream) -> (Header, Vec<u8>) {
    let header = framing::read_header(stream).await.unwrap();
    let payload = if header.payload_len > 0 {
        framing::read_exact(stream, header.payload_len as usize)
            .await
            .unwrap()
    } else {
        Vec::new()
    };
    (header, payload)
}

async fn login(stream: &mut DuplexStream, token: &str, device_id: &str) {
    let body = serde_json::json!({"token": token, "device_id": device_id});
    write_frame(
        stream,
        FrameType::Login.as_u8(),
        serde_json::to_vec(&body).unwrap().as_slice(),
    )
    .await;
    read_frame(stream).await; // RESPONSE
    read_frame(stream).await; // welcome
}

#[tokio::test]
async fn admin_attach_snapshot_then_lifecycle_event() {
    let registry = Arc::new(Registry::new());
    let auth = Arc::new(StaticAuthenticator::new("your_auth_token_here", "admin_token"));

    let (mut p_client, p_server) = tokio::io::duplex(4096);
    let (mut q_client, q_server) = tokio::io::duplex(4096);
    let (mut a_client, a_server) = tokio::io::duplex(4096);

    let p_handle = tokio::spawn(run_session(
        p_server,
        addr(),
        registry.clone(),
        auth.clone(),
        SessionConfig::default(),
    ));
    let q_handle = tokio::spawn(run_session(
        q_server,
        addr(),
        registry.clone(),
        auth.clone(),
        SessionConfig::default(),
    ));

    login(&mut p_client, "your_auth_token_here", "P").await;
    login(&mut q_client, "your_auth_token_here", "Q").await;

    let a_handle = tokio::spawn(run_session(
        a_server,
        addr(),
        registry.clone(),
        auth.clone(),
        SessionConfig::default(),
    ));

    login(&mut a_client, "admin_token", "admin_1").await;

    // Two deviceStatus snapshots, one per already-connected device, each
    // with a positive uptime, before any live event.
    let mut seen_devices = Vec::new();
    for _ in 0..2 {
        let (header, payload) = read_frame(&mut a_client).await;
        assert_eq!(header.kind, FrameType::JsonMessage.as_u8());
        let event: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(event["event"], "deviceStatus");
        assert_eq!(event["status"], "connected");
        assert!(event["uptime"].as_f64().unwrap() >= 0.0);
        seen_devices.push(event["deviceId"].as_str().unwrap().to_string());
    }
    seen_devices.sort();
    assert_eq!(seen_devices, vec!["P".to_string(), "Q".to_string()]);

    // P disconnects: the admin gets exactly one deviceDisconnected event.
    drop(p_client);
    p_handle.await.unwrap().unwrap();

    let (header, payload) = read_frame(&mut a_client).await;
    assert_eq!(header.kind, FrameType::JsonMessage.as_u8());
    let event: serde_json::Value = serde_json::from_slice(&payload).unwrap();
    assert_eq!(event["event"], "deviceDisconnected");
    assert_eq!(event["deviceId"], "P");
    assert!(event["connectionDuration"].as_f64().unwrap() >= 0.0);

    // The device group for Q survives; only P's left.
    assert_eq!(registry.lookup_device("Q").len(), 1);
    assert!(registry.lookup_device("P").is_empty());

    drop(q_client);
    q_handle.await.unwrap().unwrap();
    drop(a_client);
    a_handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn two_connections_same_device_id_share_a_group() {
    let registry = Arc::new(Registry::new());
    let auth = Arc::new(StaticAuthenticator::new("your_auth_token_here", "admin_token"));

    let (mut a1_client, a1_server) = tokio::io::duplex(4096);
    let (mut a2_client, a2_server) = tokio::io::duplex(4096);
    let (mut b_client, b_server) = tokio::io::duplex(4096);

    let a1_handle = tokio::spawn(run_session(
        a1_server,
        addr(),
        registry.clone(),
        auth.clone(),
        SessionConfig::default(),
    ));
    let a2_handle = tokio::spawn(run_session(
        a2_server,
        addr(),
        registry.clone(),
        auth.clone(),
        SessionConfig::default(),
    ));
    let b_handle = tokio::spawn(run_session(
        b_server,
        addr(),
        registry.clone(),
        auth.clone(),
        SessionConfig::default(),
    ));

    login(&mut a1_client, "your_auth_token_here", "A").await;
    login(&mut a2_client, "your_auth_token_here", "A").await;
    login(&mut b_client, "your_auth_token_here", "B").await;

    let body = serde_json::json!({"targetId": "A", "payload": {"x": 1}});
    write_frame(
        &mut b_client,
        FrameType::JsonMessage.as_u8(),
        serde_json::to_vec(&body).unwrap().as_slice(),
    )
    .await;

    for client in [&mut a1_client, &mut a2_client] {
        let (header, payload) = read_frame(client).await;
        assert_eq!(header.kind, FrameType::JsonMessage.as_u8());
        let envelope: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(envelope["from"], "B");
    }

    let (header, _) = read_frame(&mut b_client).await;
    assert_eq!(header.kind, FrameType::Response.as_u8());

    drop(a1_client);
    drop(a2_client);
    drop(b_client);
    a1_handle.await.unwrap().unwrap();
    a2_handle.await.unwrap().unwrap();
    b_handle.await.unwrap().unwrap();
}
