//! Construction of the frames the server sends unprompted: the welcome
//! message and the admin lifecycle/event feed.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;

use crate::framing::FrameType;
use crate::outbound::OutboundFrame;
use crate::registry::{ConnectionId, DeviceSnapshot};

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

/// `{ "type":"welcome", "message":"...", "clientId":..., "timestamp":... }`,
/// sent as JSON_MESSAGE with MsgId=0 right after a successful LOGIN.
pub fn welcome(client_id: ConnectionId) -> OutboundFrame {
    let body = json!({
        "type": "welcome",
        "message": "Connected to HyperTCP server",
        "clientId": client_id.to_string(),
        "timestamp": epoch_millis(),
    });

    OutboundFrame::new(
        FrameType::JsonMessage.as_u8(),
        0,
        bytes::Bytes::from(serde_json::to_vec(&body).expect("welcome body serializes")),
    )
}

/// `deviceConnected` — emitted to every admin after a device transitions
/// into `AUTH_DEVICE`.
pub fn device_connected(device_id: &str, client_id: ConnectionId) -> OutboundFrame {
    let body = json!({
        "event": "deviceConnected",
        "deviceId": device_id,
        "clientId": client_id.to_string(),
        "timestamp": epoch_millis(),
    });

    OutboundFrame::new(
        FrameType::JsonMessage.as_u8(),
        0,
        bytes::Bytes::from(serde_json::to_vec(&body).expect("event body serializes")),
    )
}

/// `deviceDisconnected` — emitted when a device connection leaves its
/// device group, including when the group is thereby removed.
pub fn device_disconnected(
    device_id: &str,
    client_id: ConnectionId,
    connection_duration_secs: f64,
) -> OutboundFrame {
    let body = json!({
        "event": "deviceDisconnected",
        "deviceId": device_id,
        "clientId": client_id.to_string(),
        "connectionDuration": connection_duration_secs,
        "timestamp": epoch_millis(),
    });

    OutboundFrame::new(
        FrameType::JsonMessage.as_u8(),
        0,
        bytes::Bytes::from(serde_json::to_vec(&body).expect("event body serializes")),
    )
}

/// `deviceStatus` — one per device connection, synthesised immediately
/// after an admin transitions into `AUTH_ADMIN`.
pub fn device_status(snapshot: &DeviceSnapshot) -> OutboundFrame {
    let body = json!({
        "event": "deviceStatus",
        "deviceId": snapshot.device_id,
        "clientId": snapshot.connection_id.to_string(),
        "status": "connected",
        "uptime": snapshot.uptime_secs,
        "timestamp": epoch_millis(),
    });

    OutboundFrame::new(
        FrameType::JsonMessage.as_u8(),
        0,
        bytes::Bytes::from(serde_json::to_vec(&body).expect("event body serializes")),
    )
}

/// `pong` reply to a `payload.command == "ping"` JSON_MESSAGE, merging the
/// original ping fields in.
pub fn pong(ping_payload: &serde_json::Value) -> OutboundFrame {
    let mut body = serde_json::Map::new();
    if let serde_json::Value::Object(fields) = ping_payload {
        body.extend(fields.clone());
    }
    body.insert("type".into(), json!("pong"));
    body.insert("command".into(), json!("pong"));
    body.insert("timestamp".into(), json!(epoch_millis()));

    OutboundFrame::new(
        FrameType::JsonMessage.as_u8(),
        0,
        bytes::Bytes::from(
            serde_json::to_vec(&serde_json::Value::Object(body)).expect("pong body serializes"),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pong_merges_ping_fields() {
        let ping = json!({"command": "ping", "nonce": 42});
        let frame = pong(&ping);
        let decoded: serde_json::Value = serde_json::from_slice(&frame.payload).unwrap();
        assert_eq!(decoded["command"], "pong");
        assert_eq!(decoded["nonce"], 42);
        assert!(decoded["timestamp"].is_u64());
    }
}
