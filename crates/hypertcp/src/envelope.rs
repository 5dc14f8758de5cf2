//! JSON payload shapes carried inside LOGIN, JSON_MESSAGE and BROADCAST
//! frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The parsed result of a LOGIN payload: an explicit tagged result in
/// place of a JSON-then-fallback chain of exceptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    pub token: String,
    pub device_id: String,
}

#[derive(Deserialize)]
struct LoginJson {
    token: Option<String>,
    device_id: Option<String>,
}

/// Parse a LOGIN payload. If it doesn't decode as UTF-8 JSON, the entire
/// payload is treated as a raw token, and `device_id` defaults to
/// `default_device_id` (the connection's temporary id) in both the JSON and
/// raw-token cases.
pub fn parse_login(payload: &[u8], default_device_id: &str) -> LoginAttempt {
    let as_json = std::str::from_utf8(payload)
        .ok()
        .and_then(|text| serde_json::from_str::<LoginJson>(text).ok());

    match as_json {
        Some(parsed) => LoginAttempt {
            token: parsed.token.unwrap_or_default(),
            device_id: parsed.device_id.unwrap_or_else(|| default_device_id.to_string()),
        },
        None => LoginAttempt {
            token: String::from_utf8_lossy(payload).into_owned(),
            device_id: default_device_id.to_string(),
        },
    }
}

/// The JSON envelope carried by JSON_MESSAGE and BROADCAST frames.
/// `from` is only present once the server has stamped it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "targetId", skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl Envelope {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn stamp_sender(&mut self, device_id: &str) {
        self.from = Some(device_id.to_string());
    }

    pub fn to_bytes(&self) -> bytes::Bytes {
        bytes::Bytes::from(serde_json::to_vec(self).expect("envelope serializes"))
    }

    /// `true` if this envelope's payload is a ping command
    /// (`payload.command == "ping"`).
    pub fn is_ping_command(&self) -> bool {
        self.payload
            .get("command")
            .and_then(Value::as_str)
            .map(|command| command == "ping")
            .unwrap_or(false)
    }
}
