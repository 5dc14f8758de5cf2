//! Pluggable admission control: `classify(token, device_id) -> Classification`.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Outcome of admitting a LOGIN frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Reject,
    Device,
    Admin,
}

/// Opaque admission predicate. The session layer never inspects credentials
/// itself; it only calls `classify` and acts on the result.
pub trait Authenticator: Send + Sync {
    fn classify(&self, token: &str, device_id: &str) -> Classification;
}

/// Reference authenticator: a device-id prefix or a fixed admin token marks
/// the attempt as an admin attempt; a separate shared secret gates device
/// logins. Held behind a `parking_lot::RwLock` so the shared secrets can be
/// rotated without restarting the broker.
pub struct StaticAuthenticator {
    inner: RwLock<StaticCredentials>,
}

struct StaticCredentials {
    device_token: String,
    admin_token: String,
}

impl StaticAuthenticator {
    pub fn new(device_token: impl Into<String>, admin_token: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(StaticCredentials {
                device_token: device_token.into(),
                admin_token: admin_token.into(),
            }),
        }
    }

    pub fn set_device_token(&self, token: impl Into<String>) {
        self.inner.write().device_token = token.into();
    }

    pub fn set_admin_token(&self, token: impl Into<String>) {
        self.inner.write().admin_token = token.into();
    }
}

impl Authenticator for StaticAuthenticator {
    fn classify(&self, token: &str, device_id: &str) -> Classification {
        let creds = self.inner.read();
        let wants_admin = device_id.starts_with("admin_") || token == creds.admin_token;

        if wants_admin {
            if token == creds.admin_token {
                Classification::Admin
            } else {
                Classification::Reject
            }
        } else if token == creds.device_token {
            Classification::Device
        } else {
            Classification::Reject
        }
    }
}

impl From<HashMap<String, String>> for StaticAuthenticator {
    /// Builds a `StaticAuthenticator` from a `{"device": "...", "admin": "..."}`
    /// style map, as read from a credentials config section.
    fn from(map: HashMap<String, String>) -> Self {
        let device_token = map.get("device").cloned().unwrap_or_default();
        let admin_token = map.get("admin").cloned().unwrap_or_default();
        Self::new(device_token, admin_token)
    }
}
