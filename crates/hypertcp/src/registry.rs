//! The routing registry: the process-wide index of connections, device
//! groups and the admin set.
//!
//! The registry owns no sockets — only a connection-id and a clone of its
//! writer mailbox. All three tables (connection table, device-group
//! mapping, admin set) are modified exclusively through this type's API; no
//! caller holds an iterator into them across an `.await` point.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use parking_lot::RwLock;

use crate::outbound::Mailbox;

/// Process-wide unique connection identifier, assigned at accept time.
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next connection id.
pub fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Render a connection's temporary id, used as the default `device_id` for
/// the legacy login fallback and as `clientId` in admin events before a
/// device id is known. Mirrors the original server's
/// `client_{address[0]}_{address[1]}_{counter}` naming.
pub fn temp_client_id(addr: std::net::SocketAddr, id: ConnectionId) -> String {
    format!("client_{}_{}_{}", addr.ip(), addr.port(), id)
}

#[derive(Clone)]
struct Entry {
    mailbox: Mailbox,
    connect_at: Instant,
    device_id: Option<String>,
    is_admin: bool,
}

/// A point-in-time view of a connected device connection, used for the
/// admin attach snapshot.
pub struct DeviceSnapshot {
    pub device_id: String,
    pub connection_id: ConnectionId,
    pub uptime_secs: f64,
}

/// What happened when a connection left the registry: used by the caller
/// to decide whether a `deviceDisconnected` admin event is owed.
pub enum Departure {
    /// The connection wasn't registered (already deregistered, or it never
    /// authenticated). Deregistering twice is a no-op.
    Unknown,
    WasAdmin,
    WasDevice {
        device_id: String,
        connection_duration_secs: f64,
    },
}

#[derive(Default)]
struct Tables {
    connections: HashMap<ConnectionId, Entry>,
    devices: HashMap<String, Vec<ConnectionId>>,
    admins: HashSet<ConnectionId>,
}

/// The shared routing registry. Guarded by a single lock; callers MUST
/// clone whatever they need and release the lock before doing I/O.
#[derive(Default)]
pub struct Registry {
    tables: RwLock<Tables>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly-accepted, not-yet-authenticated connection.
    pub fn register(&self, id: ConnectionId, mailbox: Mailbox) {
        let mut tables = self.tables.write();
        tables.connections.insert(
            id,
            Entry {
                mailbox,
                connect_at: Instant::now(),
                device_id: None,
                is_admin: false,
            },
        );
    }

    /// Transition a connection into `AUTH_DEVICE`, adding it to its device
    /// group. A device-id may have any number of concurrent connections.
    pub fn authenticate_device(&self, id: ConnectionId, device_id: &str) {
        let mut tables = self.tables.write();
        if let Some(entry) = tables.connections.get_mut(&id) {
            entry.device_id = Some(device_id.to_string());
        }
        tables
            .devices
            .entry(device_id.to_string())
            .or_default()
            .push(id);
    }

    /// Transition a connection into `AUTH_ADMIN`, adding it to the admin
    /// set. Invariant: the admin set is disjoint from every device group.
    pub fn authenticate_admin(&self, id: ConnectionId) {
        let mut tables = self.tables.write();
        if let Some(entry) = tables.connections.get_mut(&id) {
            entry.is_admin = true;
        }
        tables.admins.insert(id);
    }

    /// Remove a connection and report what it was. Idempotent: calling this
    /// twice for the same id leaves the registry in the state the first
    /// call produced.
    pub fn deregister(&self, id: ConnectionId) -> Departure {
        let mut tables = self.tables.write();

        let Some(entry) = tables.connections.remove(&id) else {
            return Departure::Unknown;
        };

        if entry.is_admin {
            tables.admins.remove(&id);
            return Departure::WasAdmin;
        }

        let Some(device_id) = entry.device_id else {
            return Departure::Unknown;
        };

        if let Some(connections) = tables.devices.get_mut(&device_id) {
            connections.retain(|c| *c != id);
            if connections.is_empty() {
                tables.devices.remove(&device_id);
            }
        }

        Departure::WasDevice {
            device_id,
            connection_duration_secs: entry.connect_at.elapsed().as_secs_f64(),
        }
    }

    /// Every connection currently registered for `device_id`, or an empty
    /// vec if there is no such device group.
    pub fn lookup_device(&self, device_id: &str) -> Vec<(ConnectionId, Mailbox)> {
        let tables = self.tables.read();
        tables
            .devices
            .get(device_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| {
                        tables
                            .connections
                            .get(id)
                            .map(|entry| (*id, entry.mailbox.clone()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every authenticated connection (device and admin alike), snapshotted
    /// under the lock so the caller can iterate outside it.
    pub fn snapshot_broadcast_recipients(&self) -> Vec<(ConnectionId, Mailbox)> {
        let tables = self.tables.read();
        tables
            .connections
            .iter()
            .filter(|(_, entry)| entry.is_admin || entry.device_id.is_some())
            .map(|(id, entry)| (*id, entry.mailbox.clone()))
            .collect()
    }

    /// Every connection currently in the admin set.
    pub fn snapshot_admins(&self) -> Vec<(ConnectionId, Mailbox)> {
        let tables = self.tables.read();
        tables
            .admins
            .iter()
            .filter_map(|id| {
                tables
                    .connections
                    .get(id)
                    .map(|entry| (*id, entry.mailbox.clone()))
            })
            .collect()
    }

    /// One entry per currently registered device connection, for the admin
    /// attach snapshot. Taken under the registry lock so it observes a
    /// consistent point-in-time view.
    pub fn snapshot_devices(&self) -> Vec<DeviceSnapshot> {
        let tables = self.tables.read();
        tables
            .devices
            .iter()
            .flat_map(|(device_id, ids)| {
                ids.iter().filter_map(|id| {
                    tables.connections.get(id).map(|entry| DeviceSnapshot {
                        device_id: device_id.clone(),
                        connection_id: *id,
                        uptime_secs: entry.connect_at.elapsed().as_secs_f64(),
                    })
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::mailbox;

    fn fake_mailbox() -> Mailbox {
        mailbox().0
    }

    #[test]
    fn multiple_connections_share_a_device_group() {
        let registry = Registry::new();
        registry.register(1, fake_mailbox());
        registry.register(2, fake_mailbox());
        registry.authenticate_device(1, "A");
        registry.authenticate_device(2, "A");

        assert_eq!(registry.lookup_device("A").len(), 2);
    }

    #[test]
    fn group_survives_until_last_connection_leaves() {
        let registry = Registry::new();
        registry.register(1, fake_mailbox());
        registry.register(2, fake_mailbox());
        registry.authenticate_device(1, "A");
        registry.authenticate_device(2, "A");

        registry.deregister(1);
        assert_eq!(registry.lookup_device("A").len(), 1);

        registry.deregister(2);
        assert_eq!(registry.lookup_device("A").len(), 0);
        assert!(registry.snapshot_devices().is_empty());
    }

    #[test]
    fn deregister_is_idempotent() {
        let registry = Registry::new();
        registry.register(1, fake_mailbox());
        registry.authenticate_device(1, "A");

        let first = registry.deregister(1);
        assert!(matches!(first, Departure::WasDevice { .. }));

        let second = registry.deregister(1);
        assert!(matches!(second, Departure::Unknown));
        assert!(registry.lookup_device("A").is_empty());
    }

    #[test]
    fn admin_set_disjoint_from_device_groups() {
        let registry = Registry::new();
        registry.register(1, fake_mailbox());
        registry.authenticate_admin(1);

        assert_eq!(registry.snapshot_admins().len(), 1);
        assert!(registry.lookup_device("admin_1").is_empty());
    }

    #[test]
    fn broadcast_recipients_include_admins() {
        let registry = Registry::new();
        registry.register(1, fake_mailbox());
        registry.register(2, fake_mailbox());
        registry.authenticate_device(1, "A");
        registry.authenticate_admin(2);

        assert_eq!(registry.snapshot_broadcast_recipients().len(), 2);
    }
}
