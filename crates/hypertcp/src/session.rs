//! The per-connection state machine.
//!
//! `UNAUTH -> AUTH_DEVICE | AUTH_ADMIN -> CLOSED`. A [`Session`] owns the
//! read half of its transport and a clone of its own writer mailbox; the
//! write half is handed to a dedicated writer task so that every outbound
//! frame — RESPONSE acks, the welcome message, routed deliveries, admin
//! events — is serialized through a single FIFO queue and never
//! interleaved on the wire.

use std::cell::Cell;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{info, warn};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::admin;
use crate::auth::{Authenticator, Classification};
use crate::envelope::{parse_login, Envelope};
use crate::error::{FrameError, SessionError};
use crate::framing::{self, FrameType, Header, Status};
use crate::outbound::{mailbox, Mailbox, MailboxRx, OutboundFrame};
use crate::registry::{next_connection_id, temp_client_id, ConnectionId, Departure, Registry};
use crate::router;

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Unauth,
    AuthDevice(String),
    AuthAdmin(String),
}

/// Tunable session behavior.
#[derive(Clone)]
pub struct SessionConfig {
    /// A configurable idle read timeout. `None` disables it.
    pub idle_timeout: Option<Duration>,
    /// Flips to `true` on server shutdown; the read loop races it against
    /// every frame read so every registered connection gets closed
    /// promptly instead of waiting for an accept-loop cancellation to
    /// somehow reach it.
    pub shutdown: Option<tokio::sync::watch::Receiver<bool>>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            shutdown: None,
        }
    }
}

/// Drive one accepted connection to completion: read frames until EOF,
/// error, or idle timeout, then deregister and report the outcome to the
/// admin feed. Generic over any `AsyncRead + AsyncWrite` transport so tests
/// can drive it over an in-memory `tokio::io::duplex` pair instead of a
/// real socket.
pub async fn run_session<T>(
    transport: T,
    addr: SocketAddr,
    registry: Arc<Registry>,
    authenticator: Arc<dyn Authenticator>,
    mut config: SessionConfig,
) -> anyhow::Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = next_connection_id();
    let temp_id = temp_client_id(addr, id);

    let (mut read_half, write_half) = tokio::io::split(transport);
    let (mailbox_tx, mailbox_rx) = mailbox();

    registry.register(id, mailbox_tx.clone());
    let writer = tokio::spawn(write_loop(write_half, mailbox_rx));

    info!("connection accepted: id={id}, addr={addr}, temp_id={temp_id}");

    let mut session = Session {
        id,
        temp_id,
        registry: registry.clone(),
        authenticator,
        mailbox_tx,
        state: State::Unauth,
        write_failed: Cell::new(false),
    };

    // Set once the loop breaks because of something worth reporting up
    // through a `SessionError`, rather than a clean disconnect or shutdown.
    let mut fault: Option<SessionError> = None;

    'read_loop: loop {
        let header = match config.shutdown.as_mut() {
            Some(shutdown_rx) => {
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break 'read_loop;
                        }
                        continue 'read_loop;
                    }
                    header = read_header(&mut read_half, config.idle_timeout) => header,
                }
            }
            None => read_header(&mut read_half, config.idle_timeout).await,
        };

        let header = match header {
            Ok(header) => header,
            Err(FrameError::Eof) => break,
            Err(err @ FrameError::Io(_)) => {
                fault = Some(SessionError::Frame(err));
                break;
            }
        };

        let payload = if header.payload_len > 0 {
            match framing::read_exact(&mut read_half, header.payload_len as usize).await {
                Ok(bytes) => bytes,
                Err(FrameError::Eof) => break,
                Err(err @ FrameError::Io(_)) => {
                    fault = Some(SessionError::Frame(err));
                    break;
                }
            }
        } else {
            Vec::new()
        };

        if !session.handle_frame(header, payload).await {
            break;
        }

        if session.write_failed.get() {
            fault = Some(SessionError::WriterClosed);
            break;
        }
    }

    session.cleanup();
    drop(session.mailbox_tx);

    // The writer task exits once every mailbox sender (including whatever
    // clones the router handed out mid-flight) has dropped.
    let _ = writer.await;

    match fault {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

struct Session {
    id: ConnectionId,
    temp_id: String,
    registry: Arc<Registry>,
    authenticator: Arc<dyn Authenticator>,
    mailbox_tx: Mailbox,
    state: State,
    /// Set once a send through `mailbox_tx` fails, meaning the writer task
    /// has already exited. The read loop checks this after every frame and
    /// closes the connection instead of continuing to read from a peer it
    /// can no longer answer.
    write_failed: Cell<bool>,
}

impl Session {
    fn send(&self, frame: OutboundFrame) {
        if self.mailbox_tx.send(frame).is_err() {
            warn!("connection {}: writer already gone", self.id);
            self.write_failed.set(true);
        }
    }

    fn respond(&self, msg_id: u16, status: Option<Status>) {
        let payload = match status {
            Some(status) => Bytes::from(vec![status.as_u8()]),
            None => Bytes::new(),
        };
        self.send(OutboundFrame::new(FrameType::Response.as_u8(), msg_id, payload));
    }

    /// Returns `false` when the connection should be closed.
    async fn handle_frame(&mut self, header: Header, payload: Vec<u8>) -> bool {
        match (&self.state, header.frame_type()) {
            (State::Unauth, FrameType::Login) => self.handle_login(header.msg_id, &payload),
            (State::Unauth, _) => {
                // Any non-LOGIN frame while unauthenticated closes the
                // connection; answering NOT_AUTHENTICATED first is optional.
                self.respond(header.msg_id, Some(Status::NotAuthenticated));
                false
            }
            (_, FrameType::Ping) => {
                self.respond(header.msg_id, None);
                true
            }
            (_, FrameType::JsonMessage) => {
                self.handle_json_message(header.msg_id, &payload);
                true
            }
            (_, FrameType::Broadcast) => {
                self.handle_broadcast(header.msg_id, &payload);
                true
            }
            (_, FrameType::Response) => true, // ack of an outbound RESPONSE: discard
            (_, FrameType::Login) => true,    // already authenticated; re-LOGIN is ignored
            (_, FrameType::Redirect) => true, // reserved, no payload contract defined yet
            (_, FrameType::Unknown(_)) => {
                self.respond(header.msg_id, Some(Status::InvalidCommand));
                true
            }
        }
    }

    fn handle_login(&mut self, msg_id: u16, payload: &[u8]) -> bool {
        let attempt = parse_login(payload, &self.temp_id);
        info!(
            "login attempt: connection={}, device_id={}",
            self.id, attempt.device_id
        );

        match self.authenticator.classify(&attempt.token, &attempt.device_id) {
            Classification::Reject => {
                self.respond(msg_id, Some(Status::InvalidToken));
                false
            }
            Classification::Device => {
                self.registry.authenticate_device(self.id, &attempt.device_id);
                self.state = State::AuthDevice(attempt.device_id.clone());

                self.respond(msg_id, Some(Status::Success));
                self.send(admin::welcome(self.id));

                info!(
                    "device authenticated: connection={}, device_id={}",
                    self.id, attempt.device_id
                );

                for (_, admin_mailbox) in self.registry.snapshot_admins() {
                    let _ = admin_mailbox.send(admin::device_connected(&attempt.device_id, self.id));
                }

                true
            }
            Classification::Admin => {
                self.registry.authenticate_admin(self.id);
                self.state = State::AuthAdmin(attempt.device_id.clone());

                self.respond(msg_id, Some(Status::Success));
                self.send(admin::welcome(self.id));

                info!("admin authenticated: connection={}", self.id);

                // Snapshot under the registry lock, emit outside it, through this
                // admin's own mailbox so it lands after the welcome message and
                // before any live deviceConnected event triggered afterward.
                for snapshot in self.registry.snapshot_devices() {
                    self.send(admin::device_status(&snapshot));
                }

                true
            }
        }
    }

    fn handle_json_message(&mut self, msg_id: u16, payload: &[u8]) {
        let envelope = match Envelope::parse(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                // Malformed JSON after auth is logged and dropped, with no
                // RESPONSE ack.
                warn!("connection {}: malformed JSON_MESSAGE payload: {err}", self.id);
                return;
            }
        };

        let sender_device_id = self.device_id();
        let target_id = envelope.target_id.clone().unwrap_or_default();

        if envelope.is_ping_command() {
            self.send(admin::pong(&envelope.payload));
        }

        router::route(&self.registry, sender_device_id, &target_id, envelope);
        self.respond(msg_id, None);
    }

    fn handle_broadcast(&mut self, msg_id: u16, payload: &[u8]) {
        let envelope = match Envelope::parse(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("connection {}: malformed BROADCAST payload: {err}", self.id);
                return;
            }
        };

        let sender_device_id = self.device_id();
        router::broadcast(&self.registry, sender_device_id, envelope);
        self.respond(msg_id, None);
    }

    fn device_id(&self) -> &str {
        match &self.state {
            State::AuthDevice(device_id) | State::AuthAdmin(device_id) => device_id,
            State::Unauth => &self.temp_id,
        }
    }

    fn cleanup(&self) {
        match self.registry.deregister(self.id) {
            Departure::WasDevice {
                device_id,
                connection_duration_secs,
            } => {
                info!(
                    "device disconnected: connection={}, device_id={device_id}, duration={connection_duration_secs:.2}s",
                    self.id
                );

                for (_, admin_mailbox) in self.registry.snapshot_admins() {
                    let _ = admin_mailbox.send(admin::device_disconnected(
                        &device_id,
                        self.id,
                        connection_duration_secs,
                    ));
                }
            }
            Departure::WasAdmin => {
                info!("admin disconnected: connection={}", self.id);
            }
            Departure::Unknown => {
                info!("unauthenticated connection {} closed", self.id);
            }
        }
    }
}

/// Read one header, optionally bounded by an idle timeout. A timeout is
/// reported the same way EOF is: the caller just closes the connection.
/// Emitting `RESPONSE(TIMEOUT)` first is optional since the peer is being
/// closed anyway.
async fn read_header<T>(read_half: &mut T, idle_timeout: Option<Duration>) -> Result<Header, crate::error::FrameError>
where
    T: AsyncRead + Unpin,
{
    match idle_timeout {
        Some(timeout) => match tokio::time::timeout(timeout, framing::read_header(read_half)).await {
            Ok(result) => result,
            Err(_) => Err(crate::error::FrameError::Eof),
        },
        None => framing::read_header(read_half).await,
    }
}

async fn write_loop<W>(mut write_half: W, mut rx: MailboxRx)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        if let Err(err) = write_half.write_all(&frame.header.encode()).await {
            warn!("writer: header write failed: {err}");
            break;
        }
        if !frame.payload.is_empty() {
            if let Err(err) = write_half.write_all(&frame.payload).await {
                warn!("writer: payload write failed: {err}");
                break;
            }
        }
    }
}
