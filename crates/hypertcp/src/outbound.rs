//! The per-connection writer mailbox.
//!
//! Every outbound frame — a RESPONSE ack, the welcome message, a routed
//! delivery, an admin event — flows through a connection's mailbox instead
//! of being written to the socket directly. This keeps header and payload
//! bytes from ever interleaving with another frame's bytes on the wire and
//! lets the router enqueue deliveries without ever touching a socket
//! itself.

use bytes::Bytes;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::framing::Header;

/// A fully-formed frame waiting to be written: header plus payload bytes.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    pub header: Header,
    pub payload: Bytes,
}

impl OutboundFrame {
    pub fn new(kind: u8, msg_id: u16, payload: Bytes) -> Self {
        Self {
            header: Header::new(kind, msg_id, payload.len() as u16),
            payload,
        }
    }

    pub fn empty(kind: u8, msg_id: u16) -> Self {
        Self::new(kind, msg_id, Bytes::new())
    }
}

pub type Mailbox = UnboundedSender<OutboundFrame>;
pub type MailboxRx = UnboundedReceiver<OutboundFrame>;

pub fn mailbox() -> (Mailbox, MailboxRx) {
    mpsc::unbounded_channel()
}
