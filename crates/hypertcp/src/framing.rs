//! The HyperTCP wire format: a fixed 5-byte header followed by a
//! length-prefixed payload.
//!
//! ```text
//! offset 0: u8    Type
//! offset 1: u16   MsgId         (big-endian)
//! offset 3: u16   PayloadLen    (big-endian)
//! offset 5: Payload[PayloadLen]
//! ```

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::FrameError;

pub const HEADER_LEN: usize = 5;

/// Frame `Type` byte. Unknown values are preserved as `Type::Unknown(u8)`
/// rather than rejected at decode time — the session layer is the one that
/// decides an unrecognized type is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Response,
    Ping,
    Login,
    JsonMessage,
    Redirect,
    Broadcast,
    Unknown(u8),
}

impl FrameType {
    pub const RESPONSE: u8 = 0;
    pub const PING: u8 = 6;
    pub const LOGIN: u8 = 29;
    pub const JSON_MESSAGE: u8 = 30;
    pub const REDIRECT: u8 = 41;
    pub const BROADCAST: u8 = 50;

    pub fn from_u8(value: u8) -> Self {
        match value {
            Self::RESPONSE => Self::Response,
            Self::PING => Self::Ping,
            Self::LOGIN => Self::Login,
            Self::JSON_MESSAGE => Self::JsonMessage,
            Self::REDIRECT => Self::Redirect,
            Self::BROADCAST => Self::Broadcast,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Response => Self::RESPONSE,
            Self::Ping => Self::PING,
            Self::Login => Self::LOGIN,
            Self::JsonMessage => Self::JSON_MESSAGE,
            Self::Redirect => Self::REDIRECT,
            Self::Broadcast => Self::BROADCAST,
            Self::Unknown(value) => value,
        }
    }
}

/// A single RESPONSE payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    NotAuthenticated,
    InvalidToken,
    Timeout,
    InvalidCommand,
}

impl Status {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Success => 200,
            Self::NotAuthenticated => 5,
            Self::InvalidToken => 9,
            Self::Timeout => 16,
            Self::InvalidCommand => 2,
        }
    }
}

/// A decoded 5-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: u8,
    pub msg_id: u16,
    pub payload_len: u16,
}

impl Header {
    pub fn new(kind: u8, msg_id: u16, payload_len: u16) -> Self {
        Self {
            kind,
            msg_id,
            payload_len,
        }
    }

    pub fn frame_type(&self) -> FrameType {
        FrameType::from_u8(self.kind)
    }

    /// Big-endian pack of `(u8 Type, u16 MsgId, u16 PayloadLen)`.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.kind;
        buf[1..3].copy_from_slice(&self.msg_id.to_be_bytes());
        buf[3..5].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Inverse of [`Header::encode`]. `bytes` must be exactly
    /// [`HEADER_LEN`] long; callers get that guarantee from
    /// [`read_exact`].
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Self {
        Self {
            kind: bytes[0],
            msg_id: u16::from_be_bytes([bytes[1], bytes[2]]),
            payload_len: u16::from_be_bytes([bytes[3], bytes[4]]),
        }
    }
}

/// Encode a frame header. Thin wrapper kept around [`Header::encode`] so
/// callers that don't need a [`Header`] value can call this directly.
pub fn encode(kind: u8, msg_id: u16, payload_len: u16) -> [u8; HEADER_LEN] {
    Header::new(kind, msg_id, payload_len).encode()
}

/// Read exactly `n` bytes from `transport`, aggregating across short reads.
/// Returns [`FrameError::Eof`] if the peer closes before `n` bytes arrive.
/// This is the only read primitive a [`crate::session::Session`] uses.
pub async fn read_exact<T>(transport: &mut T, n: usize) -> Result<Vec<u8>, FrameError>
where
    T: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; n];
    let mut read = 0;

    while read < n {
        let got = transport.read(&mut buf[read..]).await?;
        if got == 0 {
            return Err(FrameError::Eof);
        }

        read += got;
    }

    Ok(buf)
}

/// Read a header off `transport`, failing with [`FrameError::Eof`] on a
/// short read.
pub async fn read_header<T>(transport: &mut T) -> Result<Header, FrameError>
where
    T: AsyncRead + Unpin,
{
    let bytes = read_exact(transport, HEADER_LEN).await?;
    let array: [u8; HEADER_LEN] = bytes.try_into().expect("read_exact returns HEADER_LEN bytes");
    Ok(Header::decode(&array))
}
