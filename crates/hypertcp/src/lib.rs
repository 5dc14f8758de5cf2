//! HyperTCP: framing, the connection state machine, the routing registry
//! and router, and the admin event feed. No binary lives in this crate —
//! `broker` and `bridge` wire it up.

pub mod admin;
pub mod auth;
pub mod envelope;
pub mod error;
pub mod framing;
pub mod outbound;
pub mod registry;
pub mod router;
pub mod session;

pub use auth::{Authenticator, Classification, StaticAuthenticator};
pub use error::{FrameError, SessionError};
pub use framing::{FrameType, Header, Status};
pub use registry::{ConnectionId, Registry};
pub use session::{run_session, SessionConfig};
