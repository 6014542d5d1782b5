//! Per-peer protocol: the handshake, the framed message types, and the
//! session state machine that drives one TCP conversation end to end.
use thiserror::Error;

pub mod handshake;
pub mod message;
pub mod session;

pub use handshake::Handshake;
pub use message::{Message, MessageId};
pub use session::{PeerSession, PieceBlock};

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire error: {0}")]
    Wire(#[from] crate::wire::WireError),

    #[error("invalid handshake: {0}")]
    BadHandshake(String),

    #[error("info hash mismatch")]
    InfoHashMismatch,

    #[error("oversized message: {0} bytes")]
    Oversized(u32),

    #[error("peer misbehavior: {0}")]
    Misbehavior(String),
}

pub type PeerResult<T> = std::result::Result<T, PeerError>;
