//! Transport helpers shared by the tracker clients and peer sessions: a
//! dial-on-first-send TCP connector, an unconnected UDP socket, and a thin
//! HTTP GET wrapper, each carrying their own deadline.
use thiserror::Error;

pub mod http;
pub mod tcp;
pub mod udp;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation timed out")]
    Timeout,

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type WireResult<T> = std::result::Result<T, WireError>;
