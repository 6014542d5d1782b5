//! Torrent descriptor: parses a decoded metainfo tree into an immutable
//! `Torrent`, and error handling shared by that parse.
use thiserror::Error;

pub mod info_hash;
pub mod metainfo;

pub use metainfo::{FileEntry, Torrent};

#[derive(Debug, Error)]
pub enum TorrentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bencode decoding error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("invalid metainfo: {0}")]
    InvalidMetainfo(String),

    #[error("missing or invalid field: {0}")]
    MissingField(String),

    #[error("invalid pieces hash length: {0} is not a multiple of 20")]
    InvalidPiecesHashLength(usize),

    #[error("non-UTF8 path component: {0}")]
    InvalidPath(String),
}

pub type TorrentResult<T> = std::result::Result<T, TorrentError>;
