//! Bencode codec: a stream decoder and deterministic serializer for the four
//! bencoded types used throughout the BitTorrent wire and metafile formats.
//!
//! The decoded tree is a generic tagged value rather than a type derived via
//! serde: the metainfo parser, the HTTP tracker response parser, and the
//! extension-protocol handshake/PEX parser all walk the same `BencodeValue`.
use thiserror::Error;

pub mod decoder;
pub mod encoder;

/// A decoded (or to-be-encoded) bencode value.
///
/// `Dict` preserves insertion order (a `Vec` of pairs, not a `HashMap`) so
/// that re-encoding a decoded subtree reproduces the exact original byte
/// sequence — required to recompute the info-hash from a parsed `info` dict.
#[derive(Debug, PartialEq, Clone)]
pub enum BencodeValue {
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<BencodeValue>),
    Dict(Vec<(Vec<u8>, BencodeValue)>),
}

impl BencodeValue {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            BencodeValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            BencodeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            BencodeValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&[(Vec<u8>, BencodeValue)]> {
        match self {
            BencodeValue::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Looks up a key in a `Dict` value. Returns `None` for non-dict values
    /// or a missing key — callers that require the key should convert the
    /// `None` into a domain error rather than a silent default.
    pub fn get(&self, key: &[u8]) -> Option<&BencodeValue> {
        self.as_dict()?.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Custom error type for bencode operations.
#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed bencode input: {0}")]
    Malformed(String),

    #[error("unexpected end of input")]
    UnexpectedEof,
}

pub type BencodeResult<T> = std::result::Result<T, BencodeError>;
