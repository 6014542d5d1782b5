//! Tracker clients: announce requests over BEP 3 (HTTP) and BEP 15 (UDP),
//! sharing a peer-id convention, a compact peer-record decoder and a
//! percent-encoding helper neither transport's library crate gives us for
//! free on raw 20-byte hashes.
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use thiserror::Error;

pub mod http;
pub mod udp;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire error: {0}")]
    Wire(#[from] crate::wire::WireError),

    #[error("bencode decoding error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("unsupported tracker scheme: {0}")]
    UnsupportedScheme(String),

    #[error("tracker returned failure reason: {0}")]
    Failure(String),

    #[error("malformed tracker response: {0}")]
    Malformed(String),

    #[error("transaction id mismatch in tracker response")]
    TransactionMismatch,
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// A 20-byte client identifier announced to every tracker and peer.
pub fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    let prefix = b"-GT0001-";
    peer_id[..prefix.len()].copy_from_slice(prefix);
    let mut rng = rand::rng();
    let alphabet: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    for byte in &mut peer_id[prefix.len()..] {
        *byte = alphabet[rng.random_range(0..alphabet.len())];
    }
    peer_id
}

/// Parameters common to both tracker announce requests.
#[derive(Debug, Clone)]
pub struct AnnounceRequest {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
    pub port: u16,
    pub uploaded: i64,
    pub downloaded: i64,
    pub left: i64,
}

/// Result of a successful announce: a poll interval plus the peers the
/// tracker knows about.
#[derive(Debug, Clone)]
pub struct AnnounceResponse {
    pub interval: u32,
    pub peers: Vec<SocketAddr>,
}

/// Splits a BEP 23 compact peer blob (6 bytes each: 4-byte IPv4, 2-byte port)
/// into socket addresses, ignoring any trailing partial record.
pub fn parse_compact_peers(bytes: &[u8]) -> Vec<SocketAddr> {
    bytes
        .chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddr::new(IpAddr::V4(ip), port)
        })
        .collect()
}

/// Percent-encodes a byte slice per RFC 3986, leaving the unreserved set
/// untouched. `url::form_urlencoded` escapes space differently than
/// trackers expect for raw hash bytes, so this is applied directly to the
/// info_hash and peer_id query parameters instead.
pub fn url_encode(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 3);
    for &byte in bytes {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_has_expected_prefix_and_length() {
        let id = generate_peer_id();
        assert_eq!(&id[..8], b"-GT0001-");
        assert_eq!(id.len(), 20);
    }

    #[test]
    fn parses_compact_peer_records() {
        let bytes = [127, 0, 0, 1, 0x1A, 0xE1, 10, 0, 0, 5, 0x1A, 0xE1];
        let peers = parse_compact_peers(&bytes);
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].port(), 0x1AE1);
    }

    #[test]
    fn url_encode_leaves_unreserved_untouched() {
        assert_eq!(url_encode(b"abc-._~"), "abc-._~");
        assert_eq!(url_encode(&[0xffu8]), "%FF");
    }
}
