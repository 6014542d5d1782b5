//! The 68-byte handshake exchanged before any framed message: protocol
//! identifier, reserved extension bits, info-hash, and peer-id.
//!
//! `peer::session` performs the actual wire exchange directly over a split
//! `TcpStream` (it needs independent read/write halves for the concurrent
//! read loop and request worker) rather than through this type's `parse`/
//! `serialize`; this module only owns the byte layout.
use super::{PeerError, PeerResult};

const PROTOCOL: &[u8; 19] = b"BitTorrent protocol";
const HANDSHAKE_LEN: usize = 68;

/// Reserved byte 5 (index 25) with bit `0x10` set advertises BEP 10
/// extension-protocol support; byte 7 (index 27) carries `0x05`, though no
/// peer is known to check it.
const RESERVED: [u8; 8] = [0, 0, 0, 0, 0, 0x10, 0, 0x05];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self { info_hash, peer_id }
    }

    pub fn serialize(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0u8; HANDSHAKE_LEN];
        buf[0] = 19;
        buf[1..20].copy_from_slice(PROTOCOL);
        buf[20..28].copy_from_slice(&RESERVED);
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    pub(crate) fn parse(buf: &[u8]) -> PeerResult<Self> {
        if buf.len() != HANDSHAKE_LEN {
            return Err(PeerError::BadHandshake(format!("expected {HANDSHAKE_LEN} bytes, got {}", buf.len())));
        }
        if buf[0] != 19 || &buf[1..20] != PROTOCOL.as_slice() {
            return Err(PeerError::BadHandshake("unrecognized protocol identifier".into()));
        }
        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&buf[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&buf[48..68]);
        Ok(Self { info_hash, peer_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_round_trips_through_parse() {
        let hs = Handshake::new([1u8; 20], [2u8; 20]);
        let bytes = hs.serialize();
        let parsed = Handshake::parse(&bytes).unwrap();
        assert_eq!(parsed, hs);
    }

    #[test]
    fn rejects_wrong_protocol_length() {
        let mut bytes = Handshake::new([0u8; 20], [0u8; 20]).serialize();
        bytes[0] = 18;
        assert!(Handshake::parse(&bytes).is_err());
    }

    #[test]
    fn rejects_truncated_buffer() {
        assert!(Handshake::parse(&[0u8; 10]).is_err());
    }
}
