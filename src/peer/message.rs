//! Length-prefixed peer wire messages: a 4-byte big-endian length followed
//! by a 1-byte id and an id-specific payload. A zero length is a keepalive.
//!
//! Framing (`serialize`/the parsing this describes) is shared with
//! `peer::session`'s read loop, which reads frames directly off a split
//! `TcpStream` rather than through `send`/`read` helpers here.
use byteorder::{BigEndian, ByteOrder};

pub const MAX_MSG_LEN: u32 = 262_144;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have,
    Bitfield,
    Request,
    Piece,
    Cancel,
    Extended,
    Unknown(u8),
}

impl From<u8> for MessageId {
    fn from(value: u8) -> Self {
        match value {
            0 => MessageId::Choke,
            1 => MessageId::Unchoke,
            2 => MessageId::Interested,
            3 => MessageId::NotInterested,
            4 => MessageId::Have,
            5 => MessageId::Bitfield,
            6 => MessageId::Request,
            7 => MessageId::Piece,
            8 => MessageId::Cancel,
            20 => MessageId::Extended,
            other => MessageId::Unknown(other),
        }
    }
}

impl From<MessageId> for u8 {
    fn from(id: MessageId) -> u8 {
        match id {
            MessageId::Choke => 0,
            MessageId::Unchoke => 1,
            MessageId::Interested => 2,
            MessageId::NotInterested => 3,
            MessageId::Have => 4,
            MessageId::Bitfield => 5,
            MessageId::Request => 6,
            MessageId::Piece => 7,
            MessageId::Cancel => 8,
            MessageId::Extended => 20,
            MessageId::Unknown(other) => other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(id: MessageId, payload: Vec<u8>) -> Self {
        Self { id, payload }
    }

    pub fn interested() -> Self {
        Self::new(MessageId::Interested, Vec::new())
    }

    pub fn unchoke() -> Self {
        Self::new(MessageId::Unchoke, Vec::new())
    }

    pub fn bitfield(bytes: Vec<u8>) -> Self {
        Self::new(MessageId::Bitfield, bytes)
    }

    pub fn request(index: u32, begin: u32, length: u32) -> Self {
        let mut payload = vec![0u8; 12];
        BigEndian::write_u32(&mut payload[0..4], index);
        BigEndian::write_u32(&mut payload[4..8], begin);
        BigEndian::write_u32(&mut payload[8..12], length);
        Self::new(MessageId::Request, payload)
    }

    /// The extension-protocol handshake, advertising `ut_pex` as message id 1.
    pub fn extended_handshake() -> Self {
        let body = b"d1:md6:ut_pexi1eee";
        let mut payload = Vec::with_capacity(1 + body.len());
        payload.push(0); // extended message id 0: handshake
        payload.extend_from_slice(body);
        Self::new(MessageId::Extended, payload)
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(5 + self.payload.len());
        let len = (1 + self.payload.len()) as u32;
        buf.extend_from_slice(&len.to_be_bytes());
        buf.push(self.id.into());
        buf.extend_from_slice(&self.payload);
        buf
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_big_endian_fields() {
        let msg = Message::request(1, 16384, 16384);
        let bytes = msg.serialize();
        assert_eq!(&bytes[0..4], &13u32.to_be_bytes());
        assert_eq!(bytes[4], 6);
        assert_eq!(BigEndian::read_u32(&bytes[5..9]), 1);
        assert_eq!(BigEndian::read_u32(&bytes[9..13]), 16384);
        assert_eq!(BigEndian::read_u32(&bytes[13..17]), 16384);
    }

    #[test]
    fn message_id_round_trips_through_raw_byte() {
        for raw in [0u8, 1, 2, 4, 5, 6, 7, 20] {
            let id = MessageId::from(raw);
            assert_eq!(u8::from(id), raw);
        }
    }

    #[test]
    fn extended_handshake_advertises_ut_pex() {
        let msg = Message::extended_handshake();
        assert_eq!(msg.id, MessageId::Extended);
        assert_eq!(msg.payload[0], 0);
        assert!(msg.payload[1..].ends_with(b"e"));
    }
}
