//! Compact bit vector shared between the peer session and the downloader's
//! work claim: one bit per piece, MSB-first within each byte (bit `i` lives
//! at byte `i / 8`, bit position `7 - (i % 8)`), matching the wire BITFIELD
//! message layout directly.
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BitfieldError {
    #[error("piece index {index} out of range (0..{len})")]
    OutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bytes: Vec<u8>,
    len: usize,
}

impl Bitfield {
    /// Allocates a cleared bitfield holding `len` bits.
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0u8; len.div_ceil(8)],
            len,
        }
    }

    /// Wraps an already-sized byte buffer (e.g. a received BITFIELD payload)
    /// without validating its length against a piece count — callers that
    /// need the length check should compare `expected_bytes()` first.
    pub fn from_bytes(bytes: Vec<u8>, len: usize) -> Self {
        Self { bytes, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bytes a BITFIELD payload for `len` pieces must occupy.
    pub fn expected_bytes(len: usize) -> usize {
        len.div_ceil(8)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn check(&self, index: usize) -> Result<(usize, u8), BitfieldError> {
        if index >= self.len {
            return Err(BitfieldError::OutOfRange { index, len: self.len });
        }
        Ok((index / 8, 1u8 << (7 - (index % 8))))
    }

    pub fn has(&self, index: usize) -> Result<bool, BitfieldError> {
        let (byte, mask) = self.check(index)?;
        Ok(self.bytes[byte] & mask != 0)
    }

    pub fn set(&mut self, index: usize) -> Result<(), BitfieldError> {
        let (byte, mask) = self.check(index)?;
        self.bytes[byte] |= mask;
        Ok(())
    }

    pub fn clear(&mut self, index: usize) -> Result<(), BitfieldError> {
        let (byte, mask) = self.check(index)?;
        self.bytes[byte] &= !mask;
        Ok(())
    }

    /// True iff every valid bit is set — used to recognize a seed from its
    /// BITFIELD message.
    pub fn all_set(&self) -> bool {
        (0..self.len).all(|i| self.has(i).unwrap_or(false))
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.has(i).unwrap_or(false))
    }
}
