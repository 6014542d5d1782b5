//! Post-download verifier: re-reads every piece from disk and checks its
//! digest. Used after the downloader's completion signal fires, and can
//! also be invoked standalone against an already-downloaded torrent.
use crate::torrent::Torrent;
use crate::writer::Writer;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("writer error: {0}")]
    Writer(#[from] crate::writer::WriterError),

    #[error("verification failed at piece {index}: hash mismatch")]
    HashMismatch { index: usize },
}

pub type VerifyResult<T> = std::result::Result<T, VerifyError>;

#[instrument(skip(torrent, writer), level = "info")]
pub fn verify(torrent: &Torrent, writer: &Writer) -> VerifyResult<()> {
    for (index, expected) in torrent.piece_hashes.iter().enumerate() {
        let size = torrent.piece_size(index) as usize;
        let data = writer.read(index, 0, size)?;
        let mut hasher = Sha1::new();
        hasher.update(&data);
        let digest = hasher.finalize();
        if digest.as_slice() != expected {
            return Err(VerifyError::HashMismatch { index });
        }
        info!(index, total = torrent.piece_count(), "verified piece");
    }
    Ok(())
}
