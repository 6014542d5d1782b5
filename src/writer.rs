//! Maps a (piece, offset, length) triple onto one or more backing files.
//! Construction pre-allocates every file to its declared length; writes and
//! reads split across file boundaries using plain positional I/O, so no
//! intra-writer serialization is needed beyond what the operating system
//! already gives file handles opened independently per call.
use crate::torrent::Torrent;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("write left {remaining} bytes unplaced (file size mismatch?)")]
    WriteShort { remaining: usize },

    #[error("read returned only {got} of {wanted} requested bytes")]
    ReadShort { got: usize, wanted: usize },
}

pub type WriterResult<T> = std::result::Result<T, WriterError>;

pub struct Writer {
    root: PathBuf,
    files: Vec<(PathBuf, i64)>,
    piece_length: i64,
}

impl Writer {
    /// Pre-allocates every file declared by `torrent` under `root`.
    #[instrument(skip(torrent), level = "debug")]
    pub fn new(torrent: &Torrent, root: impl AsRef<Path>) -> WriterResult<Self> {
        let root = root.as_ref().to_path_buf();
        let mut files = Vec::with_capacity(torrent.files.len());

        for entry in &torrent.files {
            let path = root.join(&entry.path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| WriterError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)
                .map_err(|source| WriterError::Io { path: path.clone(), source })?;
            file.set_len(entry.length as u64)
                .map_err(|source| WriterError::Io { path: path.clone(), source })?;
            files.push((path, entry.length));
        }

        Ok(Self { root, files, piece_length: torrent.piece_length })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[instrument(skip(self, data), level = "trace")]
    pub fn write(&self, piece_index: usize, begin: usize, data: &[u8]) -> WriterResult<()> {
        let mut global_offset = piece_index as i64 * self.piece_length + begin as i64;
        let mut remaining = data;
        let mut file_start = 0i64;

        for (path, length) in &self.files {
            let file_end = file_start + length;
            if global_offset >= file_start && global_offset < file_end && !remaining.is_empty() {
                let relative_offset = global_offset - file_start;
                let amount = remaining.len().min((file_end - global_offset) as usize);
                write_at(path, relative_offset, &remaining[..amount])?;
                global_offset += amount as i64;
                remaining = &remaining[amount..];
            }
            file_start = file_end;
            if remaining.is_empty() {
                break;
            }
        }

        if !remaining.is_empty() {
            return Err(WriterError::WriteShort { remaining: remaining.len() });
        }
        Ok(())
    }

    #[instrument(skip(self), level = "trace")]
    pub fn read(&self, piece_index: usize, begin: usize, length: usize) -> WriterResult<Vec<u8>> {
        let mut global_offset = piece_index as i64 * self.piece_length + begin as i64;
        let mut buf = vec![0u8; length];
        let mut filled = 0usize;
        let mut file_start = 0i64;

        for (path, file_len) in &self.files {
            let file_end = file_start + file_len;
            if global_offset >= file_start && global_offset < file_end && filled < length {
                let relative_offset = global_offset - file_start;
                let amount = (length - filled).min((file_end - global_offset) as usize);
                let chunk = read_at(path, relative_offset, amount)?;
                buf[filled..filled + chunk.len()].copy_from_slice(&chunk);
                filled += chunk.len();
                global_offset += amount as i64;
            }
            file_start = file_end;
            if filled == length {
                break;
            }
        }

        if filled < length {
            return Err(WriterError::ReadShort { got: filled, wanted: length });
        }
        Ok(buf)
    }
}

fn write_at(path: &Path, offset: i64, data: &[u8]) -> WriterResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|source| WriterError::Io { path: path.to_path_buf(), source })?;
    file.seek(SeekFrom::Start(offset as u64))
        .map_err(|source| WriterError::Io { path: path.to_path_buf(), source })?;
    file.write_all(data)
        .map_err(|source| WriterError::Io { path: path.to_path_buf(), source })?;
    Ok(())
}

fn read_at(path: &Path, offset: i64, length: usize) -> WriterResult<Vec<u8>> {
    let mut file = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|source| WriterError::Io { path: path.to_path_buf(), source })?;
    file.seek(SeekFrom::Start(offset as u64))
        .map_err(|source| WriterError::Io { path: path.to_path_buf(), source })?;
    let mut buf = vec![0u8; length];
    file.read_exact(&mut buf)
        .map_err(|source| WriterError::Io { path: path.to_path_buf(), source })?;
    Ok(buf)
}
