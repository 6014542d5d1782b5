//! Walks a decoded bencode tree into an immutable `Torrent` descriptor.
use crate::bencode::{decoder, BencodeValue};
use crate::torrent::{info_hash, TorrentError, TorrentResult};
use std::io::Read;

/// One entry of the torrent's file list: a path relative to the torrent's
/// output directory and its declared length in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub length: i64,
}

/// Immutable torrent descriptor. Constructed once by `Torrent::parse` and
/// shared (by reference) across every peer session and downloader task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Torrent {
    pub announce: Option<String>,
    pub announce_list: Vec<Vec<String>>,
    pub info_hash: [u8; 20],
    pub piece_hashes: Vec<[u8; 20]>,
    pub piece_length: i64,
    pub total_length: i64,
    pub files: Vec<FileEntry>,
    pub name: String,
}

impl Torrent {
    pub fn from_reader<R: Read>(mut reader: R) -> TorrentResult<Self> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Self::from_bytes(&buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> TorrentResult<Self> {
        let root = decoder::decode_bytes_buffer(bytes)?;
        Self::parse(&root)
    }

    pub fn parse(root: &BencodeValue) -> TorrentResult<Self> {
        let info = root
            .get(b"info")
            .ok_or_else(|| TorrentError::MissingField("info".into()))?;
        if info.as_dict().is_none() {
            return Err(TorrentError::InvalidMetainfo("info is not a dictionary".into()));
        }

        let info_hash = info_hash::calculate(info)?;

        let piece_length = required_integer(info, "piece length")?;
        if piece_length <= 0 {
            return Err(TorrentError::InvalidMetainfo("piece length must be positive".into()));
        }

        let pieces_bytes = required_bytes(info, "pieces")?;
        if pieces_bytes.len() % 20 != 0 {
            return Err(TorrentError::InvalidPiecesHashLength(pieces_bytes.len()));
        }
        let piece_hashes: Vec<[u8; 20]> = pieces_bytes
            .chunks_exact(20)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect();

        let name = utf8_field(required_bytes(info, "name")?, "name")?;

        let (files, total_length) = if let Some(length_val) = info.get(b"length") {
            let length = length_val
                .as_integer()
                .ok_or_else(|| TorrentError::InvalidMetainfo("length is not an integer".into()))?;
            if length <= 0 {
                return Err(TorrentError::InvalidMetainfo("file length must be positive".into()));
            }
            (vec![FileEntry { path: name.clone(), length }], length)
        } else {
            let files_list = info
                .get(b"files")
                .and_then(BencodeValue::as_list)
                .ok_or_else(|| TorrentError::MissingField("files".into()))?;
            let mut entries = Vec::with_capacity(files_list.len());
            let mut total = 0i64;
            for file_val in files_list {
                let length = required_integer(file_val, "length")?;
                if length <= 0 {
                    return Err(TorrentError::InvalidMetainfo("file length must be positive".into()));
                }
                let path_list = file_val
                    .get(b"path")
                    .and_then(BencodeValue::as_list)
                    .ok_or_else(|| TorrentError::MissingField("path".into()))?;
                let mut components = vec![name.clone()];
                for component in path_list {
                    let bytes = component
                        .as_bytes()
                        .ok_or_else(|| TorrentError::InvalidMetainfo("path component not a string".into()))?;
                    components.push(utf8_field(bytes, "path component")?);
                }
                total += length;
                entries.push(FileEntry {
                    path: components.join("/"),
                    length,
                });
            }
            (entries, total)
        };

        let announce = match root.get(b"announce") {
            Some(value) => Some(utf8_field(
                value.as_bytes().ok_or_else(|| {
                    TorrentError::InvalidMetainfo("announce is not a string".into())
                })?,
                "announce",
            )?),
            None => None,
        };

        let announce_list = match root.get(b"announce-list") {
            Some(value) => parse_announce_list(value)?,
            None => match &announce {
                Some(url) => vec![vec![url.clone()]],
                None => return Err(TorrentError::MissingField("announce".into())),
            },
        };

        Ok(Torrent {
            announce,
            announce_list,
            info_hash,
            piece_hashes,
            piece_length,
            total_length,
            files,
            name,
        })
    }

    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    /// True size of piece `index`, accounting for a short trailing piece.
    pub fn piece_size(&self, index: usize) -> i64 {
        if index + 1 == self.piece_count() {
            self.total_length - (index as i64) * self.piece_length
        } else {
            self.piece_length
        }
    }
}

fn required_bytes<'a>(value: &'a BencodeValue, key: &str) -> TorrentResult<&'a [u8]> {
    value
        .get(key.as_bytes())
        .and_then(BencodeValue::as_bytes)
        .ok_or_else(|| TorrentError::MissingField(key.to_string()))
}

fn required_integer(value: &BencodeValue, key: &str) -> TorrentResult<i64> {
    value
        .get(key.as_bytes())
        .and_then(BencodeValue::as_integer)
        .ok_or_else(|| TorrentError::MissingField(key.to_string()))
}

fn utf8_field(bytes: &[u8], field: &str) -> TorrentResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| TorrentError::InvalidPath(field.to_string()))
}

fn parse_announce_list(value: &BencodeValue) -> TorrentResult<Vec<Vec<String>>> {
    let tiers = value
        .as_list()
        .ok_or_else(|| TorrentError::InvalidMetainfo("announce-list is not a list".into()))?;
    let mut out = Vec::with_capacity(tiers.len());
    for tier in tiers {
        let urls = tier
            .as_list()
            .ok_or_else(|| TorrentError::InvalidMetainfo("announce-list tier is not a list".into()))?;
        let mut tier_urls = Vec::with_capacity(urls.len());
        for url in urls {
            let bytes = url
                .as_bytes()
                .ok_or_else(|| TorrentError::InvalidMetainfo("tracker URL is not a string".into()))?;
            tier_urls.push(utf8_field(bytes, "tracker URL")?);
        }
        out.push(tier_urls);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bencode_str(s: &str) -> String {
        format!("{}:{}", s.len(), s)
    }

    #[test]
    fn parses_single_file_torrent() {
        let pieces = [0u8; 20 * 3];
        let raw = format!(
            "d8:announce20:http://tracker.local4:infod6:lengthi10e4:name{name_field}12:piece lengthi4e6:pieces{pieces_len}:{pieces}ee",
            name_field = bencode_str("hello"),
            pieces_len = pieces.len(),
            pieces = String::from_utf8_lossy(&pieces),
        );
        let torrent = Torrent::from_bytes(raw.as_bytes()).unwrap();
        assert_eq!(torrent.total_length, 10);
        assert_eq!(torrent.piece_length, 4);
        assert_eq!(torrent.piece_count(), 3);
        assert_eq!(torrent.files, vec![FileEntry { path: "hello".into(), length: 10 }]);
        assert_eq!(torrent.piece_size(0), 4);
        assert_eq!(torrent.piece_size(2), 2);
        assert_eq!(torrent.announce_list, vec![vec!["http://tracker.local".to_string()]]);
    }

    #[test]
    fn rejects_missing_info() {
        assert!(Torrent::from_bytes(b"d8:announce3:xyze").is_err());
    }

    #[test]
    fn rejects_bad_pieces_length() {
        let raw = "d4:infod6:lengthi10e4:name5:hello12:piece lengthi4e6:pieces3:abce";
        assert!(matches!(
            Torrent::from_bytes(raw.as_bytes()),
            Err(TorrentError::InvalidPiecesHashLength(_))
        ));
    }

    #[test]
    fn multi_file_paths_join_name_and_components() {
        let raw = "d4:infod5:filesld6:lengthi3e4:pathl5:a.bineeld6:lengthi5e4:pathl5:b.bineee4:name3:dir12:piece lengthi4e6:pieces40:00000000000000000000000000000000000000ee";
        let torrent = Torrent::from_bytes(raw.as_bytes()).unwrap();
        assert_eq!(torrent.total_length, 8);
        assert_eq!(torrent.files[0].path, "dir/a.bin");
        assert_eq!(torrent.files[1].path, "dir/b.bin");
    }
}
