use crate::bencode::{encoder, BencodeValue};
use crate::torrent::TorrentResult;
use sha1::{Digest, Sha1};

/// SHA-1 over the exact re-encoded byte sequence of the `info` subtree. The
/// caller passes the decoded `info` value directly (insertion order
/// preserved by `BencodeValue::Dict`), so this reproduces the identity the
/// remote swarm agrees on regardless of how the original file laid its keys
/// out.
pub fn calculate(info: &BencodeValue) -> TorrentResult<[u8; 20]> {
    let encoded = encoder::encode_to_vec(info)?;
    let mut hasher = Sha1::new();
    hasher.update(&encoded);
    let digest = hasher.finalize();
    let mut info_hash = [0u8; 20];
    info_hash.copy_from_slice(&digest);
    Ok(info_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::decoder::decode_bytes_buffer;

    #[test]
    fn hash_is_stable_across_decode_reencode() {
        let info = decode_bytes_buffer(b"d6:lengthi10e4:name5:hello12:piece lengthi4eee").unwrap();
        let a = calculate(&info).unwrap();
        let reencoded = encoder::encode_to_vec(&info).unwrap();
        let reparsed = decode_bytes_buffer(&reencoded).unwrap();
        let b = calculate(&reparsed).unwrap();
        assert_eq!(a, b);
    }
}
