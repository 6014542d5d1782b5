//! Deterministic serializer for `BencodeValue` trees.
//!
//! Encoding re-emits dict entries in the order they were decoded (or
//! inserted) rather than sorting keys — this is what lets
//! `torrent::info_hash` recompute an identical info-hash from a round-tripped
//! `info` subtree.
use super::{BencodeError, BencodeResult, BencodeValue};
use std::io::Write;
use tracing::instrument;

#[instrument(skip(writer, s), level = "trace")]
fn encode_bytes<W: Write>(writer: &mut W, s: &[u8]) -> BencodeResult<()> {
    write!(writer, "{}:", s.len())?;
    writer.write_all(s)?;
    Ok(())
}

#[instrument(skip(writer), level = "trace")]
fn encode_integer<W: Write>(writer: &mut W, i: i64) -> BencodeResult<()> {
    write!(writer, "i{}e", i)?;
    Ok(())
}

#[instrument(skip(writer, list), level = "trace")]
fn encode_list<W: Write>(writer: &mut W, list: &[BencodeValue]) -> BencodeResult<()> {
    writer.write_all(b"l")?;
    for item in list {
        encode_value(writer, item)?;
    }
    writer.write_all(b"e")?;
    Ok(())
}

#[instrument(skip(writer, dict), level = "trace")]
fn encode_dict<W: Write>(writer: &mut W, dict: &[(Vec<u8>, BencodeValue)]) -> BencodeResult<()> {
    writer.write_all(b"d")?;
    for (key, value) in dict {
        encode_bytes(writer, key)?;
        encode_value(writer, value)?;
    }
    writer.write_all(b"e")?;
    Ok(())
}

fn encode_value<W: Write>(writer: &mut W, value: &BencodeValue) -> BencodeResult<()> {
    match value {
        BencodeValue::Bytes(s) => encode_bytes(writer, s),
        BencodeValue::Integer(i) => encode_integer(writer, *i),
        BencodeValue::List(list) => encode_list(writer, list),
        BencodeValue::Dict(dict) => encode_dict(writer, dict),
    }
}

/// Encodes `value` into `writer`.
#[instrument(skip(writer), level = "debug")]
pub fn encode<W: Write>(writer: &mut W, value: &BencodeValue) -> BencodeResult<()> {
    encode_value(writer, value)
}

/// Encodes `value` into a freshly allocated byte vector.
pub fn encode_to_vec(value: &BencodeValue) -> BencodeResult<Vec<u8>> {
    let mut buf = Vec::new();
    encode(&mut buf, value)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_each_type() {
        assert_eq!(encode_to_vec(&BencodeValue::Integer(42)).unwrap(), b"i42e");
        assert_eq!(
            encode_to_vec(&BencodeValue::Bytes(b"spam".to_vec())).unwrap(),
            b"4:spam"
        );
        assert_eq!(
            encode_to_vec(&BencodeValue::List(vec![
                BencodeValue::Bytes(b"spam".to_vec()),
                BencodeValue::Integer(42),
            ]))
            .unwrap(),
            b"l4:spami42ee"
        );
        assert_eq!(
            encode_to_vec(&BencodeValue::Dict(vec![(
                b"bar".to_vec(),
                BencodeValue::Bytes(b"spam".to_vec())
            )]))
            .unwrap(),
            b"d3:bar4:spame"
        );
    }

    #[test]
    fn preserves_insertion_order_not_sorted() {
        let dict = BencodeValue::Dict(vec![
            (b"zoo".to_vec(), BencodeValue::Integer(1)),
            (b"apple".to_vec(), BencodeValue::Integer(2)),
        ]);
        assert_eq!(encode_to_vec(&dict).unwrap(), b"d3:zooi1e5:applei2ee");
    }
}
