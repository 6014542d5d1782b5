//! Recursive-descent decoder over a byte-oriented stream.
//!
//! Framing: `i<digits>e` integer (optional leading `-`), `<len>:<bytes>` byte
//! string, `l…e` list, `d…e` dict. Dictionary keys are not required to be
//! sorted on the way in — insertion order is preserved so a decoded subtree
//! can be re-encoded byte-for-byte (see `encoder::encode`).
use super::{BencodeError, BencodeResult, BencodeValue};
use std::io::{self, Read};

/// Decodes a single bencoded value from the front of `reader`. Trailing bytes
/// after the value are left unread.
#[tracing::instrument(skip(reader), level = "trace")]
pub fn decode<R: Read>(reader: &mut std::iter::Peekable<io::Bytes<R>>) -> BencodeResult<BencodeValue> {
    decode_value(reader)
}

fn decode_value<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<BencodeValue> {
    let &first = peek(reader)?;
    match first {
        b'0'..=b'9' => decode_bytes(reader).map(BencodeValue::Bytes),
        b'i' => decode_integer(reader).map(BencodeValue::Integer),
        b'l' => decode_list(reader).map(BencodeValue::List),
        b'd' => decode_dict(reader).map(BencodeValue::Dict),
        other => Err(BencodeError::Malformed(format!(
            "unexpected byte {:?} at start of value",
            other as char
        ))),
    }
}

fn peek<'a, R: Read>(
    reader: &'a mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<&'a u8> {
    match reader.peek() {
        Some(Ok(b)) => Ok(b),
        Some(Err(e)) => Err(BencodeError::Io(io::Error::new(e.kind(), e.to_string()))),
        None => Err(BencodeError::UnexpectedEof),
    }
}

fn next_byte<R: Read>(reader: &mut std::iter::Peekable<io::Bytes<R>>) -> BencodeResult<u8> {
    match reader.next() {
        Some(Ok(b)) => Ok(b),
        Some(Err(e)) => Err(BencodeError::Io(io::Error::new(e.kind(), e.to_string()))),
        None => Err(BencodeError::UnexpectedEof),
    }
}

/// Reads bytes up to (and consuming) `delimiter`, returned as a decimal
/// ASCII string — used for the length prefix of strings and the digits of
/// integers.
fn read_digits_until<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
    delimiter: u8,
) -> BencodeResult<String> {
    let mut buf = Vec::new();
    loop {
        let b = next_byte(reader)?;
        if b == delimiter {
            break;
        }
        buf.push(b);
    }
    String::from_utf8(buf)
        .map_err(|e| BencodeError::Malformed(format!("non-ASCII length/integer digits: {e}")))
}

#[tracing::instrument(skip(reader), level = "trace")]
fn decode_bytes<R: Read>(reader: &mut std::iter::Peekable<io::Bytes<R>>) -> BencodeResult<Vec<u8>> {
    let len_str = read_digits_until(reader, b':')?;
    let len: usize = len_str
        .parse()
        .map_err(|_| BencodeError::Malformed(format!("invalid string length {len_str:?}")))?;
    let mut out = vec![0u8; len];
    for slot in out.iter_mut() {
        *slot = next_byte(reader)?;
    }
    Ok(out)
}

#[tracing::instrument(skip(reader), level = "trace")]
fn decode_integer<R: Read>(reader: &mut std::iter::Peekable<io::Bytes<R>>) -> BencodeResult<i64> {
    let marker = next_byte(reader)?;
    if marker != b'i' {
        return Err(BencodeError::Malformed("integer must start with 'i'".into()));
    }
    let digits = read_digits_until(reader, b'e')?;
    if digits.is_empty() {
        return Err(BencodeError::Malformed("empty integer".into()));
    }
    if digits == "-0" {
        return Err(BencodeError::Malformed("negative zero is not valid".into()));
    }
    let unsigned = digits.strip_prefix('-').unwrap_or(&digits);
    if unsigned.len() > 1 && unsigned.starts_with('0') {
        return Err(BencodeError::Malformed("leading zero in integer".into()));
    }
    digits
        .parse()
        .map_err(|_| BencodeError::Malformed(format!("invalid integer {digits:?}")))
}

#[tracing::instrument(skip(reader), level = "trace")]
fn decode_list<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<Vec<BencodeValue>> {
    let marker = next_byte(reader)?;
    if marker != b'l' {
        return Err(BencodeError::Malformed("list must start with 'l'".into()));
    }
    let mut items = Vec::new();
    loop {
        if *peek(reader)? == b'e' {
            next_byte(reader)?;
            break;
        }
        items.push(decode_value(reader)?);
    }
    Ok(items)
}

#[tracing::instrument(skip(reader), level = "trace")]
fn decode_dict<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<Vec<(Vec<u8>, BencodeValue)>> {
    let marker = next_byte(reader)?;
    if marker != b'd' {
        return Err(BencodeError::Malformed("dict must start with 'd'".into()));
    }
    let mut entries = Vec::new();
    loop {
        if *peek(reader)? == b'e' {
            next_byte(reader)?;
            break;
        }
        let key = decode_bytes(reader)?;
        let value = decode_value(reader)?;
        entries.push((key, value));
    }
    Ok(entries)
}

/// Decodes a complete bencoded value from an in-memory buffer.
pub fn decode_bytes_buffer(buf: &[u8]) -> BencodeResult<BencodeValue> {
    let mut reader = Read::bytes(buf).peekable();
    decode(&mut reader)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::encoder::encode_to_vec;

    #[test]
    fn decodes_integer() {
        assert_eq!(decode_bytes_buffer(b"i42e").unwrap(), BencodeValue::Integer(42));
        assert_eq!(decode_bytes_buffer(b"i-42e").unwrap(), BencodeValue::Integer(-42));
        assert_eq!(decode_bytes_buffer(b"i0e").unwrap(), BencodeValue::Integer(0));
    }

    #[test]
    fn rejects_malformed_integers() {
        assert!(decode_bytes_buffer(b"i-0e").is_err());
        assert!(decode_bytes_buffer(b"i01e").is_err());
        assert!(decode_bytes_buffer(b"ie").is_err());
    }

    #[test]
    fn decodes_byte_string() {
        assert_eq!(
            decode_bytes_buffer(b"4:spam").unwrap(),
            BencodeValue::Bytes(b"spam".to_vec())
        );
        assert_eq!(decode_bytes_buffer(b"0:").unwrap(), BencodeValue::Bytes(vec![]));
    }

    #[test]
    fn decodes_list_and_dict_preserving_order() {
        let list = decode_bytes_buffer(b"l4:spami42ee").unwrap();
        assert_eq!(
            list,
            BencodeValue::List(vec![
                BencodeValue::Bytes(b"spam".to_vec()),
                BencodeValue::Integer(42),
            ])
        );

        let dict = decode_bytes_buffer(b"d3:zoo3:bar3:foo3:baze").unwrap();
        match &dict {
            BencodeValue::Dict(pairs) => {
                assert_eq!(pairs[0].0, b"zoo");
                assert_eq!(pairs[1].0, b"foo");
            }
            _ => panic!("expected dict"),
        }
    }

    #[test]
    fn fails_on_truncated_input() {
        assert!(decode_bytes_buffer(b"5:hi").is_err());
        assert!(decode_bytes_buffer(b"i42").is_err());
        assert!(decode_bytes_buffer(b"l4:spam").is_err());
    }

    #[test]
    fn round_trips_through_encode() {
        let original = decode_bytes_buffer(b"d3:bar4:spam3:fooi42ee").unwrap();
        let re_encoded = encode_to_vec(&original).unwrap();
        let reparsed = decode_bytes_buffer(&re_encoded).unwrap();
        assert_eq!(original, reparsed);
    }
}
