//! BEP 3 HTTP tracker announce: a GET request with query parameters, whose
//! bencoded response is walked with the shared decoder rather than a
//! serde-derived struct.
use super::{AnnounceRequest, AnnounceResponse, TrackerError, TrackerResult};
use crate::bencode::{decoder, BencodeValue};
use crate::wire::http;
use tracing::instrument;
use url::Url;

#[instrument(skip(request), level = "debug")]
pub async fn announce(tracker_url: &str, request: &AnnounceRequest) -> TrackerResult<AnnounceResponse> {
    let url = Url::parse(tracker_url)?;
    // `Url::query_pairs_mut` re-escapes through the form-urlencoded escaper,
    // which mangles the already-percent-encoded info_hash/peer_id bytes. The
    // query string is built by hand instead so the manual encoding survives.
    let mut raw = url.as_str().to_string();
    if let Some(query_start) = raw.find('?') {
        raw.truncate(query_start);
    }
    let query = format!(
        "info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
        super::url_encode(&request.info_hash),
        super::url_encode(&request.peer_id),
        request.port,
        request.uploaded,
        request.downloaded,
        request.left,
    );
    let full_url = Url::parse(&format!("{raw}?{query}"))?;

    let body = http::get(full_url).await?;
    parse_response(&body)
}

fn parse_response(bytes: &[u8]) -> TrackerResult<AnnounceResponse> {
    let root = decoder::decode_bytes_buffer(bytes)?;

    if let Some(reason) = root.get(b"failure reason").and_then(BencodeValue::as_bytes) {
        return Err(TrackerError::Failure(String::from_utf8_lossy(reason).into_owned()));
    }

    let interval = root
        .get(b"interval")
        .and_then(BencodeValue::as_integer)
        .ok_or_else(|| TrackerError::Malformed("missing interval".into()))? as u32;

    let peers_value = root
        .get(b"peers")
        .ok_or_else(|| TrackerError::Malformed("missing peers".into()))?;

    let peers = match peers_value {
        BencodeValue::Bytes(compact) => super::parse_compact_peers(compact),
        BencodeValue::List(dicts) => dicts
            .iter()
            .filter_map(|entry| {
                let ip = entry.get(b"ip").and_then(BencodeValue::as_bytes)?;
                let ip = std::str::from_utf8(ip).ok()?.parse().ok()?;
                let port = entry.get(b"port").and_then(BencodeValue::as_integer)? as u16;
                Some(std::net::SocketAddr::new(ip, port))
            })
            .collect(),
        _ => return Err(TrackerError::Malformed("peers field has unexpected type".into())),
    };

    Ok(AnnounceResponse { interval, peers })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_compact_response() {
        let raw = b"d8:intervali1800e5:peers6:\x7f\x00\x00\x01\x1a\xe1e";
        let resp = parse_response(raw).unwrap();
        assert_eq!(resp.interval, 1800);
        assert_eq!(resp.peers.len(), 1);
    }

    #[test]
    fn surfaces_failure_reason() {
        let raw = b"d14:failure reason13:bad info_hashe";
        let err = parse_response(raw).unwrap_err();
        assert!(matches!(err, TrackerError::Failure(_)));
    }
}
