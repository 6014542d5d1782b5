//! Exercises the downloader against loopback stand-ins for a tracker and a
//! seeding peer: a single-piece torrent is announced, handshaken, requested,
//! written to disk and verified with no real network involved.
use rs_torrent_client::peer::{Handshake, Message, MessageId, PeerSession};
use rs_torrent_client::stats::Stats;
use rs_torrent_client::torrent::Torrent;
use rs_torrent_client::{verify, Downloader};
use sha1::{Digest, Sha1};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn bencoded_single_file_metainfo(announce: &str, piece: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(piece);
    let hash = hasher.finalize();

    let mut info = Vec::new();
    info.extend_from_slice(b"d");
    info.extend_from_slice(format!("6:lengthi{}e", piece.len()).as_bytes());
    info.extend_from_slice(b"4:name4:test");
    info.extend_from_slice(format!("12:piece lengthi{}e", piece.len()).as_bytes());
    info.extend_from_slice(format!("6:pieces{}:", hash.len()).as_bytes());
    info.extend_from_slice(&hash);
    info.push(b'e');

    let mut root = Vec::new();
    root.push(b'd');
    root.extend_from_slice(format!("8:announce{}:{}", announce.len(), announce).as_bytes());
    root.extend_from_slice(b"4:info");
    root.extend_from_slice(&info);
    root.push(b'e');
    root
}

fn compact_peer(addr: std::net::SocketAddr) -> [u8; 6] {
    let ip = match addr.ip() {
        std::net::IpAddr::V4(v4) => v4.octets(),
        std::net::IpAddr::V6(_) => panic!("test peers are always IPv4"),
    };
    let port = addr.port().to_be_bytes();
    [ip[0], ip[1], ip[2], ip[3], port[0], port[1]]
}

/// Accepts one HTTP connection and replies with a compact-peers tracker
/// response pointing at `peer_addr`, ignoring the request line entirely.
async fn serve_one_tracker_announce(listener: TcpListener, peer_addr: std::net::SocketAddr) {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut buf = [0u8; 4096];
    let _ = stream.read(&mut buf).await;

    let record = compact_peer(peer_addr);
    let mut body = Vec::new();
    body.extend_from_slice(b"d8:intervali1800e5:peers6:");
    body.extend_from_slice(&record);
    body.push(b'e');

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n",
        body.len()
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    stream.write_all(&body).await.unwrap();
    stream.shutdown().await.unwrap();
}

async fn read_frame(stream: &mut TcpStream) -> Option<(u8, Vec<u8>)> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.ok()?;
    let len = u32::from_be_bytes(len_buf);
    if len == 0 {
        return Some((255, Vec::new())); // keepalive sentinel
    }
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await.ok()?;
    Some((body[0], body[1..].to_vec()))
}

/// Accepts one peer connection, performs the handshake, announces a
/// single-piece seed bitfield, unchokes, then answers every REQUEST with
/// the matching slice of `piece` until the stream closes.
async fn serve_one_seeding_peer(listener: TcpListener, info_hash: [u8; 20], piece: Vec<u8>) {
    let (mut stream, _) = listener.accept().await.unwrap();

    let mut handshake_buf = [0u8; 68];
    stream.read_exact(&mut handshake_buf).await.unwrap();
    assert_eq!(&handshake_buf[28..48], &info_hash[..]);

    let reply = Handshake::new(info_hash, [9u8; 20]).serialize();
    stream.write_all(&reply).await.unwrap();

    stream.write_all(&Message::bitfield(vec![0b1000_0000]).serialize()).await.unwrap();
    stream.write_all(&Message::unchoke().serialize()).await.unwrap();

    loop {
        let Some((id, payload)) = read_frame(&mut stream).await else {
            return;
        };
        if id == u8::from(MessageId::Request) {
            let index = u32::from_be_bytes(payload[0..4].try_into().unwrap());
            let begin = u32::from_be_bytes(payload[4..8].try_into().unwrap()) as usize;
            let length = u32::from_be_bytes(payload[8..12].try_into().unwrap()) as usize;
            let mut piece_payload = Vec::with_capacity(8 + length);
            piece_payload.extend_from_slice(&index.to_be_bytes());
            piece_payload.extend_from_slice(&(begin as u32).to_be_bytes());
            piece_payload.extend_from_slice(&piece[begin..begin + length]);
            let msg = Message::new(MessageId::Piece, piece_payload);
            stream.write_all(&msg.serialize()).await.unwrap();
        }
    }
}

#[tokio::test]
async fn downloads_single_piece_torrent_over_loopback_tracker_and_peer() {
    let peer_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let peer_addr = peer_listener.local_addr().unwrap();

    let tracker_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let tracker_addr = tracker_listener.local_addr().unwrap();
    let announce = format!("http://{tracker_addr}/announce");

    let piece = b"leechable-piece-data".to_vec();
    let raw_metainfo = bencoded_single_file_metainfo(&announce, &piece);
    let torrent = Torrent::from_bytes(&raw_metainfo).unwrap();
    let info_hash = torrent.info_hash;

    tokio::spawn(serve_one_tracker_announce(tracker_listener, peer_addr));
    tokio::spawn(serve_one_seeding_peer(peer_listener, info_hash, piece.clone()));

    let output_dir = tempfile::tempdir().unwrap();
    let downloader = Downloader::new(torrent, output_dir.path()).unwrap();
    downloader.run().await;

    timeout(Duration::from_secs(10), downloader.wait_for_completion())
        .await
        .expect("download did not complete within timeout");

    verify::verify(&downloader.torrent, &downloader.writer).unwrap();

    let written = std::fs::read(output_dir.path().join("test")).unwrap();
    assert_eq!(written, piece);
}

#[tokio::test]
async fn peer_session_accepts_mismatched_bitfield_and_still_processes_later_messages() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let info_hash = [7u8; 20];

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut handshake_buf = [0u8; 68];
        stream.read_exact(&mut handshake_buf).await.unwrap();
        stream
            .write_all(&Handshake::new(info_hash, [9u8; 20]).serialize())
            .await
            .unwrap();

        // Wrong length for a 3-piece torrent (should be 1 byte): tolerated,
        // not a fatal protocol violation.
        stream.write_all(&Message::bitfield(vec![0, 0]).serialize()).await.unwrap();

        let mut have_payload = Vec::new();
        have_payload.extend_from_slice(&1u32.to_be_bytes());
        stream
            .write_all(&Message::new(MessageId::Have, have_payload).serialize())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let (pex_tx, _pex_rx) = mpsc::channel(8);
    let torrent = Arc::new(sample_torrent(info_hash));
    let stats = Arc::new(Stats::new(torrent.total_length, std::time::Instant::now()));
    let mut session = PeerSession::connect(addr, torrent, [1u8; 20], stats.clone(), pex_tx)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(session.peer_has(1).await, "HAVE after a mismatched bitfield must still be processed");
    assert_eq!(stats.bitfield_mismatched.load(std::sync::atomic::Ordering::Relaxed), 1);
    session.close().await;
}

fn sample_torrent(info_hash: [u8; 20]) -> Torrent {
    use rs_torrent_client::torrent::FileEntry;
    let mut hasher = Sha1::new();
    hasher.update(b"aaa");
    let h0 = hasher.finalize_reset();
    hasher.update(b"bbb");
    let h1 = hasher.finalize_reset();
    hasher.update(b"c");
    let h2 = hasher.finalize();

    let mut piece_hashes = Vec::new();
    for h in [h0, h1, h2] {
        let mut arr = [0u8; 20];
        arr.copy_from_slice(&h);
        piece_hashes.push(arr);
    }

    Torrent {
        announce: None,
        announce_list: vec![],
        info_hash,
        piece_hashes,
        piece_length: 3,
        total_length: 7,
        files: vec![FileEntry { path: "sample.bin".into(), length: 7 }],
        name: "sample".into(),
    }
}
