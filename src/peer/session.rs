//! Per-peer session: owns one TCP connection split into independent read
//! and write halves so a request worker can send while the read loop
//! processes incoming messages concurrently. Shared mutable state (choked
//! flag, peer bitfield, backlog permits) lives behind `SessionState`, which
//! both sides hold an `Arc` to.
use super::handshake::Handshake;
use super::message::{Message, MessageId};
use super::{PeerError, PeerResult};
use crate::bencode::{decoder, BencodeValue};
use crate::bitfield::Bitfield;
use crate::stats::Stats;
use crate::torrent::Torrent;
use crate::wire::tcp::TcpConnector;
use byteorder::{BigEndian, ByteOrder};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

const FRAME_READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const BACKLOG_CAPACITY: usize = 32;

/// A fully reassembled piece handed from a session's read loop to its
/// owning request worker.
#[derive(Debug)]
pub struct PieceBlock {
    pub index: u32,
    pub data: Vec<u8>,
}

struct SessionState {
    choked: AtomicBool,
    peer_bitfield: Mutex<Bitfield>,
    remote_ut_pex_id: Mutex<Option<u8>>,
    backlog: Semaphore,
}

/// One logical peer conversation. Created by `connect`, owned exclusively
/// by the request worker that drives it; the read loop runs as an
/// independent task sharing only `SessionState`.
pub struct PeerSession {
    pub addr: SocketAddr,
    pub remote_peer_id: [u8; 20],
    write_half: OwnedWriteHalf,
    state: Arc<SessionState>,
    pieces_rx: mpsc::Receiver<PieceBlock>,
}

impl PeerSession {
    #[instrument(skip(torrent, local_peer_id, stats, pex_tx), fields(%addr), level = "debug")]
    pub async fn connect(
        addr: SocketAddr,
        torrent: Arc<Torrent>,
        local_peer_id: [u8; 20],
        stats: Arc<Stats>,
        pex_tx: mpsc::Sender<SocketAddr>,
    ) -> PeerResult<Self> {
        let mut connector = TcpConnector::new(addr);
        connector.dial().await.map_err(PeerError::Wire)?;
        let stream = connector.into_stream().expect("dial just connected");

        let local = Handshake::new(torrent.info_hash, local_peer_id);
        let (mut read_half, mut write_half) = stream.into_split();
        let remote = exchange_handshake(&mut read_half, &mut write_half, &local).await?;

        let state = Arc::new(SessionState {
            choked: AtomicBool::new(true),
            peer_bitfield: Mutex::new(Bitfield::new(torrent.piece_count())),
            remote_ut_pex_id: Mutex::new(None),
            backlog: Semaphore::new(BACKLOG_CAPACITY),
        });

        write_half.write_all(&Message::extended_handshake().serialize()).await?;
        write_half.write_all(&Message::unchoke().serialize()).await?;
        write_half.write_all(&Message::interested().serialize()).await?;

        let (pieces_tx, pieces_rx) = mpsc::channel(8);
        let read_loop_state = Arc::clone(&state);
        tokio::spawn(async move {
            match read_loop(read_half, read_loop_state, torrent, pieces_tx, pex_tx, stats).await {
                Ok(()) => {}
                Err(err) => warn!(%addr, %err, "peer session closed on protocol violation"),
            }
        });

        Ok(Self {
            addr,
            remote_peer_id: remote.peer_id,
            write_half,
            state,
            pieces_rx,
        })
    }

    pub fn choked(&self) -> bool {
        self.state.choked.load(Ordering::Acquire)
    }

    pub async fn peer_has(&self, index: usize) -> bool {
        self.state.peer_bitfield.lock().await.has(index).unwrap_or(false)
    }

    /// Clones the peer's current bitfield so the picker can scan it without
    /// holding the session's lock across a linear scan of every piece index.
    pub async fn peer_bitfield_snapshot(&self) -> Bitfield {
        self.state.peer_bitfield.lock().await.clone()
    }

    pub fn backlog(&self) -> &Semaphore {
        &self.state.backlog
    }

    /// The extension-protocol message id the remote wants PEX replies
    /// tagged with, learned from its extension handshake. Unused today —
    /// this client only leeches and never sends PEX of its own — but kept
    /// since dropping it would silently discard a piece of remote state we
    /// already parse.
    pub async fn remote_ut_pex_id(&self) -> Option<u8> {
        *self.state.remote_ut_pex_id.lock().await
    }

    pub async fn send_request(&mut self, index: u32, begin: u32, length: u32) -> PeerResult<()> {
        let msg = Message::request(index, begin, length);
        self.write_half.write_all(&msg.serialize()).await?;
        Ok(())
    }

    /// Waits for the next fully reassembled piece from this session's read
    /// loop, or `None` if the loop has terminated.
    pub async fn recv_piece(&mut self) -> Option<PieceBlock> {
        self.pieces_rx.recv().await
    }

    /// Shuts down our write half, which in turn causes the peer's read to
    /// see EOF and the peer to close, unblocking our own read loop.
    pub async fn close(&mut self) {
        let _ = self.write_half.shutdown().await;
    }
}

async fn exchange_handshake(
    read_half: &mut OwnedReadHalf,
    write_half: &mut OwnedWriteHalf,
    local: &Handshake,
) -> PeerResult<Handshake> {
    write_half.write_all(&local.serialize()).await?;
    let mut buf = [0u8; 68];
    timeout(Duration::from_secs(5), read_half.read_exact(&mut buf))
        .await
        .map_err(|_| PeerError::BadHandshake("handshake timed out".into()))??;
    let remote = Handshake::parse(&buf)?;
    if remote.info_hash != local.info_hash {
        return Err(PeerError::InfoHashMismatch);
    }
    Ok(remote)
}

async fn read_message(read_half: &mut OwnedReadHalf) -> PeerResult<Option<Message>> {
    let mut len_buf = [0u8; 4];
    timeout(FRAME_READ_TIMEOUT, read_half.read_exact(&mut len_buf))
        .await
        .map_err(|_| PeerError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "frame read timed out")))??;
    let len = BigEndian::read_u32(&len_buf);
    if len == 0 {
        return Ok(None);
    }
    if len > super::message::MAX_MSG_LEN {
        return Err(PeerError::Oversized(len));
    }
    let mut body = vec![0u8; len as usize];
    timeout(FRAME_READ_TIMEOUT, read_half.read_exact(&mut body))
        .await
        .map_err(|_| PeerError::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "frame read timed out")))??;
    Ok(Some(Message {
        id: MessageId::from(body[0]),
        payload: body[1..].to_vec(),
    }))
}

/// Drives the read half until the connection closes normally (`Ok(())`) or
/// the peer violates the protocol (`Err(PeerError::Misbehavior)`), so the
/// spawning caller in `connect` can tell the two apart instead of every exit
/// path looking like a quiet disconnect.
#[instrument(skip_all, level = "debug")]
async fn read_loop(
    mut read_half: OwnedReadHalf,
    state: Arc<SessionState>,
    torrent: Arc<Torrent>,
    pieces_tx: mpsc::Sender<PieceBlock>,
    pex_tx: mpsc::Sender<SocketAddr>,
    stats: Arc<Stats>,
) -> PeerResult<()> {
    let piece_count = torrent.piece_count();
    let expected_bitfield_bytes = Bitfield::expected_bytes(piece_count);
    let mut buffers: std::collections::HashMap<u32, (Vec<u8>, usize)> = std::collections::HashMap::new();
    let mut bitfield_seen = false;

    loop {
        let msg = match read_message(&mut read_half).await {
            Ok(Some(msg)) => msg,
            Ok(None) => continue, // keepalive
            Err(err) => {
                debug!(%err, "peer session read loop terminating");
                return Ok(());
            }
        };

        if !bitfield_seen && msg.id != MessageId::Bitfield && msg.id != MessageId::Extended {
            return Err(PeerError::Misbehavior(format!(
                "peer sent {:?} before announcing its bitfield",
                msg.id
            )));
        }

        match msg.id {
            MessageId::Unchoke => {
                if state.choked.swap(false, Ordering::AcqRel) {
                    stats.unchoked_peers.fetch_add(1, Ordering::Relaxed);
                }
            }
            MessageId::Choke => {
                if !state.choked.swap(true, Ordering::AcqRel) {
                    stats.unchoked_peers.fetch_sub(1, Ordering::Relaxed);
                }
            }
            MessageId::Have => {
                if msg.payload.len() == 4 {
                    let index = BigEndian::read_u32(&msg.payload) as usize;
                    let mut bf = state.peer_bitfield.lock().await;
                    if index < bf.len() {
                        let _ = bf.set(index);
                    }
                }
            }
            MessageId::Bitfield => {
                bitfield_seen = true;
                if msg.payload.len() == expected_bitfield_bytes {
                    let bf = Bitfield::from_bytes(msg.payload.clone(), piece_count);
                    let seed = bf.all_set();
                    *state.peer_bitfield.lock().await = bf;
                    stats.bitfield_received.fetch_add(1, Ordering::Relaxed);
                    if seed {
                        stats.seeders.fetch_add(1, Ordering::Relaxed);
                    }
                } else {
                    stats.bitfield_mismatched.fetch_add(1, Ordering::Relaxed);
                }
            }
            MessageId::Extended => {
                if msg.payload.is_empty() {
                    continue;
                }
                let extended_id = msg.payload[0];
                let body = &msg.payload[1..];
                match extended_id {
                    0 => {
                        if let Ok(handshake) = decoder::decode_bytes_buffer(body) {
                            if let Some(id) = extract_ut_pex_id(&handshake) {
                                *state.remote_ut_pex_id.lock().await = Some(id);
                            }
                        }
                    }
                    1 => {
                        if let Ok(dict) = decoder::decode_bytes_buffer(body) {
                            if let Some(added) = dict.get(b"added").and_then(BencodeValue::as_bytes) {
                                for peer_addr in crate::tracker::parse_compact_peers(added) {
                                    let _ = pex_tx.try_send(peer_addr);
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
            MessageId::Piece => {
                state.backlog.add_permits(1);
                if msg.payload.len() < 8 {
                    continue;
                }
                let index = BigEndian::read_u32(&msg.payload[0..4]);
                let begin = BigEndian::read_u32(&msg.payload[4..8]) as usize;
                let block = &msg.payload[8..];
                let expected_size = torrent.piece_size(index as usize) as usize;
                let entry = buffers
                    .entry(index)
                    .or_insert_with(|| (vec![0u8; expected_size], 0));
                if begin + block.len() <= expected_size {
                    entry.0[begin..begin + block.len()].copy_from_slice(block);
                    entry.1 += block.len();
                }
                if entry.1 == expected_size {
                    let (data, _) = buffers.remove(&index).unwrap();
                    if pieces_tx.send(PieceBlock { index, data }).await.is_err() {
                        return Ok(());
                    }
                }
            }
            _ => {}
        }
    }
}

fn extract_ut_pex_id(handshake: &BencodeValue) -> Option<u8> {
    let m = handshake.get(b"m")?;
    let id = m.get(b"ut_pex")?.as_integer()?;
    u8::try_from(id).ok()
}
