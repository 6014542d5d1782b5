//! The orchestrator: owns the shared work claim (`have`/`requested`
//! bitfields), the peer-id and stats, and the channel plumbing that wires
//! the discovery loop, the PEX processor, per-peer workers, and the result
//! processor together into one download.
//!
//! `Downloader` keeps a `Weak<Self>` back-reference (set via
//! `Arc::new_cyclic` at construction) so its own `&self` methods can mint an
//! owned `Arc<Downloader>` to hand to a spawned task without the caller
//! threading one through — the session/task holds that Arc for its own
//! lifetime, the Downloader never owns its tasks (see spec's note on
//! breaking the Downloader/session reference cycle with a back-reference).
use crate::bitfield::Bitfield;
use crate::peer::{PeerError, PeerSession};
use crate::stats::Stats;
use crate::torrent::Torrent;
use crate::writer::{Writer, WriterError};
use sha1::{Digest, Sha1};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, Notify, Semaphore};
use tracing::{debug, info, warn};

pub mod discovery;
pub mod pex;
pub mod picker;
pub mod worker;

const PIECE_QUEUE_CAPACITY: usize = 256;
const PEX_CHANNEL_CAPACITY: usize = 512;
const DISCOVERY_CONCURRENCY: usize = 64;
pub(crate) const LISTEN_PORT: u16 = 6881;

#[derive(Debug, Error)]
pub enum DownloaderError {
    #[error("failed to construct torrent writer: {0}")]
    Writer(#[from] WriterError),
}

pub type DownloaderResult<T> = std::result::Result<T, DownloaderError>;

/// The shared `(have, requested, done)` triple described in spec §3/§5,
/// guarded by one mutex. `have` only ever grows; `requested` bits can be
/// cleared back to zero by `release_claim` on a failed piece.
pub(crate) struct WorkClaim {
    pub have: Bitfield,
    pub requested: Bitfield,
    pub done: usize,
}

struct ResultPiece {
    index: usize,
    data: Vec<u8>,
}

pub struct Downloader {
    pub torrent: Arc<Torrent>,
    pub writer: Arc<Writer>,
    pub stats: Arc<Stats>,
    pub(crate) local_peer_id: [u8; 20],
    pub(crate) claim: Mutex<WorkClaim>,
    pub(crate) seen: Mutex<HashSet<SocketAddr>>,
    pub(crate) discovery_semaphore: Arc<Semaphore>,
    pex_tx: mpsc::Sender<SocketAddr>,
    pex_rx: Mutex<Option<mpsc::Receiver<SocketAddr>>>,
    pieces_tx: mpsc::Sender<ResultPiece>,
    pieces_rx: Mutex<Option<mpsc::Receiver<ResultPiece>>>,
    completion: Notify,
    completed: AtomicBool,
    self_ref: Weak<Downloader>,
}

impl Downloader {
    /// Pre-allocates the output files (failure here is one of the two
    /// user-facing error conditions named in spec §7) and wires up the
    /// channels every long-running task will share.
    pub fn new(torrent: Torrent, output_dir: impl AsRef<Path>) -> DownloaderResult<Arc<Self>> {
        let writer = Writer::new(&torrent, output_dir)?;
        let piece_count = torrent.piece_count();
        let total_length = torrent.total_length;

        let (pieces_tx, pieces_rx) = mpsc::channel(PIECE_QUEUE_CAPACITY);
        let (pex_tx, pex_rx) = mpsc::channel(PEX_CHANNEL_CAPACITY);

        let downloader = Arc::new_cyclic(|weak: &Weak<Downloader>| Downloader {
            torrent: Arc::new(torrent),
            writer: Arc::new(writer),
            stats: Arc::new(Stats::new(total_length, Instant::now())),
            local_peer_id: crate::tracker::generate_peer_id(),
            claim: Mutex::new(WorkClaim {
                have: Bitfield::new(piece_count),
                requested: Bitfield::new(piece_count),
                done: 0,
            }),
            seen: Mutex::new(HashSet::new()),
            discovery_semaphore: Arc::new(Semaphore::new(DISCOVERY_CONCURRENCY)),
            pex_tx,
            pex_rx: Mutex::new(Some(pex_rx)),
            pieces_tx,
            pieces_rx: Mutex::new(Some(pieces_rx)),
            completion: Notify::new(),
            completed: AtomicBool::new(false),
            self_ref: weak.clone(),
        });

        Ok(downloader)
    }

    fn arc(&self) -> Arc<Downloader> {
        self.self_ref
            .upgrade()
            .expect("Downloader is dropped only after every task holding it has returned")
    }

    /// Starts the three long-running activities named in spec §2: the
    /// result processor, the discovery loop, and the PEX processor. Returns
    /// immediately; callers await `wait_for_completion`.
    pub async fn run(&self) {
        let pieces_rx = self.pieces_rx.lock().await.take().expect("run() called once");
        tokio::spawn(result_processor(self.arc(), pieces_rx));

        let pex_rx = self.pex_rx.lock().await.take().expect("run() called once");
        tokio::spawn(pex::pex_processor(self.arc(), pex_rx));

        tokio::spawn(discovery::discovery_loop(self.arc()));
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub async fn wait_for_completion(&self) {
        loop {
            if self.is_complete() {
                return;
            }
            self.completion.notified().await;
        }
    }

    fn signal_completion(&self) {
        self.completed.store(true, Ordering::Release);
        self.completion.notify_waiters();
        info!("download complete: every piece verified and written");
    }

    /// Offers a peer endpoint discovered by the tracker poll or by PEX: if
    /// it hasn't been seen before, attempts a handshake under the bounded
    /// discovery semaphore.
    pub(crate) async fn offer_peer(&self, addr: SocketAddr) {
        {
            let mut seen = self.seen.lock().await;
            if !seen.insert(addr) {
                return;
            }
        }
        let downloader = self.arc();
        tokio::spawn(async move { downloader.attempt_connection(addr).await });
    }

    async fn attempt_connection(&self, addr: SocketAddr) {
        let permit = match Arc::clone(&self.discovery_semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        self.stats.peers_processed.fetch_add(1, Ordering::Relaxed);

        let result = PeerSession::connect(
            addr,
            Arc::clone(&self.torrent),
            self.local_peer_id,
            Arc::clone(&self.stats),
            self.pex_tx.clone(),
        )
        .await;
        drop(permit);

        match result {
            Ok(session) => {
                self.stats.peers_confirmed.fetch_add(1, Ordering::Relaxed);
                self.spawn_worker(session);
            }
            Err(err) => {
                self.stats.peers_denied.fetch_add(1, Ordering::Relaxed);
                debug!(%addr, %err, "peer handshake failed");
            }
        }
    }

    fn spawn_worker(&self, session: PeerSession) {
        let downloader = self.arc();
        tokio::spawn(async move { worker::run(downloader, session).await });
    }

    /// Clears a piece's `requested` bit after a failed attempt — timeout,
    /// hash mismatch, or a write error — making it eligible for another
    /// peer to pick up. Never touches `have`.
    pub(crate) async fn release_claim(&self, index: usize) {
        {
            let mut claim = self.claim.lock().await;
            let _ = claim.requested.clear(index);
        }
        self.stats.currently_downloading.fetch_sub(1, Ordering::Relaxed);
        self.stats.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Hands a fully reassembled piece to the result processor. Errs only
    /// once the processor has shut down (post-completion), in which case
    /// the caller should simply stop.
    pub(crate) async fn submit_piece(&self, index: usize, data: Vec<u8>) -> Result<(), ()> {
        self.pieces_tx
            .send(ResultPiece { index, data })
            .await
            .map_err(|_| ())
    }

    /// The single result processor (spec §4.7): verifies a delivered
    /// piece's digest, writes it, and marks it done.
    async fn handle_piece(&self, piece: ResultPiece) {
        {
            let claim = self.claim.lock().await;
            if claim.have.has(piece.index).unwrap_or(false) {
                return;
            }
        }

        let mut hasher = Sha1::new();
        hasher.update(&piece.data);
        let digest = hasher.finalize();
        if digest.as_slice() != self.torrent.piece_hashes[piece.index] {
            warn!(index = piece.index, "piece failed hash check, releasing claim");
            self.release_claim(piece.index).await;
            return;
        }

        if let Err(err) = self.writer.write(piece.index, 0, &piece.data) {
            warn!(index = piece.index, %err, "piece write failed, releasing claim");
            self.release_claim(piece.index).await;
            return;
        }

        let (done, total) = {
            let mut claim = self.claim.lock().await;
            let _ = claim.have.set(piece.index);
            claim.done += 1;
            (claim.done, self.torrent.piece_count())
        };
        debug!(index = piece.index, done, total, "piece verified and written");
        if done == total {
            self.signal_completion();
        }
    }
}

async fn result_processor(downloader: Arc<Downloader>, mut pieces_rx: mpsc::Receiver<ResultPiece>) {
    while let Some(piece) = pieces_rx.recv().await {
        downloader.handle_piece(piece).await;
        if downloader.is_complete() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::torrent::FileEntry;

    fn digest(bytes: &[u8]) -> [u8; 20] {
        let mut hasher = Sha1::new();
        hasher.update(bytes);
        let mut out = [0u8; 20];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    fn sample_torrent() -> Torrent {
        Torrent {
            announce: None,
            announce_list: vec![vec!["udp://tracker.local:80".into()]],
            info_hash: [0u8; 20],
            piece_hashes: vec![digest(b"abcd"), digest(b"efgh")],
            piece_length: 4,
            total_length: 8,
            files: vec![FileEntry { path: "out.bin".into(), length: 8 }],
            name: "test".into(),
        }
    }

    #[tokio::test]
    async fn handle_piece_sets_have_on_valid_hash() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(sample_torrent(), dir.path()).unwrap();
        {
            let mut claim = downloader.claim.lock().await;
            claim.requested.set(0).unwrap();
        }

        downloader
            .handle_piece(ResultPiece { index: 0, data: b"abcd".to_vec() })
            .await;

        let claim = downloader.claim.lock().await;
        assert!(claim.have.has(0).unwrap());
        assert_eq!(claim.done, 1);
    }

    #[tokio::test]
    async fn handle_piece_clears_requested_and_counts_failure_on_hash_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(sample_torrent(), dir.path()).unwrap();
        {
            let mut claim = downloader.claim.lock().await;
            claim.requested.set(1).unwrap();
        }

        downloader
            .handle_piece(ResultPiece { index: 1, data: b"wxyz".to_vec() })
            .await;

        let claim = downloader.claim.lock().await;
        assert!(!claim.have.has(1).unwrap());
        assert!(!claim.requested.has(1).unwrap());
        drop(claim);
        assert_eq!(downloader.stats.failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn duplicate_piece_after_have_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(sample_torrent(), dir.path()).unwrap();
        downloader
            .handle_piece(ResultPiece { index: 0, data: b"abcd".to_vec() })
            .await;
        assert_eq!(downloader.stats.failed.load(Ordering::Relaxed), 0);

        // A duplicate/late arrival for the same index must not reset `done`
        // or touch `failed`, even if its bytes would fail the hash check.
        downloader
            .handle_piece(ResultPiece { index: 0, data: b"xxxx".to_vec() })
            .await;

        let claim = downloader.claim.lock().await;
        assert_eq!(claim.done, 1);
        drop(claim);
        assert_eq!(downloader.stats.failed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn signals_completion_once_every_piece_is_in() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(sample_torrent(), dir.path()).unwrap();
        downloader
            .handle_piece(ResultPiece { index: 0, data: b"abcd".to_vec() })
            .await;
        assert!(!downloader.is_complete());

        downloader
            .handle_piece(ResultPiece { index: 1, data: b"efgh".to_vec() })
            .await;
        assert!(downloader.is_complete());
    }
}
