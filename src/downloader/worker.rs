//! Per-peer request worker: the long-running task spawned for each
//! successfully handshaken session. Waits out chokes, claims a piece the
//! peer advertises, drives the backlog of in-flight block requests, and
//! hands the reassembled piece (or a release) back to the `Downloader`.
use super::picker::pick_piece;
use super::Downloader;
use crate::peer::PeerSession;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, instrument};

const BLOCK_SIZE: u32 = 16_384;
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const MAX_CHOKED_TIME: Duration = Duration::from_secs(60);
const NO_PIECE_RETRY: Duration = Duration::from_secs(1);
const BACKLOG_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(15);
const PIECE_ARRIVAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Bumps `Stats::num_peers` for the worker's whole lifetime, decrementing it
/// again on every exit path via `Drop` so no `return` above needs to
/// remember to do it itself.
struct NumPeersGuard<'a>(&'a Arc<Downloader>);

impl<'a> NumPeersGuard<'a> {
    fn new(downloader: &'a Arc<Downloader>) -> Self {
        downloader.stats.num_peers.fetch_add(1, Ordering::Relaxed);
        Self(downloader)
    }
}

impl Drop for NumPeersGuard<'_> {
    fn drop(&mut self) {
        self.0.stats.num_peers.fetch_sub(1, Ordering::Relaxed);
    }
}

#[instrument(skip_all, fields(addr = %session.addr), level = "debug")]
pub(crate) async fn run(downloader: Arc<Downloader>, mut session: PeerSession) {
    let _num_peers_guard = NumPeersGuard::new(&downloader);

    loop {
        if downloader.is_complete() {
            session.close().await;
            return;
        }

        if !wait_until_unchoked(&mut session).await {
            debug!("peer never unchoked within budget, dropping");
            session.close().await;
            return;
        }

        let peer_bitfield = session.peer_bitfield_snapshot().await;
        downloader.stats.searching.fetch_add(1, Ordering::Relaxed);
        let picked = pick_piece(&downloader, &peer_bitfield).await;
        downloader.stats.searching.fetch_sub(1, Ordering::Relaxed);
        let Some(index) = picked else {
            downloader.stats.not_found.fetch_add(1, Ordering::Relaxed);
            sleep(NO_PIECE_RETRY).await;
            continue;
        };

        let piece_size = downloader.torrent.piece_size(index) as u32;
        match request_piece_blocks(&mut session, index as u32, piece_size).await {
            Ok(()) => {}
            Err(()) => {
                downloader.release_claim(index).await;
                session.close().await;
                return;
            }
        }

        match timeout(PIECE_ARRIVAL_TIMEOUT, session.recv_piece()).await {
            Ok(Some(block)) if block.index as usize == index => {
                downloader.stats.currently_downloading.fetch_sub(1, Ordering::Relaxed);
                if downloader.submit_piece(index, block.data).await.is_err() {
                    session.close().await;
                    return;
                }
            }
            Ok(Some(_stale)) => {
                // A piece for a different index than the one we just
                // requested; this session is single-piece-in-flight so this
                // should not happen, but release our claim defensively.
                downloader.release_claim(index).await;
            }
            Ok(None) => {
                downloader.release_claim(index).await;
                session.close().await;
                return;
            }
            Err(_) => {
                downloader.release_claim(index).await;
            }
        }
    }
}

/// Polls the choke flag at `POLL_INTERVAL` until it clears or
/// `MAX_CHOKED_TIME` elapses, returning whether it cleared in time.
async fn wait_until_unchoked(session: &mut PeerSession) -> bool {
    let deadline = tokio::time::Instant::now() + MAX_CHOKED_TIME;
    loop {
        if !session.choked() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Issues REQUEST messages covering the whole piece in `BLOCK_SIZE` chunks,
/// pacing them against the session's backlog semaphore so no more than
/// `BACKLOG_CAPACITY` blocks are ever outstanding at once.
async fn request_piece_blocks(session: &mut PeerSession, index: u32, piece_size: u32) -> Result<(), ()> {
    let mut begin = 0u32;
    while begin < piece_size {
        let length = BLOCK_SIZE.min(piece_size - begin);
        let permit = timeout(BACKLOG_ACQUIRE_TIMEOUT, session.backlog().acquire())
            .await
            .map_err(|_| ())?
            .map_err(|_| ())?;
        permit.forget();
        session.send_request(index, begin, length).await.map_err(|_| ())?;
        begin += length;
    }
    Ok(())
}
