//! Processes peer addresses surfaced by any session's extended PEX message,
//! offering each one to the downloader the same way a tracker-discovered
//! peer would be offered. Runs until every session's PEX sender has been
//! dropped (which only happens once every worker has exited).
use super::Downloader;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

pub(crate) async fn pex_processor(downloader: Arc<Downloader>, mut pex_rx: mpsc::Receiver<SocketAddr>) {
    while let Some(addr) = pex_rx.recv().await {
        downloader.stats.pex_processed.fetch_add(1, Ordering::Relaxed);
        let already_seen = downloader.seen.lock().await.contains(&addr);
        if !already_seen {
            downloader.stats.pex_added.fetch_add(1, Ordering::Relaxed);
        }
        downloader.offer_peer(addr).await;
        if downloader.is_complete() {
            return;
        }
    }
}
