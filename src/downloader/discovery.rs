//! Tracker polling: announces to every tier of the torrent's announce-list
//! once, then re-announces every `DISCOVERY_INTERVAL`, offering each
//! returned peer to the downloader. UDP and HTTP trackers are both
//! supported via the `tracker` module's two transports.
use super::{Downloader, LISTEN_PORT};
use crate::tracker::udp::UdpTracker;
use crate::tracker::{http as tracker_http, AnnounceRequest};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const DISCOVERY_INTERVAL: Duration = Duration::from_secs(60);

pub(crate) async fn discovery_loop(downloader: Arc<Downloader>) {
    let urls = announce_urls(&downloader);
    if urls.is_empty() {
        warn!("torrent has no announce URLs, discovery loop idle");
        return;
    }

    loop {
        for url in &urls {
            if downloader.is_complete() {
                return;
            }
            let downloader = Arc::clone(&downloader);
            let url = url.clone();
            tokio::spawn(async move { poll_tracker(downloader, url).await });
        }

        tokio::time::sleep(DISCOVERY_INTERVAL).await;
        if downloader.is_complete() {
            return;
        }
    }
}

fn announce_urls(downloader: &Downloader) -> Vec<String> {
    let mut urls: Vec<String> = downloader
        .torrent
        .announce_list
        .iter()
        .flatten()
        .cloned()
        .collect();
    if urls.is_empty() {
        if let Some(announce) = &downloader.torrent.announce {
            urls.push(announce.clone());
        }
    }
    urls
}

pub(crate) async fn poll_tracker(downloader: Arc<Downloader>, url: String) {
    let request = AnnounceRequest {
        info_hash: downloader.torrent.info_hash,
        peer_id: downloader.local_peer_id,
        port: LISTEN_PORT,
        uploaded: 0,
        downloaded: 0,
        left: downloader.torrent.total_length,
    };

    let result = match Url::parse(&url) {
        Ok(parsed) if parsed.scheme() == "udp" => announce_udp(&parsed, &request).await,
        Ok(_) => tracker_http::announce(&url, &request).await,
        Err(err) => {
            debug!(%url, %err, "tracker URL failed to parse");
            return;
        }
    };

    match result {
        Ok(response) => {
            downloader.stats.valid_trackers.fetch_add(1, Ordering::Relaxed);
            downloader
                .stats
                .peers_provided
                .fetch_add(response.peers.len() as i64, Ordering::Relaxed);
            for addr in response.peers {
                downloader.offer_peer(addr).await;
            }
        }
        Err(err) => debug!(%url, %err, "tracker announce failed"),
    }
}

async fn announce_udp(
    url: &Url,
    request: &AnnounceRequest,
) -> crate::tracker::TrackerResult<crate::tracker::AnnounceResponse> {
    let tracker = UdpTracker::connect_to(url).await?;
    tracker.announce(request).await
}
