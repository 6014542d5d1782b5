//! Atomic counters tracking the download's progress, readable without
//! locking from anywhere (a future dashboard, logging, tests).
use std::sync::atomic::AtomicI64;
use std::time::Instant;

#[derive(Debug)]
pub struct Stats {
    pub start_time: Instant,
    pub total_size: i64,
    pub peers_processed: AtomicI64,
    pub peers_confirmed: AtomicI64,
    pub peers_denied: AtomicI64,
    pub peers_provided: AtomicI64,
    pub valid_trackers: AtomicI64,
    pub pex_processed: AtomicI64,
    pub pex_added: AtomicI64,
    pub num_peers: AtomicI64,
    pub currently_downloading: AtomicI64,
    pub failed: AtomicI64,
    pub searching: AtomicI64,
    pub not_found: AtomicI64,
    pub unchoked_peers: AtomicI64,
    pub seeders: AtomicI64,
    pub bitfield_received: AtomicI64,
    pub bitfield_mismatched: AtomicI64,
}

impl Stats {
    pub fn new(total_size: i64, start_time: Instant) -> Self {
        Self {
            start_time,
            total_size,
            peers_processed: AtomicI64::new(0),
            peers_confirmed: AtomicI64::new(0),
            peers_denied: AtomicI64::new(0),
            peers_provided: AtomicI64::new(0),
            valid_trackers: AtomicI64::new(0),
            pex_processed: AtomicI64::new(0),
            pex_added: AtomicI64::new(0),
            num_peers: AtomicI64::new(0),
            currently_downloading: AtomicI64::new(0),
            failed: AtomicI64::new(0),
            searching: AtomicI64::new(0),
            not_found: AtomicI64::new(0),
            unchoked_peers: AtomicI64::new(0),
            seeders: AtomicI64::new(0),
            bitfield_received: AtomicI64::new(0),
            bitfield_mismatched: AtomicI64::new(0),
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}
