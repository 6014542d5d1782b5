//! Piece selection: a linear scan over the shared claim for the first index
//! the peer has that nobody has claimed yet, mirroring the straightforward
//! `PickPiece` scan of the original downloader.
use super::{Downloader, WorkClaim};
use crate::bitfield::Bitfield;
use std::sync::Arc;
use std::sync::atomic::Ordering;

pub(crate) fn pick_piece_locked(claim: &mut WorkClaim, peer_bitfield: &Bitfield, piece_count: usize) -> Option<usize> {
    for index in 0..piece_count {
        if claim.have.has(index).unwrap_or(false) {
            continue;
        }
        if claim.requested.has(index).unwrap_or(false) {
            continue;
        }
        if peer_bitfield.has(index).unwrap_or(false) {
            claim.requested.set(index).ok();
            return Some(index);
        }
    }
    None
}

/// Claims the next piece this peer advertises that is neither already held
/// nor already in flight with another peer. On success, bumps
/// `currently_downloading` under the same lock acquisition that marks the
/// index requested, so the counter and the bit never drift apart.
pub(crate) async fn pick_piece(downloader: &Arc<Downloader>, peer_bitfield: &Bitfield) -> Option<usize> {
    let piece_count = downloader.torrent.piece_count();
    let mut claim = downloader.claim.lock().await;
    let picked = pick_piece_locked(&mut claim, peer_bitfield, piece_count);
    drop(claim);
    if picked.is_some() {
        downloader.stats.currently_downloading.fetch_add(1, Ordering::Relaxed);
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_unclaimed_piece_peer_has() {
        let mut claim = WorkClaim {
            have: Bitfield::new(4),
            requested: Bitfield::new(4),
            done: 0,
        };
        claim.have.set(0).unwrap();
        let mut peer_bf = Bitfield::new(4);
        peer_bf.set(1).unwrap();
        peer_bf.set(2).unwrap();

        let picked = pick_piece_locked(&mut claim, &peer_bf, 4);
        assert_eq!(picked, Some(1));
        assert!(claim.requested.has(1).unwrap());
    }

    #[test]
    fn skips_already_requested_piece() {
        let mut claim = WorkClaim {
            have: Bitfield::new(4),
            requested: Bitfield::new(4),
            done: 0,
        };
        claim.requested.set(0).unwrap();
        let mut peer_bf = Bitfield::new(4);
        peer_bf.set(0).unwrap();
        peer_bf.set(1).unwrap();

        let picked = pick_piece_locked(&mut claim, &peer_bf, 4);
        assert_eq!(picked, Some(1));
    }

    #[test]
    fn returns_none_when_peer_has_nothing_unclaimed() {
        let mut claim = WorkClaim {
            have: Bitfield::new(2),
            requested: Bitfield::new(2),
            done: 0,
        };
        claim.have.set(0).unwrap();
        claim.requested.set(1).unwrap();
        let mut peer_bf = Bitfield::new(2);
        peer_bf.set(0).unwrap();
        peer_bf.set(1).unwrap();

        assert_eq!(pick_piece_locked(&mut claim, &peer_bf, 2), None);
    }
}
