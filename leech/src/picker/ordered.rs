use crate::{info::{Piece, TorrentInfo}, ID};
use super::{Assignment, ManagerError, PieceFailure, PieceManager, PieceQueue};

// Every piece in index order, all from one peer. Only useful with a single
// peer, mostly for testing.
#[derive(Debug)]
pub struct OrderedPicker {
    queue: PieceQueue,
    peer: Option<ID>,
}

impl OrderedPicker {
    pub fn new(torrent: &TorrentInfo, peer: ID, max_attempts: u32) -> Self {
        Self {
            queue: PieceQueue::new(torrent, max_attempts),
            peer: Some(peer),
        }
    }
}

impl PieceManager for OrderedPicker {

    fn next_piece(&mut self) -> Result<Option<Assignment>, ManagerError> {
        let peer = self.peer.ok_or(ManagerError::NoPeers)?;
        let Some(piece) = self.queue.pop() else { return Ok(None) };
        if self.queue.lacks(piece.idx, &peer) {
            return Err(ManagerError::Unavailable { idx: piece.idx });
        }
        Ok(Some(Assignment { piece, peer }))
    }

    fn return_piece(&mut self, piece: Piece, peer: ID, failure: PieceFailure) -> Result<(), ManagerError> {
        if failure.evicts_peer() && self.peer == Some(peer) {
            tracing::warn!("only peer evicted");
            self.peer = None;
            return Err(ManagerError::NoPeers);
        }
        self.queue.push_back(piece, peer, failure)
    }
}
