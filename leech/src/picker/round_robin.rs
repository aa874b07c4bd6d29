use crate::{info::{Piece, TorrentInfo}, ID};
use super::{Assignment, ManagerError, PieceFailure, PieceManager, PieceQueue};

// Pieces in index order, each handed to the next peer in turn. Peers known
// to lack a piece are passed over for it.
#[derive(Debug)]
pub struct RoundRobinPicker {
    queue: PieceQueue,
    peers: Vec<ID>,
    // Index into `peers` of the next peer in turn.
    cursor: usize,
}

impl RoundRobinPicker {

    pub fn new(torrent: &TorrentInfo, peers: Vec<ID>, max_attempts: u32) -> Result<Self, ManagerError> {
        if peers.is_empty() {
            return Err(ManagerError::NoPeers);
        }
        Ok(Self {
            queue: PieceQueue::new(torrent, max_attempts),
            peers,
            cursor: 0,
        })
    }
}

impl PieceManager for RoundRobinPicker {

    fn next_piece(&mut self) -> Result<Option<Assignment>, ManagerError> {
        if self.peers.is_empty() {
            return Err(ManagerError::NoPeers);
        }
        // The rotation only moves when a piece is handed out.
        let Some(piece) = self.queue.pop() else { return Ok(None) };

        let num_peers = self.peers.len();
        for step in 0..num_peers {
            let pos = (self.cursor + step) % num_peers;
            let peer = self.peers[pos];
            if !self.queue.lacks(piece.idx, &peer) {
                self.cursor = (pos + 1) % num_peers;
                return Ok(Some(Assignment { piece, peer }));
            }
        }
        Err(ManagerError::Unavailable { idx: piece.idx })
    }

    fn return_piece(&mut self, piece: Piece, peer: ID, failure: PieceFailure) -> Result<(), ManagerError> {
        if failure.evicts_peer() {
            if let Some(pos) = self.peers.iter().position(|id| *id == peer) {
                self.peers.remove(pos);
                // Keep the rotation pointing at the peer after the evicted one.
                if pos < self.cursor {
                    self.cursor -= 1;
                }
                if self.cursor >= self.peers.len() {
                    self.cursor = 0;
                }
                tracing::info!("peer evicted, {} remaining", self.peers.len());
            }
            if self.peers.is_empty() {
                return Err(ManagerError::NoPeers);
            }
        }
        self.queue.push_back(piece, peer, failure)
    }
}
