use std::collections::{HashMap, HashSet, VecDeque};
use crate::{info::{Piece, TorrentInfo}, ID};

mod ordered;
mod round_robin;

pub use ordered::OrderedPicker;
pub use round_robin::RoundRobinPicker;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ManagerError {

    #[error("no peers left to assign pieces to")]
    NoPeers,

    #[error("piece {idx} failed {attempts} times")]
    RetriesExhausted {
        idx: usize,
        attempts: u32,
    },

    #[error("no remaining peer has piece {idx}")]
    Unavailable {
        idx: usize,
    },
}

// A piece and the peer whose session should download it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub piece: Piece,
    pub peer: ID,
}

// Why an assigned piece came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceFailure {

    // The peer does not have the piece. It is not offered that piece again.
    Missing,

    // The peer choked us part way through.
    Choked,

    // The piece arrived but failed its hash check.
    Corrupt,

    // The session broke, the peer gets no more work.
    PeerFailed,
}

impl PieceFailure {

    pub fn evicts_peer(&self) -> bool {
        matches!(self, PieceFailure::PeerFailed)
    }

    // Missing and choked pieces say nothing about the piece itself, so they
    // don't use up its attempts.
    fn counts_attempt(&self) -> bool {
        matches!(self, PieceFailure::Corrupt | PieceFailure::PeerFailed)
    }
}

// Decides which piece is downloaded next and from whom. Only ever driven
// from a single task.
pub trait PieceManager: Send {

    // Ok(None) once every piece has been handed out and none are waiting
    // to be retried.
    fn next_piece(&mut self) -> Result<Option<Assignment>, ManagerError>;

    // Gives back a piece that failed so it is handed out again, ahead of any
    // fresh pieces.
    fn return_piece(&mut self, piece: Piece, peer: ID, failure: PieceFailure) -> Result<(), ManagerError>;
}

// Piece ordering shared by the policies: ascending index, failed pieces first.
#[derive(Debug)]
struct PieceQueue {
    torrent: TorrentInfo,
    next_idx: usize,
    retry: VecDeque<usize>,
    attempts: Vec<u32>,
    max_attempts: u32,
    // Peers known not to have a piece.
    lacking: HashMap<usize, HashSet<ID>>,
}

impl PieceQueue {

    fn new(torrent: &TorrentInfo, max_attempts: u32) -> Self {
        Self {
            torrent: torrent.clone(),
            next_idx: 0,
            retry: VecDeque::new(),
            attempts: vec![0; torrent.num_pieces as usize],
            max_attempts: max_attempts.max(1),
            lacking: HashMap::new(),
        }
    }

    fn pop(&mut self) -> Option<Piece> {
        if let Some(idx) = self.retry.pop_front() {
            return self.torrent.piece(idx);
        }
        let piece = self.torrent.piece(self.next_idx)?;
        self.next_idx += 1;
        Some(piece)
    }

    fn lacks(&self, idx: usize, peer: &ID) -> bool {
        self.lacking.get(&idx).map_or(false, |peers| peers.contains(peer))
    }

    fn push_back(&mut self, piece: Piece, peer: ID, failure: PieceFailure) -> Result<(), ManagerError> {
        if failure == PieceFailure::Missing {
            self.lacking.entry(piece.idx).or_default().insert(peer);
        }
        if failure.counts_attempt() {
            let attempts = &mut self.attempts[piece.idx];
            *attempts += 1;
            if *attempts >= self.max_attempts {
                return Err(ManagerError::RetriesExhausted { idx: piece.idx, attempts: *attempts });
            }
        }
        tracing::debug!("piece {} requeued ({:?}), {} failed attempts", piece.idx, failure, self.attempts[piece.idx]);
        self.retry.push_back(piece.idx);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_torrent(total_len: usize, piece_len: usize) -> TorrentInfo {
    let num_pieces = (total_len + piece_len - 1) / piece_len;
    TorrentInfo {
        info_hash: [0; 20],
        name: "test".to_string(),
        total_len,
        piece_len,
        last_piece_len: total_len - piece_len * (num_pieces - 1),
        num_pieces: num_pieces as u32,
        piece_hashes: (0..num_pieces).map(|i| [i as u8; 20]).collect(),
    }
}
