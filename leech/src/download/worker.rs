use std::{collections::HashMap, sync::Arc};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use crate::{info::Piece, p2p::PeerError, picker::{Assignment, PieceFailure}, ID};
use super::SessionSlot;

// A verified piece and where it goes in the output.
#[derive(Debug)]
pub(super) struct PieceData {
    pub idx: usize,
    pub begin: usize,
    pub end: usize,
    pub data: Vec<u8>,
}

// Sent to the producer once an assignment is finished with.
#[derive(Debug)]
pub(super) enum Feedback {
    Done,
    Failed {
        assignment: Assignment,
        failure: PieceFailure,
    },
}

#[derive(thiserror::Error, Debug)]
enum Failure {

    #[error("no open session for peer")]
    NoSession,

    #[error("piece hash mismatch")]
    HashMismatch,

    #[error(transparent)]
    Peer(#[from] PeerError),
}

impl Failure {
    fn kind(&self) -> PieceFailure {
        match self {
            Failure::NoSession => PieceFailure::PeerFailed,
            Failure::HashMismatch => PieceFailure::Corrupt,
            Failure::Peer(PeerError::MissingPiece(_)) => PieceFailure::Missing,
            Failure::Peer(PeerError::Choked) => PieceFailure::Choked,
            Failure::Peer(_) => PieceFailure::PeerFailed,
        }
    }
}

pub(super) struct Worker {
    pub id: usize,
    pub sessions: Arc<HashMap<ID, SessionSlot>>,
    pub work_rx: Arc<Mutex<mpsc::Receiver<Assignment>>>,
    pub results_tx: mpsc::Sender<PieceData>,
    pub feedback_tx: mpsc::UnboundedSender<Feedback>,
    pub cancel: CancellationToken,
}

impl Worker {

    #[tracing::instrument(name = "worker", skip(self), fields(id = self.id))]
    pub async fn run(self) {
        loop {
            let assignment = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                assignment = async { self.work_rx.lock().await.recv().await } => match assignment {
                    Some(assignment) => assignment,
                    None => break,
                },
            };

            let piece = assignment.piece;
            let Some(downloaded) = self.download(&assignment).await else { break };
            let feedback = match downloaded {
                Ok(data) => {
                    let result = PieceData { idx: piece.idx, begin: piece.begin, end: piece.end, data };
                    if self.results_tx.send(result).await.is_err() {
                        break;
                    }
                    Feedback::Done
                },
                Err(e) => {
                    tracing::warn!("piece {} from {} failed: {}", piece.idx, hex::encode(assignment.peer), e);
                    Feedback::Failed { assignment, failure: e.kind() }
                },
            };

            // Producer has gone, nothing more will be assigned.
            if self.feedback_tx.send(feedback).is_err() {
                break;
            }
        }
        tracing::trace!("worker exiting");
    }

    // None if cancelled first.
    async fn download(&self, assignment: &Assignment) -> Option<Result<Vec<u8>, Failure>> {

        let Some(slot) = self.sessions.get(&assignment.peer) else {
            return Some(Err(Failure::NoSession));
        };
        let mut guard = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            guard = slot.lock() => guard,
        };
        let Some(session) = guard.as_mut() else {
            return Some(Err(Failure::NoSession));
        };

        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = fetch(session, &assignment.piece) => Some(result),
        };
        let result = match fetched {
            Some(result) => result,
            None => {
                // Left mid request, the session can't be reused.
                if let Some(session) = guard.take() {
                    session.close().await;
                }
                return None;
            },
        };

        if let Err(e) = &result {
            if e.kind().evicts_peer() {
                if let Some(session) = guard.take() {
                    session.close().await;
                }
            }
        }
        Some(result)
    }
}

async fn fetch(session: &mut crate::p2p::PeerSession, piece: &Piece) -> Result<Vec<u8>, Failure> {
    // Rechoked since the last piece, wait to be let back in.
    if !session.state().can_request() {
        session.negotiate().await?;
    }
    let data = session.download_piece(piece.idx, piece.len).await?;
    if !piece.verify_hash(&data) {
        return Err(Failure::HashMismatch);
    }
    Ok(data)
}
