use std::{collections::HashMap, sync::Arc};
use tokio::{sync::{mpsc, Mutex}, task::JoinSet};
use tokio_util::sync::CancellationToken;
use crate::{
    config::Config,
    info::TorrentInfo,
    p2p::{PeerError, PeerSession},
    peer::Peer,
    picker::{Assignment, ManagerError, PieceManager},
    Bitfield,
    ID,
};

mod worker;

use worker::{Feedback, PieceData, Worker};

#[cfg(test)]
mod tests;

type Result<T> = std::result::Result<T, DownloadError>;

// At most one worker drives a session at a time. Emptied once the session
// is closed.
pub(crate) type SessionSlot = Arc<Mutex<Option<PeerSession>>>;

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {

    #[error("no peer session could be established")]
    NoPeers,

    #[error("piece manager: {0}")]
    Manager(#[from] ManagerError),

    #[error("download incomplete, {missing} pieces missing")]
    Incomplete {
        missing: usize,
    },

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("download cancelled")]
    Cancelled,

    #[error("a download task panicked")]
    WorkerPanic,
}

// Owns the peer sessions of one torrent and runs downloads over them.
pub struct Downloader {

    torrent: TorrentInfo,

    config: Config,

    // Fixed once connected, keyed by remote peer id.
    sessions: Arc<HashMap<ID, SessionSlot>>,

    // Peer ids in the order they connected.
    order: Vec<ID>,

}

impl Downloader {

    // Opens and negotiates sessions with up to `max_peers` peers at once.
    // Peers that fail are skipped.
    #[tracing::instrument(skip_all, fields(torrent = %torrent.name))]
    pub async fn connect(torrent: &TorrentInfo, peers: Vec<Peer>, config: &Config) -> Result<Downloader> {

        let num_pieces = torrent.num_pieces as usize;
        let attempts = peers
            .into_iter()
            .take(config.max_peers)
            .map(|peer| establish(peer, num_pieces, config));
        let results = futures::future::join_all(attempts).await;

        let mut sessions = HashMap::new();
        let mut order = Vec::new();
        for result in results {
            let session = match result {
                Ok(session) => session,
                Err(e) => {
                    tracing::warn!("skipping peer: {}", e);
                    continue;
                },
            };
            let Some(id) = session.remote_id() else { continue };
            if sessions.contains_key(&id) {
                tracing::warn!("duplicate peer id from {}", session.peer());
                session.close().await;
                continue;
            }
            order.push(id);
            sessions.insert(id, Arc::new(Mutex::new(Some(session))));
        }

        if sessions.is_empty() {
            return Err(DownloadError::NoPeers);
        }
        tracing::info!("connected to {} peers", sessions.len());

        Ok(Downloader {
            torrent: torrent.clone(),
            config: config.clone(),
            sessions: Arc::new(sessions),
            order,
        })
    }

    // Connected peers, for building a piece manager.
    pub fn peers(&self) -> Vec<ID> {
        self.order.clone()
    }

    pub fn torrent(&self) -> &TorrentInfo {
        &self.torrent
    }

    // Runs the producer, the workers and the reassembler until every piece
    // is written, returning the whole file.
    #[tracing::instrument(skip_all, fields(torrent = %self.torrent.name))]
    pub async fn download<M>(&self, manager: M, cancel: CancellationToken) -> Result<Vec<u8>>
    where
        M: PieceManager + 'static,
    {
        let concurrency = self.config.concurrency;
        if concurrency == 0 {
            return Err(DownloadError::ZeroConcurrency);
        }
        let (work_tx, work_rx) = mpsc::channel::<Assignment>(concurrency);
        let (results_tx, results_rx) = mpsc::channel::<PieceData>(concurrency);
        let (feedback_tx, feedback_rx) = mpsc::unbounded_channel::<Feedback>();
        let work_rx = Arc::new(Mutex::new(work_rx));

        // Stops everything on cancellation or when a worker dies.
        let stop = cancel.child_token();

        let reassembler = tokio::spawn(reassemble(
            results_rx,
            self.torrent.total_len,
            self.torrent.num_pieces as usize,
        ));

        let mut workers = JoinSet::new();
        for id in 0..concurrency {
            let worker = Worker {
                id,
                sessions: self.sessions.clone(),
                work_rx: work_rx.clone(),
                results_tx: results_tx.clone(),
                feedback_tx: feedback_tx.clone(),
                cancel: stop.clone(),
            };
            workers.spawn(worker.run());
        }
        // Workers hold the only senders, so results close once they all exit.
        drop(results_tx);
        drop(feedback_tx);
        drop(work_rx);

        let producer = tokio::spawn(produce(manager, work_tx, feedback_rx, stop.clone()));
        tracing::info!("downloading {} pieces with {} workers", self.torrent.num_pieces, concurrency);

        let mut panicked = false;
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("worker failed: {}", e);
                panicked = true;
                stop.cancel();
            }
        }

        let produced = producer.await.map_err(|_| DownloadError::WorkerPanic)?;
        let (buf, written) = reassembler.await.map_err(|_| DownloadError::WorkerPanic)?;

        if panicked {
            return Err(DownloadError::WorkerPanic);
        }
        if let Err(e) = produced {
            return Err(if cancel.is_cancelled() { DownloadError::Cancelled } else { e });
        }

        let missing = written.count_zeros();
        if missing > 0 {
            tracing::error!("finished with {} pieces missing", missing);
            return Err(DownloadError::Incomplete { missing });
        }

        tracing::info!("download complete, {} bytes", buf.len());
        Ok(buf)
    }

    // Closes every session.
    pub async fn shutdown(self) {
        for slot in self.sessions.values() {
            if let Some(session) = slot.lock().await.take() {
                session.close().await;
            }
        }
    }
}

async fn establish(peer: Peer, num_pieces: usize, config: &Config) -> std::result::Result<PeerSession, PeerError> {
    let mut session = PeerSession::open(peer, num_pieces, config).await?;
    match session.negotiate().await {
        Ok(()) => Ok(session),
        Err(e) => {
            session.close().await;
            Err(e)
        },
    }
}

// Feeds assignments to the workers. Failed pieces come back on the feedback
// channel and are returned to the manager, so work only closes once the
// manager is exhausted and nothing is in flight.
async fn produce<M: PieceManager>(
    mut manager: M,
    work_tx: mpsc::Sender<Assignment>,
    mut feedback_rx: mpsc::UnboundedReceiver<Feedback>,
    cancel: CancellationToken,
) -> Result<()> {

    let mut in_flight = 0usize;
    let mut exhausted = false;

    loop {
        if exhausted && in_flight == 0 {
            tracing::debug!("manager exhausted, closing work channel");
            return Ok(());
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::info!("download cancelled");
                return Err(DownloadError::Cancelled);
            },

            feedback = feedback_rx.recv(), if in_flight > 0 => {
                let Some(feedback) = feedback else {
                    return Err(DownloadError::WorkerPanic);
                };
                in_flight -= 1;
                if let Feedback::Failed { assignment, failure } = feedback {
                    manager.return_piece(assignment.piece, assignment.peer, failure)?;
                    exhausted = false;
                }
            },

            // Only ask the manager once there is room for the assignment.
            permit = work_tx.reserve(), if !exhausted => {
                let Ok(permit) = permit else {
                    return Err(DownloadError::WorkerPanic);
                };
                match manager.next_piece()? {
                    Some(assignment) => {
                        tracing::trace!("assigning {:?}", assignment.piece);
                        in_flight += 1;
                        permit.send(assignment);
                    },
                    None => exhausted = true,
                }
            },
        }
    }
}

// Copies each verified piece into place and records it as written.
async fn reassemble(
    mut results_rx: mpsc::Receiver<PieceData>,
    total_len: usize,
    num_pieces: usize,
) -> (Vec<u8>, Bitfield) {

    let mut buf = vec![0; total_len];
    let mut written = Bitfield::repeat(false, num_pieces);

    while let Some(result) = results_rx.recv().await {
        buf[result.begin..result.end].copy_from_slice(&result.data);
        written.set(result.idx, true);
        tracing::debug!("piece {} written, {}/{}", result.idx, written.count_ones(), num_pieces);
    }

    (buf, written)
}
