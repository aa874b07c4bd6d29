use std::time::Duration;
use tokio_util::sync::CancellationToken;
use crate::{
    config::Config,
    info::{Piece, TorrentInfo},
    metainfo::{fixtures::torrent_for, MetaInfo},
    p2p::mock::{test_data, Seeder},
    peer::Peer,
    picker::{Assignment, ManagerError, OrderedPicker, PieceFailure, PieceManager, RoundRobinPicker},
    ID,
};
use super::*;

const CLIENT_ID: ID = *b"-LC0100-testtesttest";

fn test_config(concurrency: usize) -> Config {
    Config {
        client_id: CLIENT_ID,
        concurrency,
        connect_timeout: Duration::from_secs(2),
        unchoke_timeout: Duration::from_millis(300),
        block_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

fn torrent(data: &[u8], piece_len: usize) -> TorrentInfo {
    let raw = torrent_for("http://tracker.example/announce", "test.bin", data, piece_len);
    TorrentInfo::new(&MetaInfo::from_bytes(&raw).unwrap())
}

fn seeder(torrent: &TorrentInfo, id: u8, data: &[u8]) -> Seeder {
    Seeder::new(torrent.info_hash, [id; 20], data.to_vec(), torrent.piece_len)
}

async fn peer(torrent: &TorrentInfo, seeder: Seeder) -> Peer {
    Peer::new(seeder.spawn().await, torrent.info_hash, CLIENT_ID)
}

#[tokio::test]
async fn test_download_three_pieces_from_one_peer() {
    let data = test_data(3 * 1000 - 300);
    let torrent = torrent(&data, 1000);
    assert_eq!(torrent.num_pieces, 3);
    let peers = vec![peer(&torrent, seeder(&torrent, 1, &data)).await];

    let config = test_config(2);
    let downloader = Downloader::connect(&torrent, peers, &config).await.unwrap();
    assert_eq!(downloader.peers(), vec![[1; 20]]);

    let manager = OrderedPicker::new(&torrent, downloader.peers()[0], config.max_piece_attempts);
    let buf = downloader.download(manager, CancellationToken::new()).await.unwrap();
    assert_eq!(buf, data);

    downloader.shutdown().await;
}

#[tokio::test]
async fn test_download_round_robin_multi_block_pieces() {
    // Pieces of two and a half blocks, spread over three peers.
    let piece_len = 2 * crate::BLOCK_SIZE + crate::BLOCK_SIZE / 2;
    let data = test_data(7 * piece_len + 123);
    let torrent = torrent(&data, piece_len);

    let mut peers = vec![];
    for id in 1..=3 {
        peers.push(peer(&torrent, seeder(&torrent, id, &data)).await);
    }

    let config = test_config(4);
    let downloader = Downloader::connect(&torrent, peers, &config).await.unwrap();
    assert_eq!(downloader.peers().len(), 3);

    let manager = RoundRobinPicker::new(&torrent, downloader.peers(), config.max_piece_attempts).unwrap();
    let buf = downloader.download(manager, CancellationToken::new()).await.unwrap();
    assert_eq!(buf.len(), torrent.total_len);
    assert!(buf == data);
}

#[tokio::test]
async fn test_corrupt_piece_is_retried() {
    let data = test_data(4 * 512);
    let torrent = torrent(&data, 512);
    let peers = vec![peer(&torrent, seeder(&torrent, 1, &data).corrupt_once(2)).await];

    let config = test_config(2);
    let downloader = Downloader::connect(&torrent, peers, &config).await.unwrap();
    let manager = OrderedPicker::new(&torrent, [1; 20], config.max_piece_attempts);
    let buf = downloader.download(manager, CancellationToken::new()).await.unwrap();
    assert_eq!(buf, data);
}

#[tokio::test]
async fn test_corrupt_piece_exhausts_retries() {
    let data = test_data(4 * 512);
    let torrent = torrent(&data, 512);
    let peers = vec![peer(&torrent, seeder(&torrent, 1, &data).corrupt_once(1)).await];

    let downloader = Downloader::connect(&torrent, peers, &test_config(1)).await.unwrap();
    let manager = OrderedPicker::new(&torrent, [1; 20], 1);
    let result = downloader.download(manager, CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(DownloadError::Manager(ManagerError::RetriesExhausted { idx: 1, .. })),
    ));
}

#[tokio::test]
async fn test_misbehaving_peer_is_evicted() {
    let data = test_data(6 * 300);
    let torrent = torrent(&data, 300);

    let mut bad = seeder(&torrent, 1, &data);
    bad.misplace_blocks = true;
    let peers = vec![
        peer(&torrent, bad).await,
        peer(&torrent, seeder(&torrent, 2, &data)).await,
    ];

    let config = test_config(2);
    let downloader = Downloader::connect(&torrent, peers, &config).await.unwrap();
    let manager = RoundRobinPicker::new(&torrent, downloader.peers(), config.max_piece_attempts).unwrap();
    let buf = downloader.download(manager, CancellationToken::new()).await.unwrap();
    assert_eq!(buf, data);

    // The bad peer's session was closed.
    assert!(downloader.sessions[&[1; 20]].lock().await.is_none());
    assert!(downloader.sessions[&[2; 20]].lock().await.is_some());
}

#[tokio::test]
async fn test_only_peer_evicted() {
    let data = test_data(2 * 300);
    let torrent = torrent(&data, 300);
    let mut bad = seeder(&torrent, 1, &data);
    bad.misplace_blocks = true;
    let peers = vec![peer(&torrent, bad).await];

    let downloader = Downloader::connect(&torrent, peers, &test_config(1)).await.unwrap();
    let manager = OrderedPicker::new(&torrent, [1; 20], 5);
    let result = downloader.download(manager, CancellationToken::new()).await;
    assert!(matches!(result, Err(DownloadError::Manager(ManagerError::NoPeers))));
}

#[tokio::test]
async fn test_connect_skips_unresponsive_peers() {
    let data = test_data(1000);
    let torrent = torrent(&data, 500);

    let mut silent = seeder(&torrent, 1, &data);
    silent.unchoke = false;
    let mut wrong_torrent = seeder(&torrent, 2, &data);
    wrong_torrent.wrong_info_hash = Some([0xaa; 20]);
    let peers = vec![
        peer(&torrent, silent).await,
        peer(&torrent, wrong_torrent).await,
        peer(&torrent, seeder(&torrent, 3, &data)).await,
    ];

    let downloader = Downloader::connect(&torrent, peers, &test_config(1)).await.unwrap();
    assert_eq!(downloader.peers(), vec![[3; 20]]);
}

#[tokio::test]
async fn test_connect_no_peers() {
    let data = test_data(1000);
    let torrent = torrent(&data, 500);
    let mut silent = seeder(&torrent, 1, &data);
    silent.unchoke = false;
    let peers = vec![peer(&torrent, silent).await];

    let result = Downloader::connect(&torrent, peers, &test_config(1)).await;
    assert!(matches!(result, Err(DownloadError::NoPeers)));

    let result = Downloader::connect(&torrent, vec![], &test_config(1)).await;
    assert!(matches!(result, Err(DownloadError::NoPeers)));
}

#[tokio::test]
async fn test_cancelled_download() {
    let data = test_data(4 * 512);
    let torrent = torrent(&data, 512);
    let peers = vec![peer(&torrent, seeder(&torrent, 1, &data)).await];

    let downloader = Downloader::connect(&torrent, peers, &test_config(2)).await.unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let manager = OrderedPicker::new(&torrent, [1; 20], 5);
    let result = downloader.download(manager, cancel).await;
    assert!(matches!(result, Err(DownloadError::Cancelled)));
}

#[tokio::test]
async fn test_cancel_during_download() {
    // Eight pieces at 300ms each over two workers take over a second.
    let data = test_data(8 * 512);
    let torrent = torrent(&data, 512);
    let mut slow = seeder(&torrent, 1, &data);
    slow.delay = Some(Duration::from_millis(300));
    let peers = vec![peer(&torrent, slow).await];

    let downloader = Downloader::connect(&torrent, peers, &test_config(2)).await.unwrap();
    let cancel = CancellationToken::new();
    let manager = OrderedPicker::new(&torrent, [1; 20], 5);

    let canceller = {
        let cancel = cancel.clone();
        async move {
            // After the first pieces have been written.
            tokio::time::sleep(Duration::from_millis(400)).await;
            cancel.cancel();
        }
    };
    let download = tokio::time::timeout(Duration::from_secs(1), downloader.download(manager, cancel));
    let (result, ()) = tokio::join!(download, canceller);
    let result = result.expect("download did not stop after cancel");
    assert!(matches!(result, Err(DownloadError::Cancelled)));
}

#[tokio::test]
async fn test_round_robin_retries_piece_on_other_peer() {
    // The first peer doesn't have the only piece.
    let data = test_data(700);
    let torrent = torrent(&data, 1024);
    assert_eq!(torrent.num_pieces, 1);

    let mut lacking = seeder(&torrent, 1, &data);
    lacking.missing = vec![0];
    let peers = vec![
        peer(&torrent, lacking).await,
        peer(&torrent, seeder(&torrent, 2, &data)).await,
    ];

    let config = test_config(2);
    let downloader = Downloader::connect(&torrent, peers, &config).await.unwrap();
    assert_eq!(downloader.peers(), vec![[1; 20], [2; 20]]);
    let manager = RoundRobinPicker::new(&torrent, downloader.peers(), config.max_piece_attempts).unwrap();
    let buf = downloader.download(manager, CancellationToken::new()).await.unwrap();
    assert_eq!(buf, data);

    // Lacking a piece is not a reason to drop the peer.
    assert!(downloader.sessions[&[1; 20]].lock().await.is_some());
}

#[tokio::test]
async fn test_missing_piece_does_not_use_up_attempts() {
    // Only the last of six peers has the piece, more than the attempt limit.
    let data = test_data(700);
    let torrent = torrent(&data, 1024);
    let mut peers = vec![];
    for id in 1..=6 {
        let mut mock = seeder(&torrent, id, &data);
        if id < 6 {
            mock.missing = vec![0];
        }
        peers.push(peer(&torrent, mock).await);
    }

    let config = test_config(1);
    let downloader = Downloader::connect(&torrent, peers, &config).await.unwrap();
    let mut order = downloader.peers();
    order.sort();
    assert_eq!(order.len(), 6);
    // Put the complete peer last whatever order they connected in.
    let manager = RoundRobinPicker::new(&torrent, order, 5).unwrap();
    let buf = downloader.download(manager, CancellationToken::new()).await.unwrap();
    assert_eq!(buf, data);
}

#[tokio::test]
async fn test_piece_no_peer_has() {
    let data = test_data(700);
    let torrent = torrent(&data, 1024);
    let mut peers = vec![];
    for id in 1..=2 {
        let mut mock = seeder(&torrent, id, &data);
        mock.missing = vec![0];
        peers.push(peer(&torrent, mock).await);
    }

    let config = test_config(2);
    let downloader = Downloader::connect(&torrent, peers, &config).await.unwrap();
    let manager = RoundRobinPicker::new(&torrent, downloader.peers(), config.max_piece_attempts).unwrap();
    let result = downloader.download(manager, CancellationToken::new()).await;
    assert!(matches!(result, Err(DownloadError::Manager(ManagerError::Unavailable { idx: 0 }))));
}

#[tokio::test]
async fn test_empty_file() {
    let torrent = torrent(&[], 512);
    assert_eq!(torrent.num_pieces, 0);
    let peers = vec![peer(&torrent, seeder(&torrent, 1, &[])).await];

    let config = test_config(2);
    let downloader = Downloader::connect(&torrent, peers, &config).await.unwrap();
    let manager = RoundRobinPicker::new(&torrent, downloader.peers(), config.max_piece_attempts).unwrap();
    let buf = downloader.download(manager, CancellationToken::new()).await.unwrap();
    assert!(buf.is_empty());
}

#[tokio::test]
async fn test_zero_concurrency_rejected() {
    let data = test_data(1000);
    let torrent = torrent(&data, 500);
    let peers = vec![peer(&torrent, seeder(&torrent, 1, &data)).await];

    let downloader = Downloader::connect(&torrent, peers, &test_config(0)).await.unwrap();
    let manager = OrderedPicker::new(&torrent, [1; 20], 5);
    let result = downloader.download(manager, CancellationToken::new()).await;
    assert!(matches!(result, Err(DownloadError::ZeroConcurrency)));
}

// Hands out only the first piece.
struct FirstPieceOnly {
    piece: Option<Piece>,
    peer: ID,
}

impl PieceManager for FirstPieceOnly {

    fn next_piece(&mut self) -> std::result::Result<Option<Assignment>, ManagerError> {
        Ok(self.piece.take().map(|piece| Assignment { piece, peer: self.peer }))
    }

    fn return_piece(&mut self, piece: Piece, _peer: ID, _failure: PieceFailure) -> std::result::Result<(), ManagerError> {
        self.piece = Some(piece);
        Ok(())
    }
}

#[tokio::test]
async fn test_incomplete_download() {
    let data = test_data(3 * 512);
    let torrent = torrent(&data, 512);
    let peers = vec![peer(&torrent, seeder(&torrent, 1, &data)).await];

    let downloader = Downloader::connect(&torrent, peers, &test_config(2)).await.unwrap();
    let manager = FirstPieceOnly { piece: torrent.piece(0), peer: [1; 20] };
    let result = downloader.download(manager, CancellationToken::new()).await;
    assert!(matches!(result, Err(DownloadError::Incomplete { missing: 2 })));
}
