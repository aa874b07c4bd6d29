use std::net::SocketAddrV4;
use crate::{config::Config, metainfo::MetaInfo, peer::Peer, ID};

mod http;
pub use http::HttpTracker;

type Result<T> = std::result::Result<T, TrackerError>;

#[derive(thiserror::Error, Debug)]
pub enum TrackerError {

    #[error("request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("tracker responded with status {0}")]
    Status(reqwest::StatusCode),

    #[error("error deserializing response: {0}")]
    BencodeError(#[from] bencode::Error),

    #[error("response error: {0}")]
    ResponseError(String),

    #[error("response has no peers")]
    MissingPeers,

    #[error("only compact peer lists are supported, got a {0}")]
    NonCompactPeers(&'static str),

    #[error("compact peer list length {0} is not a multiple of 6")]
    InvalidPeerList(usize),

    #[error("no http trackers in metainfo")]
    NoTrackers,

}

#[derive(Debug, Copy, Clone, Default)]
pub struct AnnounceParams {

    // Hash of info dict.
    pub info_hash:  ID,

    // Urlencoded 20-byte string used as a unique ID for the client.
    pub client_id:  ID,

    // Port number.
    pub port:       u16,

    // The total amount uploaded in base ten ASCII.
    pub uploaded:   u64,

    // The total amount downloaded in base ten ASCII.
    pub downloaded: u64,

    // The number of bytes this client still has to download in base ten ASCII.
    pub left:       u64,

}

// Asks each tracker in turn, the first that answers supplies the peers.
#[tracing::instrument(skip_all, fields(info_hash = %metainfo.info_hash_hex()))]
pub async fn get_peers(metainfo: &MetaInfo, config: &Config) -> Result<Vec<Peer>> {

    let params = AnnounceParams {
        info_hash: metainfo.info_hash(),
        client_id: config.client_id,
        port: config.listen_port,
        uploaded: 0,
        downloaded: 0,
        left: metainfo.total_len(),
    };

    let mut last_err = TrackerError::NoTrackers;
    for url in metainfo.tracker_urls() {
        let mut tracker = HttpTracker::new(url.clone(), config.tracker_timeout);
        match tracker.announce(params).await {
            Ok(addresses) => {
                tracing::info!("tracker {} returned {} peers", url, addresses.len());
                return Ok(addresses
                    .into_iter()
                    .map(|address| Peer::new(address, params.info_hash, params.client_id))
                    .collect());
            },
            Err(e) => {
                tracing::warn!("announce to {} failed: {}", url, e);
                last_err = e;
            },
        }
    }

    Err(last_err)
}

// The first 4 bytes of each entry are the IP address and the last 2 bytes are the
// port number, all in network (big-endian) byte order.
pub fn decode_compact_peers(peers: Option<&bencode::Value>) -> Result<Vec<SocketAddrV4>> {
    let peers = peers.ok_or(TrackerError::MissingPeers)?;
    let raw = peers.as_bytes().ok_or(TrackerError::NonCompactPeers(peers.kind()))?;

    if raw.len() % 6 != 0 {
        return Err(TrackerError::InvalidPeerList(raw.len()));
    }
    Ok(raw
        .chunks_exact(6)
        .map(|c| Peer::from_compact([c[0], c[1], c[2], c[3], c[4], c[5]]))
        .collect())
}
