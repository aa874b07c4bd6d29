mod config;
mod metainfo;
mod info;
mod tracker;
mod peer;
mod p2p;
mod block;
mod picker;
mod download;
mod de;

// Most commonly used block size - 16KB.
const BLOCK_SIZE: usize = 0x4000;

type Bitfield = bitvec::vec::BitVec<u8, bitvec::order::Msb0>;

// 20 byte SHA1 hash or peer id.
pub type ID = [u8; 20];

// Re-exports
pub use config::{generate_client_id, Config};
pub use metainfo::{format_size, MetaInfo, MetaInfoError};
pub use info::{Piece, TorrentInfo};
pub use peer::Peer;
pub use block::{BlockData, BlockInfo};
pub use tracker::{get_peers, AnnounceParams, HttpTracker, TrackerError};
pub use p2p::{
    state::{ConnState, SessionState},
    Handshake,
    HandshakeCodec,
    Message,
    MessageCodec,
    MessageId,
    PeerError,
    PeerSession,
};
pub use picker::{Assignment, ManagerError, OrderedPicker, PieceFailure, PieceManager, RoundRobinPicker};
pub use download::{DownloadError, Downloader};
