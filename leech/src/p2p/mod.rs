use crate::block::{BlockData, BlockInfo};

mod session;
mod message;
mod handshake;
pub mod state;

#[cfg(test)]
pub(crate) mod mock;

pub use session::PeerSession;
pub use message::{Message, MessageCodec, MessageId};
pub use handshake::{Handshake, HandshakeCodec, PROTOCOL};

type Result<T, E = PeerError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum PeerError {

    #[error("failed to connect: {0}")]
    Dial(std::io::Error),

    #[error("timed out whilst {0}")]
    Timeout(&'static str),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    Closed,

    #[error("handshake provided incorrect protocol")]
    IncorrectProtocol,

    #[error("handshake provided incorrect info-hash")]
    IncorrectInfoHash,

    #[error("no handshake recieved")]
    NoHandshake,

    #[error("invalid message ID: {0}")]
    InvalidMessageId(u8),

    #[error("invalid message payload: {0}")]
    InvalidMessage(String),

    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("peer is choking us")]
    Choked,

    #[error("peer does not have piece {0}")]
    MissingPiece(usize),

    #[error("requested {expected:?}, got block at piece {} offset {} length {}", .got.piece_idx, .got.offset, .got.data.len())]
    BlockMismatch {
        expected: BlockInfo,
        got: BlockData,
    },
}

impl PeerError {
    // Whether the session can no longer be trusted to frame or answer correctly.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PeerError::Choked | PeerError::MissingPiece(_))
    }
}
