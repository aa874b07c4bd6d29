use sha1::{Digest, Sha1};
use crate::{metainfo::MetaInfo, ID};

// Everything the download needs from the metainfo. Cloned into each task.
#[derive(Debug, Clone)]
pub struct TorrentInfo {

    pub info_hash: ID,

    // Suggested output file name.
    pub name: String,

    pub total_len: usize,

    pub piece_len: usize,

    pub last_piece_len: usize,

    pub num_pieces: u32,

    pub piece_hashes: Vec<ID>,

}

impl TorrentInfo {

    pub fn new(metainfo: &MetaInfo) -> Self {

        let total_len = metainfo.total_len() as usize;
        let num_pieces = metainfo.num_pieces();
        let piece_len = metainfo.piece_len();
        let last_piece_len = match num_pieces {
            // Empty file.
            0 => 0,
            n => total_len - piece_len * (n as usize - 1),
        };

        Self {
            info_hash: metainfo.info_hash(),
            name: metainfo.name().to_string(),
            total_len,
            piece_len,
            last_piece_len,
            num_pieces,
            piece_hashes: metainfo.piece_hashes(),
        }
    }

    // Returns length of piece given its index.
    pub fn piece_len(&self, idx: usize) -> usize {
        if idx + 1 == self.num_pieces as usize {
            self.last_piece_len
        } else {
            self.piece_len
        }
    }

    pub fn piece(&self, idx: usize) -> Option<Piece> {
        let hash = *self.piece_hashes.get(idx)?;
        let len = self.piece_len(idx);
        let begin = idx * self.piece_len;
        Some(Piece {
            idx,
            len,
            hash,
            begin,
            end: begin + len,
        })
    }
}

// A piece and where it lands in the output file.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Piece {

    pub idx: usize,

    pub len: usize,

    // Expected sha1 of the piece data.
    pub hash: ID,

    // Absolute byte offsets in the file, end exclusive.
    pub begin: usize,

    pub end: usize,

}

impl Piece {
    // Hash the piece data and compare with hash given in metainfo.
    pub fn verify_hash(&self, data: &[u8]) -> bool {
        Sha1::digest(data).as_slice() == self.hash
    }
}

impl std::fmt::Debug for Piece {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Piece")
            .field("idx", &self.idx)
            .field("len", &self.len)
            .field("hash", &hex::encode(self.hash))
            .field("range", &(self.begin..self.end))
            .finish()
    }
}
