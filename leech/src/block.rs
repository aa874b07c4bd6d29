use crate::BLOCK_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockData {
    // Index of piece that the block is contained in.
    pub piece_idx: usize,

    // Offset in bytes of block within piece.
    pub offset: usize,

    // Data of block.
    pub data: Vec<u8>,
}

#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub struct BlockInfo {

    pub piece_idx: usize,

    pub offset: usize,

    pub len: usize,

}

impl BlockInfo {

    // The request for block number `block_idx` of a piece.
    pub fn new(piece_idx: usize, piece_len: usize, block_idx: usize) -> Self {
        Self {
            piece_idx,
            offset: block_idx * BLOCK_SIZE,
            len: block_len(piece_len, block_idx),
        }
    }

    // Whether a received block answers this request.
    pub fn matches(&self, block: &BlockData) -> bool {
        self.piece_idx == block.piece_idx
            && self.offset == block.offset
            && self.len == block.data.len()
    }
}

pub fn block_len(piece_len: usize, block_idx: usize) -> usize {
    BLOCK_SIZE.min(piece_len - (block_idx * BLOCK_SIZE))
}

pub fn num_blocks(piece_len: usize) -> usize {
    (piece_len + (BLOCK_SIZE - 1)) / BLOCK_SIZE
}
