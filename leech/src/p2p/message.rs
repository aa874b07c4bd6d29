use bytes::{BufMut, Buf, BytesMut};
use tokio_util::codec::{Encoder, Decoder};
use crate::{block, Bitfield, BLOCK_SIZE};
use super::PeerError;

// Largest frame accepted from a peer. A piece message carries at most one
// block, a bitfield of this size covers over sixteen million pieces.
const MAX_MESSAGE_LEN: usize = 2 * 1024 * 1024 + 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    
    // The keep alive message advises peers not to close the connection, 
    // even if they haven’t received a message in some time.
    KeepAlive,
    
    // A choke message tells a peer that no further requests will be satisfied.
    Choke,
    
    // Conversely unchoke signifies that requests from the peer will be served.
    Unchoke,
    
    // Notifies a peer that the client is interested in making requests for blocks.
    Interested,

    // Notifies a peer the client is no longer interested in requesting blocks.
    NotInterested,
    
    // Tells a peer that the client has a piece, referenced by the piece index.
    Have { idx: u32 },

    // Short form of every piece a peer has, usually sent straight after the handshake.
    Bitfield(Bitfield),

    // Request for a block by piece index, offset within the piece and length.
    Request(block::BlockInfo),

    // A block of a piece, referencing piece index and block offset.
    Piece(block::BlockData),

    // The cancel message is sent to cancel a request for a block.
    Cancel(block::BlockInfo),

    // The DHT port the sender listens on.
    Port { port: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
    Port = 9,
}

impl TryFrom<u8> for MessageId {
    type Error = PeerError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Ok(match id {
            0 => MessageId::Choke,
            1 => MessageId::Unchoke,
            2 => MessageId::Interested,
            3 => MessageId::NotInterested,
            4 => MessageId::Have,
            5 => MessageId::Bitfield,
            6 => MessageId::Request,
            7 => MessageId::Piece,
            8 => MessageId::Cancel,
            9 => MessageId::Port,
            id => return Err(PeerError::InvalidMessageId(id)),
        })
    }
}

impl Message {

    // None for keep alive, which has no ID on the wire.
    pub fn id(&self) -> Option<MessageId> {
        Some(match self {
            Message::KeepAlive => return None,
            Message::Choke => MessageId::Choke,
            Message::Unchoke => MessageId::Unchoke,
            Message::Interested => MessageId::Interested,
            Message::NotInterested => MessageId::NotInterested,
            Message::Have { .. } => MessageId::Have,
            Message::Bitfield(_) => MessageId::Bitfield,
            Message::Request(_) => MessageId::Request,
            Message::Piece(_) => MessageId::Piece,
            Message::Cancel(_) => MessageId::Cancel,
            Message::Port { .. } => MessageId::Port,
        })
    }

    // Builds a message from a raw ID and its payload, checking the payload
    // is exactly the size the ID calls for.
    pub fn from_parts(id: u8, mut payload: &[u8]) -> Result<Message, PeerError> {

        let id = MessageId::try_from(id)?;
        let payload_len = payload.len();
        let expect_len = |len: usize| check_payload_len(id, payload_len, len);

        let msg = match id {
            MessageId::Choke => { expect_len(0)?; Message::Choke },
            MessageId::Unchoke => { expect_len(0)?; Message::Unchoke },
            MessageId::Interested => { expect_len(0)?; Message::Interested },
            MessageId::NotInterested => { expect_len(0)?; Message::NotInterested },
            MessageId::Have => {
                expect_len(4)?;
                Message::Have { idx: payload.get_u32() }
            },
            MessageId::Bitfield => Message::Bitfield(Bitfield::from_slice(payload)),
            MessageId::Request | MessageId::Cancel => {
                expect_len(12)?;
                let info = block::BlockInfo {
                    piece_idx: payload.get_u32() as usize,
                    offset: payload.get_u32() as usize,
                    len: payload.get_u32() as usize,
                };
                if id == MessageId::Request { Message::Request(info) } else { Message::Cancel(info) }
            },
            MessageId::Piece => {
                if payload.len() < 8 || payload.len() - 8 > BLOCK_SIZE {
                    return Err(PeerError::InvalidMessage(format!(
                        "piece payload of {} bytes", payload.len(),
                    )));
                }
                let piece_idx = payload.get_u32() as usize;
                let offset = payload.get_u32() as usize;
                Message::Piece(block::BlockData { piece_idx, offset, data: payload.to_vec() })
            },
            MessageId::Port => {
                expect_len(2)?;
                Message::Port { port: payload.get_u16() }
            },
        };

        Ok(msg)
    }
}

fn check_payload_len(id: MessageId, actual: usize, expected: usize) -> Result<(), PeerError> {
    if actual == expected {
        Ok(())
    } else {
        Err(PeerError::InvalidMessage(format!(
            "{:?} payload is {} bytes, expected {}", id, actual, expected,
        )))
    }
}

pub struct MessageCodec;

impl Encoder<Message> for MessageCodec {

    type Error = PeerError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match msg {

            // [0, 0, 0, 0]
            Message::KeepAlive => dst.put_u32(0),

            // [0, 0, 0, 1, 0]
            Message::Choke => {
                dst.put_u32(1);
                dst.put_u8(MessageId::Choke as u8);
            },

            // [0, 0, 0, 1, 1]
            Message::Unchoke => {
                dst.put_u32(1);
                dst.put_u8(MessageId::Unchoke as u8);
            },

            // [0, 0, 0, 1, 2]
            Message::Interested => {
                dst.put_u32(1);
                dst.put_u8(MessageId::Interested as u8);
            },

            // [0, 0, 0, 1, 3]
            Message::NotInterested => {
                dst.put_u32(1);
                dst.put_u8(MessageId::NotInterested as u8);
            },

            // have: <len=0005><id=4><piece index>
            Message::Have { idx } => {
                dst.put_u32(5);
                dst.put_u8(MessageId::Have as u8);
                dst.put_u32(idx);
            },

            // bitfield: <len=0001+X><id=5><bitfield>
            Message::Bitfield(bitfield) => {
                let raw = bitfield.as_raw_slice();
                dst.put_u32(1 + raw.len() as u32);
                dst.put_u8(MessageId::Bitfield as u8);
                dst.extend_from_slice(raw);
            },

            // request: <len=0013><id=6><index><begin><length>
            Message::Request(block) => {
                dst.put_u32(13);
                dst.put_u8(MessageId::Request as u8);
                dst.put_u32(block.piece_idx as u32);
                dst.put_u32(block.offset as u32);
                dst.put_u32(block.len as u32);
            },

            // piece: <len=0009+X><id=7><index><begin><block>
            Message::Piece(block) => {
                dst.put_u32(9 + block.data.len() as u32);
                dst.put_u8(MessageId::Piece as u8);
                dst.put_u32(block.piece_idx as u32);
                dst.put_u32(block.offset as u32);
                dst.extend_from_slice(&block.data);
            },

            // cancel: <len=0013><id=8><index><begin><length>
            Message::Cancel(block) => {
                dst.put_u32(13);
                dst.put_u8(MessageId::Cancel as u8);
                dst.put_u32(block.piece_idx as u32);
                dst.put_u32(block.offset as u32);
                dst.put_u32(block.len as u32);
            },

            // port: <len=0003><id=9><listen-port>
            Message::Port { port } => {
                dst.put_u32(3);
                dst.put_u8(MessageId::Port as u8);
                dst.put_u16(port);
            },
        }

        Ok(())
    }
}

impl Decoder for MessageCodec {
    
    type Item = Message;
    type Error = PeerError;
    
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        
        // Can't read message length.
        if src.len() < 4 { return Ok(None); }

        let msg_len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if msg_len > MAX_MESSAGE_LEN {
            return Err(PeerError::InvalidMessage(format!("frame length {}", msg_len)));
        }

        if src.len() < 4 + msg_len {
            // Haven't recieved all of message.
            src.reserve(4 + msg_len - src.len());
            return Ok(None);
        }

        src.advance(4);
        if msg_len == 0 {
            return Ok(Some(Message::KeepAlive));
        }

        let id = src.get_u8();
        let payload = src.split_to(msg_len - 1);
        Message::from_parts(id, &payload).map(Some)
    }

    // A frame cut short by the peer closing the connection is a transport error.
    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(msg) => Ok(Some(msg)),
            None if buf.is_empty() => Ok(None),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("{} bytes of an unfinished frame", buf.len()),
            ).into()),
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::KeepAlive => write!(f, "keep alive"),
            Message::Choke => write!(f, "choke"),
            Message::Unchoke => write!(f, "unchoke"),
            Message::Interested => write!(f, "interested"),
            Message::NotInterested => write!(f, "not interested"),
            Message::Have { idx } => write!(f, "have piece idx: {}", idx),
            Message::Bitfield(bf) => write!(f, "bitfield with {} pieces", bf.count_ones()),
            Message::Request(block) => write!(f, "request for block {{ piece idx: {}, offset {}, length: {} }}",
                block.piece_idx, 
                block.offset, 
                block.len,
            ),
            Message::Piece(block) => write!(f, "block data {{ piece idx: {}, offset: {}, length: {} }}", 
                block.piece_idx, 
                block.offset,
                block.data.len(),
            ),
            Message::Cancel(block) => write!(f, "cancel for block {{ piece idx: {}, offset: {}, length: {} }}", 
                block.piece_idx, 
                block.offset, 
                block.len
            ),
            Message::Port { port } => write!(f, "port {}", port),
        }
    }
}
