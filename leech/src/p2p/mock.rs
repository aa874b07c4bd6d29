// In-process seeder used by the session and download tests.

use std::{collections::HashSet, net::{Ipv4Addr, SocketAddrV4}, sync::{Arc, Mutex}, time::Duration};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, FramedParts};
use crate::{block::BlockData, Bitfield, ID};
use super::{Handshake, HandshakeCodec, Message, MessageCodec};

#[derive(Clone)]
pub(crate) struct Seeder {

    pub info_hash: ID,

    pub peer_id: ID,

    pub data: Arc<Vec<u8>>,

    pub piece_len: usize,

    // Send a bitfield after the handshake.
    pub advertise: bool,

    // Pieces left out of the bitfield.
    pub missing: Vec<usize>,

    // Answer interested with unchoke.
    pub unchoke: bool,

    // Send a keep alive before every block.
    pub keep_alive: bool,

    // Choke instead of answering the first request.
    pub choke_on_request: bool,

    // Reply to requests with the wrong offset.
    pub misplace_blocks: bool,

    // Pieces whose next serving has a flipped byte.
    pub corrupt: Arc<Mutex<HashSet<usize>>>,

    // Respond with this info hash instead of the torrent's.
    pub wrong_info_hash: Option<ID>,

    // Wait this long before answering each request.
    pub delay: Option<Duration>,

}

impl Seeder {

    pub fn new(info_hash: ID, peer_id: ID, data: Vec<u8>, piece_len: usize) -> Self {
        Self {
            info_hash,
            peer_id,
            data: Arc::new(data),
            piece_len,
            advertise: true,
            missing: Vec::new(),
            unchoke: true,
            keep_alive: false,
            choke_on_request: false,
            misplace_blocks: false,
            corrupt: Arc::new(Mutex::new(HashSet::new())),
            wrong_info_hash: None,
            delay: None,
        }
    }

    pub fn corrupt_once(self, idx: usize) -> Self {
        self.corrupt.lock().unwrap().insert(idx);
        self
    }

    // Accepts connections until the test ends.
    pub async fn spawn(self) -> SocketAddrV4 {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let seeder = self.clone();
                tokio::spawn(async move { seeder.serve(stream).await });
            }
        });
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)
    }

    async fn serve(self, stream: TcpStream) {

        let mut socket = Framed::new(stream, HandshakeCodec);
        let Some(Ok(handshake)) = socket.next().await else { return };
        assert_eq!(handshake.protocol, super::PROTOCOL);
        let info_hash = self.wrong_info_hash.unwrap_or(self.info_hash);
        if socket.send(Handshake::new(info_hash, self.peer_id)).await.is_err() {
            return;
        }

        let parts = socket.into_parts();
        let mut message_parts = FramedParts::new::<Message>(parts.io, MessageCodec);
        message_parts.read_buf = parts.read_buf;
        let mut socket = Framed::from_parts(message_parts);

        let num_pieces = (self.data.len() + self.piece_len - 1) / self.piece_len;
        if self.advertise {
            let mut bitfield = Bitfield::repeat(true, num_pieces);
            for &idx in &self.missing {
                bitfield.set(idx, false);
            }
            // Pad to a whole number of bytes as peers do on the wire.
            bitfield.resize((num_pieces + 7) / 8 * 8, false);
            if socket.send(Message::Bitfield(bitfield)).await.is_err() {
                return;
            }
        }

        let mut choked = false;
        while let Some(Ok(msg)) = socket.next().await {
            match msg {
                Message::Interested if self.unchoke => {
                    if socket.send(Message::Unchoke).await.is_err() { return; }
                },
                Message::Request(request) => {
                    if self.choke_on_request && !choked {
                        choked = true;
                        if socket.send(Message::Choke).await.is_err() { return; }
                        continue;
                    }
                    if let Some(delay) = self.delay {
                        tokio::time::sleep(delay).await;
                    }
                    if self.keep_alive && socket.send(Message::KeepAlive).await.is_err() {
                        return;
                    }
                    let begin = request.piece_idx * self.piece_len + request.offset;
                    let mut data = self.data[begin..begin + request.len].to_vec();
                    let corrupt = request.offset == 0 && self.corrupt.lock().unwrap().remove(&request.piece_idx);
                    if corrupt {
                        data[0] ^= 0xff;
                    }
                    let offset = if self.misplace_blocks { request.offset + 1 } else { request.offset };
                    let block = BlockData { piece_idx: request.piece_idx, offset, data };
                    if socket.send(Message::Piece(block)).await.is_err() { return; }
                },
                _ => {},
            }
        }
    }
}

// Deterministic, piece-distinguishable content.
pub(crate) fn test_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
