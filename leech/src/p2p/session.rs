use std::time::Duration;
use tokio::{net::TcpStream, time};
use tokio_util::codec::{Framed, FramedParts};
use futures::{SinkExt, StreamExt};
use crate::{
    block::{self, BlockInfo},
    config::Config,
    peer::Peer,
    Bitfield,
    ID,
};
use super::{*, message::*, handshake::*, state::*};

type MessageStream = Framed<TcpStream, MessageCodec>;

// One established connection to a peer we download from.
pub struct PeerSession {

    peer: Peer,

    socket: MessageStream,

    num_pieces: usize,

    // Pieces the peer has, None until it sends a bitfield or have.
    bitfield: Option<Bitfield>,

    state: SessionState,

    unchoke_timeout: Duration,

    block_timeout: Duration,

}

impl PeerSession {

    // Dials the peer and exchanges handshakes, recording the peer's id.
    #[tracing::instrument(name = "peer", skip_all, fields(address = %peer.address))]
    pub async fn open(mut peer: Peer, num_pieces: usize, config: &Config) -> Result<PeerSession> {

        let mut state = SessionState::default();
        state.conn_state = ConnState::Connecting;

        let stream = time::timeout(config.connect_timeout, TcpStream::connect(peer.socket_addr()))
            .await
            .map_err(|_| PeerError::Timeout("connecting"))?
            .map_err(PeerError::Dial)?;
        tracing::trace!("outbound connection successful");

        state.conn_state = ConnState::Handshaking;
        let mut socket = Framed::new(stream, HandshakeCodec);
        let handshake = time::timeout(config.connect_timeout, exchange_handshake(&mut socket, &peer))
            .await
            .map_err(|_| PeerError::Timeout("handshaking"))??;
        peer.remote_id = Some(handshake.peer_id);
        tracing::info!("handshake successful, peer connected");

        // Anything the peer sent straight after its handshake is still in
        // the read buffer, so it moves across with the stream.
        let parts = socket.into_parts();
        let mut message_parts = FramedParts::new::<Message>(parts.io, MessageCodec);
        message_parts.read_buf = parts.read_buf;
        message_parts.write_buf = parts.write_buf;

        state.conn_state = ConnState::Negotiating;
        Ok(PeerSession {
            peer,
            socket: Framed::from_parts(message_parts),
            num_pieces,
            bitfield: None,
            state,
            unchoke_timeout: config.unchoke_timeout,
            block_timeout: config.block_timeout,
        })
    }

    // Declares interest then waits until the peer unchokes us.
    #[tracing::instrument(name = "peer", skip(self), fields(address = %self.peer.address))]
    pub async fn negotiate(&mut self) -> Result<()> {

        if !self.state.am_interested {
            self.send_message(Message::Interested).await?;
            self.state.am_interested = true;
        }

        let unchoke_timeout = self.unchoke_timeout;
        time::timeout(unchoke_timeout, async {
            while self.state.peer_choking {
                let msg = self.read_message().await?;
                self.handle_state_msg(msg)?;
            }
            Ok::<_, PeerError>(())
        })
        .await
        .map_err(|_| PeerError::Timeout("waiting for unchoke"))??;

        self.state.conn_state = ConnState::Connected;
        tracing::info!("unchoked by peer");
        Ok(())
    }

    // Fetches a whole piece, one block request at a time.
    #[tracing::instrument(name = "peer", skip(self), fields(address = %self.peer.address))]
    pub async fn download_piece(&mut self, idx: usize, len: usize) -> Result<Vec<u8>> {

        if !self.state.can_request() {
            return Err(PeerError::Choked);
        }
        if !self.has_piece(idx) {
            return Err(PeerError::MissingPiece(idx));
        }

        let mut buf = Vec::with_capacity(len);
        for block_idx in 0..block::num_blocks(len) {
            let request = BlockInfo::new(idx, len, block_idx);
            self.send_message(Message::Request(request)).await?;

            let block_timeout = self.block_timeout;
            let data = time::timeout(block_timeout, self.read_block(&request))
                .await
                .map_err(|_| PeerError::Timeout("waiting for block"))??;
            buf.extend_from_slice(&data);
        }

        debug_assert_eq!(buf.len(), len);
        tracing::debug!("downloaded piece {} ({} bytes)", idx, len);
        Ok(buf)
    }

    // Flushes anything pending and shuts the connection.
    #[tracing::instrument(name = "peer", skip(self), fields(address = %self.peer.address))]
    pub async fn close(mut self) {
        self.state.conn_state = ConnState::Disconnected;
        if let Err(e) = self.socket.close().await {
            tracing::debug!("error closing connection: {}", e);
        }
        tracing::info!("session closed");
    }

    pub fn peer(&self) -> &Peer { &self.peer }

    pub fn remote_id(&self) -> Option<ID> { self.peer.remote_id }

    pub fn state(&self) -> &SessionState { &self.state }

    pub fn bitfield(&self) -> Option<&Bitfield> { self.bitfield.as_ref() }

    // Peers which never advertised anything are assumed to have every piece.
    pub fn has_piece(&self, idx: usize) -> bool {
        match &self.bitfield {
            Some(bitfield) => bitfield.get(idx).map(|bit| *bit).unwrap_or(false),
            None => idx < self.num_pieces,
        }
    }

    async fn read_block(&mut self, request: &BlockInfo) -> Result<Vec<u8>> {
        loop {
            match self.read_message().await? {
                Message::Piece(block) if request.matches(&block) => return Ok(block.data),
                Message::Piece(block) => {
                    tracing::warn!("block does not match request {:?}", request);
                    return Err(PeerError::BlockMismatch { expected: *request, got: block });
                },
                Message::KeepAlive => {},
                Message::Choke => {
                    self.state.peer_choking = true;
                    self.state.conn_state = ConnState::Negotiating;
                    return Err(PeerError::Choked);
                },
                msg @ (Message::Request(_) | Message::Cancel(_)) => {
                    return Err(PeerError::UnexpectedMessage(msg.to_string()));
                },
                msg => self.handle_state_msg(msg)?,
            }
        }
    }

    // Applies messages that only change what we know about the peer.
    fn handle_state_msg(&mut self, msg: Message) -> Result<()> {
        match msg {
            Message::Bitfield(bitfield) => self.handle_bitfield(bitfield)?,
            Message::Have { idx } => self.handle_have(idx as usize)?,
            Message::Choke => self.state.peer_choking = true,
            Message::Unchoke => self.state.peer_choking = false,
            Message::Interested => self.state.peer_interested = true,
            Message::NotInterested => self.state.peer_interested = false,
            Message::KeepAlive | Message::Port { .. } => {},
            msg => tracing::debug!("ignoring {}", msg),
        }
        Ok(())
    }

    fn handle_bitfield(&mut self, mut bitfield: Bitfield) -> Result<()> {
        if bitfield.len() < self.num_pieces {
            return Err(PeerError::InvalidMessage(format!(
                "bitfield of {} bits for {} pieces", bitfield.len(), self.num_pieces,
            )));
        }
        // Remove trailing bits.
        bitfield.truncate(self.num_pieces);
        tracing::info!("peer has {}/{} pieces", bitfield.count_ones(), self.num_pieces);
        self.state.num_pieces = bitfield.count_ones();
        self.bitfield = Some(bitfield);
        Ok(())
    }

    fn handle_have(&mut self, idx: usize) -> Result<()> {
        if idx >= self.num_pieces {
            tracing::error!("have msg with invalid idx: {}", idx);
            return Err(PeerError::InvalidMessage(format!("have for piece {}", idx)));
        }
        let num_pieces = self.num_pieces;
        let bitfield = self.bitfield.get_or_insert_with(|| Bitfield::repeat(false, num_pieces));
        if !bitfield[idx] {
            bitfield.set(idx, true);
            self.state.num_pieces += 1;
        }
        Ok(())
    }

    async fn read_message(&mut self) -> Result<Message> {
        match self.socket.next().await {
            Some(msg) => {
                let msg = msg?;
                tracing::trace!("read: {}", msg);
                Ok(msg)
            },
            None => Err(PeerError::Closed),
        }
    }

    async fn send_message(&mut self, msg: Message) -> Result<()> {
        tracing::trace!("send: {}", msg);
        self.socket.send(msg).await
    }
}

async fn exchange_handshake(socket: &mut Framed<TcpStream, HandshakeCodec>, peer: &Peer) -> Result<Handshake> {

    tracing::trace!("send handshake");
    socket.send(Handshake::new(peer.info_hash, peer.client_id)).await?;

    tracing::trace!("waiting for handshake");
    let handshake = match socket.next().await {
        Some(handshake) => handshake?,
        None => return Err(PeerError::NoHandshake),
    };

    if handshake.info_hash != peer.info_hash {
        return Err(PeerError::IncorrectInfoHash);
    }
    Ok(handshake)
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .finish()
    }
}
