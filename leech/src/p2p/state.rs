#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConnState {
    Connecting,
    Handshaking,
    // Waiting on the peer to unchoke us.
    Negotiating,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionState {

    pub conn_state: ConnState,

    // Whether we are refusing the peer's requests. Always true, we never upload.
    pub am_choking: bool,

    // Whether we are interested in the peer's pieces.
    pub am_interested: bool,

    // Whether the peer is refusing our requests.
    pub peer_choking: bool,

    // Whether the peer is interested in our pieces.
    pub peer_interested: bool,

    // Pieces the peer has advertised.
    pub num_pieces: usize,
}

impl Default for SessionState {
    fn default() -> SessionState {
        SessionState {
            conn_state: ConnState::Disconnected,
            am_choking: true,
            am_interested: false,
            peer_choking: true,
            peer_interested: false,
            num_pieces: 0,
        }
    }
}

impl SessionState {

    #[inline(always)]
    pub fn can_request(&self) -> bool {
        self.am_interested && !self.peer_choking
    }
}
