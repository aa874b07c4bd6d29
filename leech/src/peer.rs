use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use crate::ID;

// A remote endpoint we can download from.
#[derive(Clone, PartialEq, Eq)]
pub struct Peer {

    pub address: SocketAddrV4,

    // Our peer id, sent in the handshake.
    pub client_id: ID,

    // Identifies the torrent.
    pub info_hash: ID,

    // Learnt from the peer's handshake.
    pub remote_id: Option<ID>,

}

impl Peer {

    pub fn new(address: SocketAddrV4, info_hash: ID, client_id: ID) -> Self {
        Self {
            address,
            client_id,
            info_hash,
            remote_id: None,
        }
    }

    // Compact form: 4 byte ipv4 address then 2 byte port, both big-endian.
    pub fn from_compact(raw: [u8; 6]) -> SocketAddrV4 {
        let ip = Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]);
        SocketAddrV4::new(ip, u16::from_be_bytes([raw[4], raw[5]]))
    }

    // Dotted quad.
    pub fn ip(&self) -> String { self.address.ip().to_string() }

    pub fn port(&self) -> String { self.address.port().to_string() }

    pub fn socket_addr(&self) -> SocketAddr { SocketAddr::V4(self.address) }

}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address)
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("address", &self.address)
            .field("remote_id", &self.remote_id.as_ref().map(|id| String::from_utf8_lossy(id)))
            .finish()
    }
}
