use std::time::Duration;
use rand::{distributions::Alphanumeric, Rng};

#[derive(Debug, Clone)]
pub struct Config {

    // Our 20-byte peer id, sent to the tracker and in every handshake.
    pub client_id: [u8; 20],

    // Advertised to the tracker, nothing listens on it.
    pub listen_port: u16,

    // Number of download workers.
    pub concurrency: usize,

    // Upper bound on the number of peer sessions opened.
    pub max_peers: usize,

    pub tracker_timeout: Duration,

    // Covers the tcp connect and the handshake exchange.
    pub connect_timeout: Duration,

    // How long to wait for the peer to unchoke us after sending interested.
    pub unchoke_timeout: Duration,

    // Deadline for each block reply.
    pub block_timeout: Duration,

    // A piece that has failed this many times fails the download.
    pub max_piece_attempts: u32,

}

const CLIENT_ID_PREFIX: &[u8; 8] = b"-LC0100-";

// Azureus style id, client prefix followed by random alphanumerics.
pub fn generate_client_id() -> [u8; 20] {
    let mut id = [0; 20];
    id[..8].copy_from_slice(CLIENT_ID_PREFIX);
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .zip(id[8..].iter_mut())
        .for_each(|(c, b)| *b = c);
    id
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: generate_client_id(),
            listen_port: 6889,
            concurrency: 10,
            max_peers: 50,
            tracker_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            unchoke_timeout: Duration::from_secs(30),
            block_timeout: Duration::from_secs(30),
            max_piece_attempts: 5,
        }
    }
}
