use std::{net::SocketAddrV4, time::Duration};
use url::Url;
use serde_derive::Deserialize;
use super::{decode_compact_peers, AnnounceParams, Result, TrackerError};

pub struct HttpTracker {

    client: reqwest::Client,

    url: Url,

    timeout: Duration,

    id: Option<String>,

    interval: Option<Duration>,

}

impl HttpTracker {

    pub fn new(url: Url, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            timeout,
            id: None,
            interval: None,
        }
    }

    // Re-announce interval the tracker asked for, if any.
    pub fn interval(&self) -> Option<Duration> { self.interval }

    fn announce_url(&self, params: &AnnounceParams) -> String {
        // Some announce urls already carry a query, e.g. a passkey.
        let sep = if self.url.query().is_some() { '&' } else { '?' };
        let mut url = format!(
            "{}{}info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            self.url.as_str(),
            sep,
            urlencoding::encode_binary(&params.info_hash),
            urlencoding::encode_binary(&params.client_id),
            params.port,
            params.uploaded,
            params.downloaded,
            params.left,
        );
        if let Some(tracker_id) = &self.id {
            url.push_str(&format!("&trackerid={}", urlencoding::encode(tracker_id)));
        }
        url
    }

    pub async fn announce(&mut self, params: AnnounceParams) -> Result<Vec<SocketAddrV4>> {

        let url = self.announce_url(&params);
        tracing::debug!("announce url: {}", url);

        let resp = self.client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(TrackerError::Status(resp.status()));
        }
        let raw_resp = resp.bytes().await?;

        let resp: HttpResponse = bencode::decode_bytes(&raw_resp)?;
        tracing::debug!("announce response: {:?}", resp);

        if let Some(failure) = resp.failure_reason {
            return Err(TrackerError::ResponseError(failure));
        }
        if let Some(warning) = resp.warning_message {
            tracing::warn!("warning: {}", warning);
        }
        if let Some(interval) = resp.interval {
            self.interval = Some(Duration::from_secs(interval));
        }
        if let Some(tracker_id) = resp.tracker_id {
            self.id = Some(tracker_id);
        }

        decode_compact_peers(resp.peers.as_ref())
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct HttpResponse {

    // If present, then no other keys may be present.
    // The value is a human-readable error message as to why the request failed (string).
    #[serde(rename = "failure reason")]
    pub failure_reason: Option<String>,

    // Similar to failure reason, but the response still gets processed normally.
    #[serde(rename = "warning message")]
    pub warning_message: Option<String>,

    // Interval in seconds that the client should wait between sending regular requests to the tracker
    pub interval: Option<u64>,

    // A string that the client should send back on its next announcements.
    #[serde(rename = "tracker id")]
    pub tracker_id: Option<String>,

    // Number of peers with the entire file, i.e. seeders (integer)
    pub complete: Option<u64>,

    // Number of non-seeder peers, aka "leechers" (integer)
    pub incomplete: Option<u64>,

    // Kept generic so a dictionary model list can be reported rather than failing to parse.
    pub peers: Option<bencode::Value>,
}
