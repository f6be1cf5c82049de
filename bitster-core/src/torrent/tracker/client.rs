//! HTTP tracker client with URL building and response parsing

use std::net::{Ipv4Addr, SocketAddrV4};

use async_trait::async_trait;

use super::types::{AnnounceRequest, AnnounceResponse, PeerRecord, TrackerClient};
use crate::config::TrackerConfig;
use crate::torrent::{PeerId, TorrentError};

/// HTTP tracker client.
///
/// The announce endpoint is derived once at construction. A malformed
/// announce URL does not prevent construction; every announce then fails
/// with `TorrentError::InvalidAnnounceUrl` so the caller can record it.
pub struct HttpTrackerClient {
    announce_url: String,
    endpoint: Result<String, url::ParseError>,
    client: reqwest::Client,
}

impl HttpTrackerClient {
    /// Creates HTTP tracker client using tracker timeout and user agent settings.
    ///
    /// # Errors
    ///
    /// - `TorrentError::TrackerConnectionFailed` - If the HTTP client cannot be initialized
    pub fn new(announce_url: &str, config: &TrackerConfig) -> Result<Self, TorrentError> {
        let client = reqwest::Client::builder()
            .timeout(config.tracker_timeout)
            .user_agent(config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(3))
            .build()
            .map_err(|e| {
                tracing::error!("Failed to build HTTP client for {announce_url}: {e}");
                TorrentError::TrackerConnectionFailed {
                    url: announce_url.to_string(),
                }
            })?;

        Ok(Self {
            announce_url: announce_url.to_string(),
            endpoint: Self::derive_endpoint(announce_url),
            client,
        })
    }

    /// Reduces an announce URL to `scheme://host:port/path`.
    ///
    /// Any query string or fragment on the configured URL is dropped and the
    /// scheme's default port is made explicit.
    pub(crate) fn derive_endpoint(announce_url: &str) -> Result<String, url::ParseError> {
        let url = url::Url::parse(announce_url)?;
        let host = url.host_str().ok_or(url::ParseError::EmptyHost)?;
        let port = url
            .port_or_known_default()
            .ok_or(url::ParseError::InvalidPort)?;

        Ok(format!("{}://{}:{}{}", url.scheme(), host, port, url.path()))
    }

    /// Builds the full announce URL for `request`.
    ///
    /// # Errors
    ///
    /// - `TorrentError::InvalidAnnounceUrl` - If the endpoint could not be derived
    pub(crate) fn build_announce_url(
        &self,
        request: &AnnounceRequest,
    ) -> Result<String, TorrentError> {
        let endpoint =
            self.endpoint
                .as_ref()
                .map_err(|e| TorrentError::InvalidAnnounceUrl {
                    url: self.announce_url.clone(),
                    source: *e,
                })?;

        // Raw bytes are escaped by hand so they are not encoded twice.
        let mut url = format!(
            "{}?info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}",
            endpoint,
            url_encode_bytes(request.info_hash.as_bytes()),
            url_encode_bytes(request.peer_id.as_bytes()),
            request.port,
            request.uploaded,
            request.downloaded,
            request.left,
        );

        if let Some(event) = request.event {
            url.push_str("&event=");
            url.push_str(event.as_str());
        }

        Ok(url)
    }
}

/// Percent-escapes every byte, as trackers expect for binary parameters.
pub(crate) fn url_encode_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| format!("%{b:02X}")).collect()
}

/// Parses compact peer list: 4 bytes IPv4 address plus 2 bytes port per peer.
///
/// # Errors
///
/// - `TorrentError::ProtocolError` - If the length is not a multiple of 6
pub(crate) fn parse_compact_peers(peer_bytes: &[u8]) -> Result<Vec<PeerRecord>, TorrentError> {
    if !peer_bytes.len().is_multiple_of(6) {
        return Err(TorrentError::ProtocolError {
            message: "Invalid compact peer data length".to_string(),
        });
    }

    Ok(peer_bytes
        .chunks_exact(6)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            let addr = SocketAddrV4::new(ip, port);
            PeerRecord {
                peer_id: None,
                ip: addr.ip().to_string(),
                port: addr.port(),
            }
        })
        .collect())
}

/// Parses the dictionary form of the peer list.
///
/// Entries without a usable `ip` or `port` make the whole response invalid.
/// A `peer id` of the wrong length is treated as absent.
fn parse_peer_dictionaries(
    entries: &[bencode_rs::Value<'_>],
) -> Result<Vec<PeerRecord>, TorrentError> {
    let mut peers = Vec::with_capacity(entries.len());

    for entry in entries {
        let bencode_rs::Value::Dictionary(peer) = entry else {
            return Err(TorrentError::ProtocolError {
                message: "Peer entry is not a dictionary".to_string(),
            });
        };

        let peer_id = match peer.get(b"peer id".as_slice()) {
            Some(bencode_rs::Value::Bytes(id)) => PeerId::from_slice(id),
            _ => None,
        };

        let ip = match peer.get(b"ip".as_slice()) {
            Some(bencode_rs::Value::Bytes(ip)) => String::from_utf8_lossy(ip).to_string(),
            _ => {
                return Err(TorrentError::ProtocolError {
                    message: "Peer entry missing ip".to_string(),
                });
            }
        };

        let port = match peer.get(b"port".as_slice()) {
            Some(bencode_rs::Value::Integer(port)) => {
                u16::try_from(*port).map_err(|_| TorrentError::ProtocolError {
                    message: format!("Peer port out of range: {port}"),
                })?
            }
            _ => {
                return Err(TorrentError::ProtocolError {
                    message: "Peer entry missing port".to_string(),
                });
            }
        };

        peers.push(PeerRecord { peer_id, ip, port });
    }

    Ok(peers)
}

/// Parses a bencoded announce response.
///
/// # Errors
///
/// - `TorrentError::TrackerRejected` - If the tracker sent a failure reason
/// - `TorrentError::ProtocolError` - If the response is malformed or lacks an interval
pub(crate) fn parse_announce_response(
    response_bytes: &[u8],
) -> Result<AnnounceResponse, TorrentError> {
    let parsed =
        bencode_rs::Value::parse(response_bytes).map_err(|e| TorrentError::ProtocolError {
            message: format!("Failed to parse tracker response: {e:?}"),
        })?;

    let Some(bencode_rs::Value::Dictionary(dict)) = parsed.first() else {
        return Err(TorrentError::ProtocolError {
            message: "Invalid tracker response format".to_string(),
        });
    };

    if let Some(bencode_rs::Value::Bytes(failure_reason)) = dict.get(b"failure reason".as_slice())
    {
        return Err(TorrentError::TrackerRejected {
            reason: String::from_utf8_lossy(failure_reason).to_string(),
        });
    }

    let interval = match dict.get(b"interval".as_slice()) {
        Some(bencode_rs::Value::Integer(val)) => {
            u32::try_from(*val).map_err(|_| TorrentError::ProtocolError {
                message: format!("Invalid interval in tracker response: {val}"),
            })?
        }
        _ => {
            return Err(TorrentError::ProtocolError {
                message: "Missing interval in tracker response".to_string(),
            });
        }
    };

    let count = |key: &[u8]| match dict.get(key) {
        Some(bencode_rs::Value::Integer(val)) => u32::try_from(*val).ok(),
        _ => None,
    };

    let tracker_id = match dict.get(b"tracker id".as_slice()) {
        Some(bencode_rs::Value::Bytes(id_bytes)) => {
            Some(String::from_utf8_lossy(id_bytes).to_string())
        }
        _ => None,
    };

    let peers = match dict.get(b"peers".as_slice()) {
        Some(bencode_rs::Value::List(entries)) => parse_peer_dictionaries(entries)?,
        Some(bencode_rs::Value::Bytes(peer_data)) => parse_compact_peers(peer_data)?,
        _ => Vec::new(),
    };

    Ok(AnnounceResponse {
        interval,
        min_interval: count(b"min interval".as_slice()),
        tracker_id,
        complete: count(b"complete".as_slice()).unwrap_or(0),
        incomplete: count(b"incomplete".as_slice()).unwrap_or(0),
        peers,
    })
}

#[async_trait]
impl TrackerClient for HttpTrackerClient {
    /// Announces to the tracker and decodes its peer list.
    ///
    /// # Errors
    ///
    /// - `TorrentError::InvalidAnnounceUrl` - Malformed endpoint
    /// - `TorrentError::TrackerTimeout` - Request timed out
    /// - `TorrentError::TrackerConnectionFailed` - Network error
    /// - `TorrentError::TrackerServerError` - Non-success HTTP status
    /// - `TorrentError::TrackerRejected` - Tracker sent a failure reason
    /// - `TorrentError::ProtocolError` - Invalid response format
    async fn announce(&self, request: AnnounceRequest) -> Result<AnnounceResponse, TorrentError> {
        let url = self.build_announce_url(&request)?;
        tracing::info!(
            "Announcing to tracker {} (event: {:?})",
            self.announce_url,
            request.event
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::warn!("HTTP request to {} failed: {}", self.announce_url, e);

            if e.is_timeout() {
                TorrentError::TrackerTimeout {
                    url: self.announce_url.clone(),
                }
            } else {
                TorrentError::TrackerConnectionFailed {
                    url: self.announce_url.clone(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                "Tracker {} returned error status: {}",
                self.announce_url,
                status
            );
            return Err(TorrentError::TrackerServerError {
                url: self.announce_url.clone(),
                status: status.as_u16(),
            });
        }

        let response_bytes = response.bytes().await.map_err(|e| {
            tracing::warn!(
                "Failed to read response body from {}: {}",
                self.announce_url,
                e
            );
            TorrentError::TrackerConnectionFailed {
                url: self.announce_url.clone(),
            }
        })?;

        let response = parse_announce_response(&response_bytes).map_err(|e| {
            tracing::warn!("Failed to parse response from {}: {}", self.announce_url, e);
            e
        })?;

        tracing::debug!(
            "Tracker {} returned {} peers, interval {}s",
            self.announce_url,
            response.peers.len(),
            response.interval
        );
        Ok(response)
    }

    fn tracker_url(&self) -> &str {
        &self.announce_url
    }
}
