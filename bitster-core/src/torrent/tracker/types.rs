//! Core types and traits for tracker communication

use async_trait::async_trait;

use crate::torrent::{InfoHash, PeerId, TorrentError};

/// Tracker announce request.
///
/// Carries the transfer statistics reported to the tracker together with
/// the identity of the torrent and of this client.
#[derive(Debug, Clone)]
pub struct AnnounceRequest {
    /// Torrent being announced
    pub info_hash: InfoHash,
    /// Client's 20-byte identifier
    pub peer_id: PeerId,
    /// TCP port accepting peer connections
    pub port: u16,
    /// Total bytes uploaded to other peers
    pub uploaded: u64,
    /// Total bytes downloaded from other peers
    pub downloaded: u64,
    /// Bytes remaining to download (0 for seeders)
    pub left: u64,
    /// Lifecycle event, omitted for regular announces
    pub event: Option<AnnounceEvent>,
}

/// Lifecycle events reported to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    /// First announce for this torrent
    Started,
    /// Download finished
    Completed,
    /// Client is leaving the swarm
    Stopped,
}

impl AnnounceEvent {
    /// Value of the `event` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            AnnounceEvent::Started => "started",
            AnnounceEvent::Completed => "completed",
            AnnounceEvent::Stopped => "stopped",
        }
    }
}

/// One peer returned by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// Absent when the tracker answered in compact form
    pub peer_id: Option<PeerId>,
    pub ip: String,
    pub port: u16,
}

/// Tracker announce response.
#[derive(Debug, Clone)]
pub struct AnnounceResponse {
    /// Seconds until the next regular announce
    pub interval: u32,
    /// Minimum allowed interval between announces
    pub min_interval: Option<u32>,
    /// Tracker-specific identifier for subsequent requests
    pub tracker_id: Option<String>,
    /// Number of seeders in the swarm
    pub complete: u32,
    /// Number of leechers in the swarm
    pub incomplete: u32,
    pub peers: Vec<PeerRecord>,
}

/// Cumulative transfer counters reported on every announce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferTotals {
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
}

/// Tracker communication interface.
///
/// Implementations handle transport details; the tracker actor only sees
/// requests, responses and classified errors.
#[async_trait]
pub trait TrackerClient: Send + Sync + 'static {
    /// Announces client presence to tracker and retrieves peer list.
    ///
    /// # Errors
    ///
    /// - `TorrentError::InvalidAnnounceUrl` - If the endpoint is malformed
    /// - `TorrentError::TrackerConnectionFailed` - If the tracker is unreachable
    /// - `TorrentError::ProtocolError` - If the response cannot be decoded
    async fn announce(&self, request: AnnounceRequest) -> Result<AnnounceResponse, TorrentError>;

    /// Returns tracker URL for logging purposes.
    fn tracker_url(&self) -> &str;
}

/// Owner of the peer set for one torrent.
///
/// Supplies the identity and counters the tracker actor reports, and
/// receives every peer list the tracker returns.
pub trait SwarmCoordinator: Send + Sync + 'static {
    fn peer_id(&self) -> PeerId;

    fn transfer_totals(&self) -> TransferTotals;

    /// Takes ownership of a freshly announced peer list.
    fn deliver_peers(&self, peers: Vec<PeerRecord>);
}
