//! BitTorrent data integrity and tracker communication

pub mod piece;
pub mod tracker;

use std::fmt;

pub use piece::{Piece, PieceError};
pub use tracker::{
    AnnounceEvent, AnnounceRequest, AnnounceResponse, Deputy, DeputyHandle, DeputyState,
    DeputyStatus, HttpTrackerClient, PeerRecord, SwarmCoordinator, TrackerClient, TransferTotals,
    spawn_deputy,
};

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary from a torrent file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// 20-byte identifier a client presents to trackers and peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId([u8; 20]);

impl PeerId {
    /// Creates peer ID from 20-byte array.
    pub fn new(id: [u8; 20]) -> Self {
        Self(id)
    }

    /// Builds a peer ID from a byte slice, if it is exactly 20 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 20]>::try_from(bytes).ok().map(Self)
    }

    /// Returns peer ID as byte array reference.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Generates a random peer ID carrying the Bitster client prefix.
    ///
    /// Swarm coordinators call this once per session and hand the result to
    /// the tracker deputy through `SwarmCoordinator::peer_id`.
    pub fn generate() -> Self {
        let mut id = [0u8; 20];
        id[..8].copy_from_slice(b"-BS0001-");
        for byte in &mut id[8..] {
            *byte = rand::random();
        }
        Self(id)
    }
}

/// Broad cause of a tracker-side fault.
///
/// The tracker actor reacts differently to each class: endpoint and decoding
/// faults are recorded, transport faults are retried after a delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Announce URL could not be built
    Endpoint,
    /// Tracker could not be reached or answered with an HTTP error
    Transport,
    /// Tracker answered with something we could not use
    Decoding,
}

/// Errors that can occur during torrent operations.
///
/// Covers tracker endpoint construction, communication and response decoding.
#[derive(Debug, thiserror::Error)]
pub enum TorrentError {
    #[error("Malformed announce URL {url}: {source}")]
    InvalidAnnounceUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Tracker connection failed: {url}")]
    TrackerConnectionFailed { url: String },

    #[error("Tracker request timed out: {url}")]
    TrackerTimeout { url: String },

    #[error("Tracker {url} returned HTTP status {status}")]
    TrackerServerError { url: String, status: u16 },

    #[error("Tracker rejected announce: {reason}")]
    TrackerRejected { reason: String },

    #[error("Protocol error: {message}")]
    ProtocolError { message: String },
}

impl TorrentError {
    /// Classifies a tracker fault so callers can decide whether to retry.
    pub fn fault_class(&self) -> FaultClass {
        match self {
            TorrentError::InvalidAnnounceUrl { .. } => FaultClass::Endpoint,
            TorrentError::TrackerConnectionFailed { .. }
            | TorrentError::TrackerTimeout { .. }
            | TorrentError::TrackerServerError { .. } => FaultClass::Transport,
            TorrentError::TrackerRejected { .. } | TorrentError::ProtocolError { .. } => {
                FaultClass::Decoding
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_hash_display() {
        let hash = [
            0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x01, 0x23, 0x45, 0x67, 0x89, 0xab,
            0xcd, 0xef, 0x01, 0x23, 0x45, 0x67,
        ];
        let info_hash = InfoHash::new(hash);
        assert_eq!(
            info_hash.to_string(),
            "0123456789abcdef0123456789abcdef01234567"
        );
    }

    #[test]
    fn test_peer_id_generate_has_client_prefix() {
        let id = PeerId::generate();
        assert_eq!(&id.as_bytes()[..8], b"-BS0001-");
    }

    #[test]
    fn test_peer_id_from_slice_requires_20_bytes() {
        assert!(PeerId::from_slice(&[7u8; 20]).is_some());
        assert!(PeerId::from_slice(&[7u8; 19]).is_none());
        assert!(PeerId::from_slice(&[7u8; 21]).is_none());
    }

    #[test]
    fn test_fault_classification() {
        let endpoint = TorrentError::InvalidAnnounceUrl {
            url: "nope".to_string(),
            source: url::ParseError::RelativeUrlWithoutBase,
        };
        assert_eq!(endpoint.fault_class(), FaultClass::Endpoint);

        let transport = TorrentError::TrackerServerError {
            url: "http://t/announce".to_string(),
            status: 503,
        };
        assert_eq!(transport.fault_class(), FaultClass::Transport);

        let decoding = TorrentError::TrackerRejected {
            reason: "unregistered torrent".to_string(),
        };
        assert_eq!(decoding.fault_class(), FaultClass::Decoding);
    }
}
