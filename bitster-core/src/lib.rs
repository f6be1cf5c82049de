//! Bitster Core - BitTorrent client building blocks
//!
//! This crate provides the pieces a BitTorrent client is assembled from:
//! message-driven actors, a readiness reactor for peer sockets, piece
//! assembly with SHA-1 verification, and the tracker actor that keeps a
//! torrent announced.

pub mod actor;
pub mod config;
pub mod reactor;
pub mod torrent;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use actor::{Actor, ActorError, ActorHandle};
pub use config::BitsterConfig;
pub use reactor::{ChannelKind, Communicator, Reactor};
pub use torrent::{InfoHash, PeerId, Piece, PieceError, TorrentError};

/// Core errors that can bubble up from any Bitster subsystem.
#[derive(Debug, thiserror::Error)]
pub enum BitsterError {
    #[error("Torrent error: {0}")]
    Torrent(#[from] TorrentError),

    #[error("Piece error: {0}")]
    Piece(#[from] PieceError),

    #[error("Actor error: {0}")]
    Actor(#[from] ActorError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BitsterError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            BitsterError::Torrent(e) => match e {
                TorrentError::TrackerConnectionFailed { url } => {
                    format!("Could not connect to tracker: {url}")
                }
                TorrentError::TrackerRejected { reason } => {
                    format!("Tracker refused the torrent: {reason}")
                }
                _ => "Tracker error occurred".to_string(),
            },
            BitsterError::Piece(_) => "Invalid piece data".to_string(),
            BitsterError::Actor(_) => "Component has stopped".to_string(),
            BitsterError::Io(_) => "Network error occurred".to_string(),
        }
    }

    /// Checks if this error was caused by invalid caller input.
    pub fn is_user_error(&self) -> bool {
        match self {
            BitsterError::Piece(e) => e.is_invalid_argument(),
            BitsterError::Torrent(TorrentError::InvalidAnnounceUrl { .. }) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BitsterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let err = BitsterError::from(TorrentError::TrackerRejected {
            reason: "unregistered torrent".to_string(),
        });
        assert_eq!(
            err.user_message(),
            "Tracker refused the torrent: unregistered torrent"
        );
        assert!(!err.is_user_error());

        let err = BitsterError::from(ActorError::Stopped);
        assert_eq!(err.user_message(), "Component has stopped");
    }

    #[test]
    fn test_invalid_piece_input_is_user_error() {
        let err = BitsterError::from(PieceError::EmptyRequest);
        assert!(err.is_user_error());

        let err = BitsterError::from(PieceError::NotFinished { piece: 3 });
        assert!(!err.is_user_error());
    }
}
