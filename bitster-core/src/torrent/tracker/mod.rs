//! Tracker communication.
//!
//! HTTP announce client following BEP 3 and the deputy actor that keeps a
//! torrent announced on behalf of its swarm coordinator.

pub mod client;
pub mod deputy;
pub mod types;

pub use client::HttpTrackerClient;
pub use deputy::{Deputy, DeputyHandle, DeputyMemo, DeputyState, DeputyStatus, spawn_deputy};
pub use types::{
    AnnounceEvent, AnnounceRequest, AnnounceResponse, PeerRecord, SwarmCoordinator,
    TrackerClient, TransferTotals,
};
