//! Centralized configuration for Bitster.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

/// Central configuration for all Bitster core components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct BitsterConfig {
    pub actor: ActorConfig,
    pub tracker: TrackerConfig,
}

/// Actor runtime configuration.
#[derive(Debug, Clone)]
pub struct ActorConfig {
    /// How long an idle actor waits for a new memo before idling again
    pub idle_interval: Duration,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(1),
        }
    }
}

/// Tracker communication configuration.
///
/// Controls HTTP timeouts, announce pacing and the retry delay used when
/// the tracker cannot be reached.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// HTTP request timeout for tracker communication
    pub tracker_timeout: Duration,
    /// Announce interval used until the tracker supplies its own
    pub default_announce_interval: Duration,
    /// Lower bound applied to tracker-supplied intervals
    pub min_announce_interval: Duration,
    /// Delay before retrying an announce that failed to connect
    pub retry_delay: Duration,
    /// User agent for HTTP requests
    pub user_agent: &'static str,
    /// Port we accept peer connections on
    pub listen_port: u16,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tracker_timeout: Duration::from_secs(30),
            default_announce_interval: Duration::from_secs(180), // 3 minutes
            min_announce_interval: Duration::from_secs(1),
            retry_delay: Duration::from_secs(60),
            user_agent: "bitster/0.1.0",
            listen_port: 6881,
        }
    }
}

impl BitsterConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(seconds) = env_u64("BITSTER_TRACKER_TIMEOUT") {
            config.tracker.tracker_timeout = Duration::from_secs(seconds);
        }

        if let Some(seconds) = env_u64("BITSTER_ANNOUNCE_INTERVAL") {
            config.tracker.default_announce_interval = Duration::from_secs(seconds);
        }

        if let Some(seconds) = env_u64("BITSTER_RETRY_DELAY") {
            config.tracker.retry_delay = Duration::from_secs(seconds);
        }

        if let Ok(port) = std::env::var("BITSTER_LISTEN_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.tracker.listen_port = port;
            }
        }

        if let Some(millis) = env_u64("BITSTER_IDLE_INTERVAL_MS") {
            config.actor.idle_interval = Duration::from_millis(millis);
        }

        config
    }

    /// Creates a configuration with short timings for tests.
    pub fn for_testing() -> Self {
        Self {
            actor: ActorConfig {
                idle_interval: Duration::from_millis(10),
            },
            tracker: TrackerConfig {
                tracker_timeout: Duration::from_secs(2),
                default_announce_interval: Duration::from_secs(60),
                min_announce_interval: Duration::from_millis(10),
                retry_delay: Duration::from_millis(50),
                ..TrackerConfig::default()
            },
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}
