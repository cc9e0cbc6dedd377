//! Configuration management for the bridge.

use std::env;

use crate::protocol::CloneStrategy;
use crate::worker::WorkerKind;

/// Bridge configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Where requests are executed
    pub worker: WorkerKind,
    /// Payload copy mode used by the storage adapter
    pub clone_strategy: CloneStrategy,
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    ///
    /// `TIDEPOOL_WORKER` selects `thread` or `inline`;
    /// `TIDEPOOL_CLONE_STRATEGY` selects `shallow`, `immutable` or `deep`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load a `.env` file if present, then read the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let worker = match lookup("TIDEPOOL_WORKER") {
            Some(value) => value.parse()?,
            None => WorkerKind::default(),
        };

        let clone_strategy = match lookup("TIDEPOOL_CLONE_STRATEGY") {
            Some(value) => value.parse()?,
            None => CloneStrategy::default(),
        };

        Ok(Self {
            worker,
            clone_strategy,
        })
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid TIDEPOOL_WORKER value: {0} (expected thread or inline)")]
    InvalidWorker(String),

    #[error("Invalid TIDEPOOL_CLONE_STRATEGY value: {0} (expected shallow, immutable or deep)")]
    InvalidCloneStrategy(String),
}
