//! Runtime configuration for a [`Domain`](crate::Domain).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for one domain node.
///
/// Every field has a default, so a config file only needs the values it changes:
///
/// ```json
/// { "node_id": "node-a", "snapshot_interval": 10 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainConfig {
    /// Node identifier published to the cluster layer. A UUID is minted when absent.
    pub node_id: Option<String>,

    /// Backoff between checks of a held actor lock.
    pub lock_poll_interval_ms: u64,

    /// Lifetime of a lock taken without an explicit timeout.
    pub lock_timeout_ms: u64,

    /// Number of events folded past the last snapshot before a new one is written.
    pub snapshot_interval: u64,

    /// Capacity of each repository's notification channel.
    pub notification_capacity: usize,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            lock_poll_interval_ms: 2_000,
            lock_timeout_ms: 10_000,
            snapshot_interval: 50,
            notification_capacity: 256,
        }
    }
}

impl DomainConfig {
    /// Loads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
