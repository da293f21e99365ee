// ── Runtime pool configuration ──
//
// Describes *which* pool to follow and how often. Never touches disk:
// the CLI loads a profile and hands a `PoolConfig` in.

use std::time::Duration;

/// Default period of the background refresher.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_millis(3000);

/// Default upper bound for one remote command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for following a single pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Pool identity name, used in logs and errors.
    pub name: String,
    /// Remote address of the pool device.
    pub address: String,
    /// Period of the background refresher. Zero disables it.
    pub refresh_interval: Duration,
    /// Fetch class metadata, controller properties and group settings
    /// after every bootstrap.
    pub fetch_metadata: bool,
    /// Upper bound for one remote command.
    pub command_timeout: Duration,
}

impl PoolConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            ..Self::default()
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "pool".into(),
            address: String::new(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            fetch_metadata: true,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}
