use std::time::Duration;
use serde::{Deserialize, Serialize};

pub mod feed;
pub mod failover;
pub mod loader;

pub use feed::{BackoffConfig, PollingConfig, StreamingConfig};
pub use failover::{FailoverConfig, HealthConfig, ValidationConfig};
pub use loader::AppConfig;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub json_logs: bool,
    /// HS256 secret for `/admin/*` bearer tokens. Admin routes are open when unset.
    pub admin_jwt_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: "0.0.0.0:8080".to_string(),
            json_logs: false,
            admin_jwt_secret: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SymbolsConfig {
    pub venue: String,
    /// Used by the static catalog when no external catalog is wired in.
    pub tracked: Vec<String>,
    pub refresh_interval_ms: u64,
}

impl Default for SymbolsConfig {
    fn default() -> Self {
        SymbolsConfig {
            venue: "NASDAQ".to_string(),
            tracked: vec!["AAPL".to_string(), "MSFT".to_string()],
            refresh_interval_ms: 300_000,
        }
    }
}

impl SymbolsConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// Per-subscriber buffer; a subscriber lagging further loses the oldest ticks.
    pub subscriber_buffer: usize,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        DistributionConfig {
            subscriber_buffer: 1_024,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub event_channel_capacity: usize,
    pub control_channel_capacity: usize,
    pub shutdown_grace_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            event_channel_capacity: 10_000,
            control_channel_capacity: 16,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl RuntimeConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
