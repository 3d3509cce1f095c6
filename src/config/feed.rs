use std::time::Duration;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub multiplier: f64,
    /// Symmetric jitter as a fraction of the computed delay.
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            initial_ms: 1_000,
            max_ms: 60_000,
            multiplier: 2.0,
            jitter: 0.2,
        }
    }
}

/// Push feed (primary source) connection settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub url: String,
    pub api_key: String,
    pub max_symbols: usize,
    pub connect_timeout_ms: u64,
    pub auth_timeout_ms: u64,
    /// Open connection with no inbound message for this long is treated as dead.
    pub silence_timeout_ms: u64,
    pub backoff: BackoffConfig,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        StreamingConfig {
            url: "ws://127.0.0.1:9001/stream".to_string(),
            api_key: String::new(),
            max_symbols: 50,
            connect_timeout_ms: 10_000,
            auth_timeout_ms: 5_000,
            silence_timeout_ms: 10_000,
            backoff: BackoffConfig::default(),
        }
    }
}

impl StreamingConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn silence_timeout(&self) -> Duration {
        Duration::from_millis(self.silence_timeout_ms)
    }
}

/// Pull feed (secondary source) settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub interval_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        PollingConfig {
            url: "http://127.0.0.1:9002/quotes".to_string(),
            api_key: None,
            interval_ms: 5_000,
            request_timeout_ms: 4_000,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
