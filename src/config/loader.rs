use crate::config::*;
use crate::error::{Error, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub streaming: StreamingConfig,
    pub polling: PollingConfig,
    pub health: HealthConfig,
    pub validation: ValidationConfig,
    pub failover: FailoverConfig,
    pub distribution: DistributionConfig,
    pub symbols: SymbolsConfig,
    pub runtime: RuntimeConfig,
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("PRICERELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let app: AppConfig = config.try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        app.validate()?;
        Ok(app)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let app: AppConfig = toml::from_str(raw)
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        fn non_zero(value: u64, name: &str) -> Result<()> {
            if value == 0 {
                return Err(Error::ConfigError(format!("{} must be greater than zero", name)));
            }
            Ok(())
        }

        if self.streaming.url.trim().is_empty() {
            return Err(Error::ConfigError("streaming.url is empty".to_string()));
        }
        if self.polling.url.trim().is_empty() {
            return Err(Error::ConfigError("polling.url is empty".to_string()));
        }
        if self.server.admin_jwt_secret.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(Error::ConfigError("server.admin_jwt_secret is set but empty".to_string()));
        }
        if self.streaming.max_symbols == 0 {
            return Err(Error::ConfigError("streaming.max_symbols must be greater than zero".to_string()));
        }

        non_zero(self.streaming.connect_timeout_ms, "streaming.connect_timeout_ms")?;
        non_zero(self.streaming.auth_timeout_ms, "streaming.auth_timeout_ms")?;
        non_zero(self.streaming.silence_timeout_ms, "streaming.silence_timeout_ms")?;
        non_zero(self.streaming.backoff.initial_ms, "streaming.backoff.initial_ms")?;
        non_zero(self.polling.interval_ms, "polling.interval_ms")?;
        non_zero(self.polling.request_timeout_ms, "polling.request_timeout_ms")?;
        non_zero(self.failover.evaluation_interval_ms, "failover.evaluation_interval_ms")?;
        non_zero(self.symbols.refresh_interval_ms, "symbols.refresh_interval_ms")?;

        let backoff = &self.streaming.backoff;
        if backoff.initial_ms > backoff.max_ms {
            return Err(Error::ConfigError(format!(
                "streaming.backoff.initial_ms ({}) exceeds max_ms ({})",
                backoff.initial_ms, backoff.max_ms
            )));
        }
        if backoff.multiplier < 1.0 {
            return Err(Error::ConfigError("streaming.backoff.multiplier must be >= 1".to_string()));
        }
        if !(0.0..1.0).contains(&backoff.jitter) {
            return Err(Error::ConfigError("streaming.backoff.jitter must be in [0, 1)".to_string()));
        }

        if self.failover.failure_threshold == 0 || self.health.unhealthy_after_failures == 0 {
            return Err(Error::ConfigError("failure thresholds must be greater than zero".to_string()));
        }

        let v = &self.validation;
        if v.circuit_breaker_pct <= 0.0 || v.divergence_warn_pct <= 0.0 {
            return Err(Error::ConfigError("validation percentages must be positive".to_string()));
        }

        if self.distribution.subscriber_buffer == 0 || self.runtime.event_channel_capacity == 0 {
            return Err(Error::ConfigError("buffer sizes must be greater than zero".to_string()));
        }
        if self.runtime.control_channel_capacity == 0 {
            return Err(Error::ConfigError("runtime.control_channel_capacity must be greater than zero".to_string()));
        }

        Ok(())
    }
}
