//! # Configuration
//!
//! Environment-aware configuration for the dispatch core: match
//! strategies, worker pool sizing, and tracking-write retry settings.
//! Defaults work out of the box; values can come from a TOML file or
//! from `COURIER_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CourierError, Result};
use crate::model::{ChannelMatchStrategy, TypeMatchStrategy};
use crate::postal::tracking::TrackingRetrySettings;

/// Dispatch comparison strategies.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub channel_match_strategy: ChannelMatchStrategy,
    pub type_match_strategy: TypeMatchStrategy,
}

/// Worker pool sizing and polling cadence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    /// Stop accepting work after this long; `None` runs until shutdown.
    pub time_to_live_ms: Option<u64>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: crate::constants::DEFAULT_WORKER_CONCURRENCY,
            poll_interval_ms: crate::constants::DEFAULT_POLL_INTERVAL_MS,
            time_to_live_ms: None,
        }
    }
}

/// Bounded backoff for tracking writes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingRetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for TrackingRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: crate::constants::DEFAULT_TRACKING_RETRY_ATTEMPTS,
            base_delay_ms: crate::constants::DEFAULT_TRACKING_RETRY_BASE_DELAY_MS,
        }
    }
}

impl From<TrackingRetryConfig> for TrackingRetrySettings {
    fn from(config: TrackingRetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

/// Top-level configuration for the dispatch core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub dispatch: DispatchSettings,
    pub worker: WorkerSettings,
    pub tracking_retry: TrackingRetryConfig,
}

impl CourierConfig {
    /// Load from a TOML file, falling back to defaults for absent keys.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .map_err(|err| CourierError::Configuration(err.to_string()))?;
        settings
            .try_deserialize()
            .map_err(|err| CourierError::Configuration(err.to_string()))
    }

    /// Defaults overridden by `COURIER_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(concurrency) = std::env::var("COURIER_WORKER_CONCURRENCY") {
            config.worker.concurrency = concurrency.parse().map_err(|err| {
                CourierError::Configuration(format!("Invalid worker concurrency: {err}"))
            })?;
        }
        if let Ok(poll) = std::env::var("COURIER_POLL_INTERVAL_MS") {
            config.worker.poll_interval_ms = poll.parse().map_err(|err| {
                CourierError::Configuration(format!("Invalid poll interval: {err}"))
            })?;
        }
        if let Ok(attempts) = std::env::var("COURIER_TRACKING_RETRY_ATTEMPTS") {
            config.tracking_retry.max_attempts = attempts.parse().map_err(|err| {
                CourierError::Configuration(format!("Invalid tracking retry attempts: {err}"))
            })?;
        }
        if let Ok(delay) = std::env::var("COURIER_TRACKING_RETRY_BASE_DELAY_MS") {
            config.tracking_retry.base_delay_ms = delay.parse().map_err(|err| {
                CourierError::Configuration(format!("Invalid tracking retry base delay: {err}"))
            })?;
        }

        Ok(config)
    }

    /// Worker poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker.poll_interval_ms)
    }

    /// Worker time-to-live as a [`Duration`], if configured.
    pub fn time_to_live(&self) -> Option<Duration> {
        self.worker.time_to_live_ms.map(Duration::from_millis)
    }
}
