//! Configuration for the tile scheduler.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use waterfall_common::{SchedulerError, SchedulerResult};

/// Configuration for the tile scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of generator slots, and of worker threads.
    pub max_generators: usize,

    /// Longest the dispatcher sleeps between sweeps without a wake signal.
    pub wake_interval_ms: u64,

    /// Longest a calibration change waits for busy slots to drain.
    pub barrier_timeout_ms: u64,

    /// Poll interval while waiting at the barrier.
    pub barrier_poll_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_generators: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            wake_interval_ms: 250,
            barrier_timeout_ms: 5_000,
            barrier_poll_ms: 5,
        }
    }
}

impl SchedulerConfig {
    /// Defaults with an explicit slot count.
    pub fn with_generators(max_generators: usize) -> Self {
        Self {
            max_generators,
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TILE_MAX_GENERATORS") {
            if let Ok(n) = val.parse() {
                config.max_generators = n;
            }
        }

        if let Ok(val) = std::env::var("TILE_WAKE_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                config.wake_interval_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("TILE_BARRIER_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                config.barrier_timeout_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("TILE_BARRIER_POLL_MS") {
            if let Ok(ms) = val.parse() {
                config.barrier_poll_ms = ms;
            }
        }

        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.max_generators == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_generators must be > 0".to_string(),
            ));
        }

        if self.max_generators > 256 {
            return Err(SchedulerError::InvalidConfig(
                "max_generators must be <= 256".to_string(),
            ));
        }

        if self.wake_interval_ms == 0 {
            return Err(SchedulerError::InvalidConfig(
                "wake_interval_ms must be > 0".to_string(),
            ));
        }

        if self.barrier_poll_ms == 0 || self.barrier_poll_ms > self.barrier_timeout_ms {
            return Err(SchedulerError::InvalidConfig(
                "barrier_poll_ms must be > 0 and <= barrier_timeout_ms".to_string(),
            ));
        }

        Ok(())
    }

    pub fn wake_interval(&self) -> Duration {
        Duration::from_millis(self.wake_interval_ms)
    }

    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.barrier_timeout_ms)
    }

    pub fn barrier_poll(&self) -> Duration {
        Duration::from_millis(self.barrier_poll_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.wake_interval(), Duration::from_millis(250));
        assert_eq!(config.barrier_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_zero_generators() {
        let config = SchedulerConfig::with_generators(0);
        assert!(matches!(
            config.validate(),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_poll() {
        let config = SchedulerConfig {
            barrier_timeout_ms: 10,
            barrier_poll_ms: 20,
            ..SchedulerConfig::with_generators(2)
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"max_generators": 3}"#).unwrap();
        assert_eq!(config.max_generators, 3);
        assert_eq!(config.wake_interval_ms, 250);
    }
}
