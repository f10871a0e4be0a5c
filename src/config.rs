use std::{path::PathBuf, time::Duration};

use crate::error::TelemetryError;

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;
pub const DEFAULT_INGEST_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_DUMP_PATH: &str = "hk-dump.bin";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Zero disables pruning.
    pub retention: Duration,
    pub enable_persistence: bool,
    pub dump_path: PathBuf,
    /// Zero disables autosave.
    pub autosave_interval: Duration,
    pub queue_capacity: usize,
    pub prune_interval: Duration,
    pub ingest_timeout: Duration,
}
impl TelemetryConfig {
    pub fn new() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
            enable_persistence: false,
            dump_path: PathBuf::from(DEFAULT_DUMP_PATH),
            autosave_interval: Duration::ZERO,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            prune_interval: DEFAULT_PRUNE_INTERVAL,
            ingest_timeout: DEFAULT_INGEST_TIMEOUT,
        }
    }

    /// Reads `HK_METRICS_RETENTION`, `HK_METRICS_AUTOSAVE` (humantime durations
    /// such as `30days` or `1h`) and `HK_METRICS_DUMP`, which also turns
    /// persistence on. Unset variables keep the defaults.
    pub fn from_env() -> Result<Self, TelemetryError> {
        let mut config = Self::new();
        if let Some(retention) = env_duration("HK_METRICS_RETENTION")? {
            config.retention = retention;
        }
        if let Ok(path) = std::env::var("HK_METRICS_DUMP") {
            config = config.with_persistence(path);
        }
        if let Some(autosave) = env_duration("HK_METRICS_AUTOSAVE")? {
            config.autosave_interval = autosave;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
    pub fn with_persistence(mut self, dump_path: impl Into<PathBuf>) -> Self {
        self.enable_persistence = true;
        self.dump_path = dump_path.into();
        self
    }
    pub fn with_autosave(mut self, interval: Duration) -> Self {
        self.autosave_interval = interval;
        self
    }
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
    pub fn with_prune_interval(mut self, interval: Duration) -> Self {
        self.prune_interval = interval;
        self
    }
    pub fn with_ingest_timeout(mut self, timeout: Duration) -> Self {
        self.ingest_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), TelemetryError> {
        if self.queue_capacity == 0 {
            return Err(TelemetryError::InvalidConfig("queue capacity must be positive"));
        }
        if self.ingest_timeout.is_zero() {
            return Err(TelemetryError::InvalidConfig("ingest timeout must be positive"));
        }
        if !self.retention.is_zero() && self.prune_interval.is_zero() {
            return Err(TelemetryError::InvalidConfig(
                "prune interval must be positive when retention is enabled",
            ));
        }
        if self.enable_persistence && self.dump_path.as_os_str().is_empty() {
            return Err(TelemetryError::InvalidConfig("dump path is empty"));
        }
        if !self.enable_persistence && !self.autosave_interval.is_zero() {
            return Err(TelemetryError::InvalidConfig("autosave requires persistence"));
        }
        Ok(())
    }
}
impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn env_duration(name: &'static str) -> Result<Option<Duration>, TelemetryError> {
    let Ok(value) = std::env::var(name) else {
        return Ok(None);
    };
    humantime::parse_duration(&value)
        .map(Some)
        .map_err(|_| TelemetryError::InvalidConfig(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TelemetryConfig::default();
        config.validate().unwrap();
        assert!(!config.enable_persistence);
        assert_eq!(config.retention, DEFAULT_RETENTION);
    }

    #[test]
    fn test_invalid_configs_fail_fast() {
        let bad = [
            TelemetryConfig::new().with_queue_capacity(0),
            TelemetryConfig::new().with_ingest_timeout(Duration::ZERO),
            TelemetryConfig::new().with_prune_interval(Duration::ZERO),
            TelemetryConfig::new().with_persistence(""),
            TelemetryConfig::new().with_autosave(Duration::from_secs(60)),
        ];
        for config in bad {
            assert!(matches!(
                config.validate(),
                Err(TelemetryError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_retention_disabled_allows_zero_prune_interval() {
        TelemetryConfig::new()
            .with_retention(Duration::ZERO)
            .with_prune_interval(Duration::ZERO)
            .validate()
            .unwrap();
    }

    #[test]
    fn test_humantime_durations() {
        assert_eq!(
            humantime::parse_duration("30days").unwrap(),
            DEFAULT_RETENTION
        );
    }
}
