//! Data source configuration.
//!
//! All values are fixed for the lifetime of a source. Durations serialize as
//! integer milliseconds so the same object can come from JSON or JavaScript.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GridWindowError, Result};

pub const DEFAULT_BLOCK_SIZE: u64 = 100;
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 2;
pub const DEFAULT_CACHE_BLOCK_COUNT: usize = 20;
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Static configuration of a [`WindowedDataSource`](crate::WindowedDataSource).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct DataSourceConfig {
    /// Rows per block; the unit of fetch and cache
    pub block_size: u64,
    /// Fetches allowed to run at once
    pub max_concurrent_requests: usize,
    /// Blocks kept in the cache before the oldest are evicted
    pub cache_block_count: usize,
    /// Age after which a cached block counts as absent
    #[serde(with = "millis")]
    pub cache_timeout: Duration,
    /// Upper bound on one fetcher call before it is recorded as failed
    #[serde(with = "millis")]
    pub fetch_timeout: Duration,
    /// Queue the blocks either side of each requested window
    pub prefetch: bool,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            cache_block_count: DEFAULT_CACHE_BLOCK_COUNT,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            prefetch: true,
        }
    }
}

impl DataSourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    #[must_use]
    pub fn with_max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = max;
        self
    }

    #[must_use]
    pub fn with_cache_block_count(mut self, count: usize) -> Self {
        self.cache_block_count = count;
        self
    }

    #[must_use]
    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Reject values the data source cannot work with.
    ///
    /// # Errors
    /// Returns [`GridWindowError::InvalidConfig`] if a size or count is zero.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(GridWindowError::InvalidConfig(
                "blockSize must be at least 1".into(),
            ));
        }
        if self.max_concurrent_requests == 0 {
            return Err(GridWindowError::InvalidConfig(
                "maxConcurrentRequests must be at least 1".into(),
            ));
        }
        if self.cache_block_count == 0 {
            return Err(GridWindowError::InvalidConfig(
                "cacheBlockCount must be at least 1".into(),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(GridWindowError::InvalidConfig(
                "fetchTimeout must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON object. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns an error if the JSON is malformed or a value is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(super::duration_ms(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DataSourceConfig::default();
        assert_eq!(config.block_size, 100);
        assert_eq!(config.max_concurrent_requests, 2);
        assert_eq!(config.cache_block_count, 20);
        assert_eq!(duration_ms(config.cache_timeout), 300_000);
        assert!(config.prefetch);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            DataSourceConfig::from_json(r#"{"blockSize":50,"cacheTimeout":5000}"#).unwrap();
        assert_eq!(config.block_size, 50);
        assert_eq!(config.cache_timeout, Duration::from_millis(5000));
        assert_eq!(config.cache_block_count, DEFAULT_CACHE_BLOCK_COUNT);
    }

    #[test]
    fn test_rejects_zero_values() {
        assert!(DataSourceConfig::new().with_block_size(0).validate().is_err());
        assert!(DataSourceConfig::new()
            .with_max_concurrent_requests(0)
            .validate()
            .is_err());
        assert!(DataSourceConfig::new()
            .with_cache_block_count(0)
            .validate()
            .is_err());
        assert!(DataSourceConfig::from_json(r#"{"fetchTimeout":0}"#).is_err());
    }

    #[test]
    fn test_json_roundtrip_uses_millis() {
        let config = DataSourceConfig::new().with_fetch_timeout(Duration::from_millis(1500));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["fetchTimeout"], 1500);
        assert_eq!(json["maxConcurrentRequests"], 2);
    }
}
