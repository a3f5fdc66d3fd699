//! Aggregator configuration with sensible defaults.
//!
//! [`AggregatorConfig`] controls worker-pool size, per-source timeouts,
//! caching, rate limiting and fuzzy-match sensitivity. It deserializes
//! from a config file section with every field optional.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AggregateError;

/// Longest accepted rate-limit window: one day.
pub const MAX_RATE_LIMIT_WINDOW_SECONDS: u64 = 86_400;

/// Configuration shared by every request an [`crate::Aggregator`] handles.
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Maximum number of source fetches in flight at once.
    pub worker_pool_size: usize,
    /// Fetch timeout in seconds for plain HTTP sources.
    pub fetch_timeout_seconds: u64,
    /// Fetch timeout in seconds for browser-backed sources.
    pub browser_fetch_timeout_seconds: u64,
    /// How long to cache responses in seconds. Set to 0 to disable caching.
    pub cache_ttl_seconds: u64,
    /// Maximum number of cached responses.
    pub cache_capacity: u64,
    /// Requests admitted per client per window.
    pub rate_limit_requests: u32,
    /// Rate-limit window length in seconds.
    pub rate_limit_window_seconds: u64,
    /// Minimum title similarity for two listings to merge.
    pub fuzzy_threshold: f64,
    /// Listings kept from each source before normalisation.
    pub max_results_per_source: usize,
    /// Upper bound for a request's `per_page`.
    pub max_page_size: u32,
    /// Currency assumed when neither the price nor the source names one.
    pub default_currency: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 5,
            fetch_timeout_seconds: 5,
            browser_fetch_timeout_seconds: 30,
            cache_ttl_seconds: 300,
            cache_capacity: 100,
            rate_limit_requests: 10,
            rate_limit_window_seconds: 60,
            fuzzy_threshold: 0.85,
            max_results_per_source: 20,
            max_page_size: 100,
            default_currency: "INR".into(),
        }
    }
}

impl AggregatorConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `worker_pool_size`, both fetch timeouts, `rate_limit_requests`,
    ///   `rate_limit_window_seconds`, `max_results_per_source` and
    ///   `max_page_size` must be greater than 0
    /// - `rate_limit_window_seconds` must not exceed
    ///   [`MAX_RATE_LIMIT_WINDOW_SECONDS`]
    /// - `fuzzy_threshold` must lie in `(0, 1]`
    /// - `cache_capacity` must be greater than 0 when caching is enabled
    /// - `default_currency` must be a three-letter code
    pub fn validate(&self) -> Result<(), AggregateError> {
        if self.worker_pool_size == 0 {
            return Err(AggregateError::Config(
                "worker_pool_size must be greater than 0".into(),
            ));
        }
        if self.fetch_timeout_seconds == 0 || self.browser_fetch_timeout_seconds == 0 {
            return Err(AggregateError::Config(
                "fetch timeouts must be greater than 0".into(),
            ));
        }
        if self.rate_limit_requests == 0 || self.rate_limit_window_seconds == 0 {
            return Err(AggregateError::Config(
                "rate_limit_requests and rate_limit_window_seconds must be greater than 0".into(),
            ));
        }
        if self.rate_limit_window_seconds > MAX_RATE_LIMIT_WINDOW_SECONDS {
            return Err(AggregateError::Config(format!(
                "rate_limit_window_seconds must be at most {MAX_RATE_LIMIT_WINDOW_SECONDS}"
            )));
        }
        if !(self.fuzzy_threshold > 0.0 && self.fuzzy_threshold <= 1.0) {
            return Err(AggregateError::Config(
                "fuzzy_threshold must be in (0, 1]".into(),
            ));
        }
        if self.cache_ttl_seconds > 0 && self.cache_capacity == 0 {
            return Err(AggregateError::Config(
                "cache_capacity must be greater than 0 when caching is enabled".into(),
            ));
        }
        if self.max_results_per_source == 0 {
            return Err(AggregateError::Config(
                "max_results_per_source must be greater than 0".into(),
            ));
        }
        if self.max_page_size == 0 {
            return Err(AggregateError::Config(
                "max_page_size must be greater than 0".into(),
            ));
        }
        if self.default_currency.len() != 3
            || !self.default_currency.chars().all(|c| c.is_ascii_alphabetic())
        {
            return Err(AggregateError::Config(
                "default_currency must be a three-letter code".into(),
            ));
        }
        Ok(())
    }

    /// Timeout for plain HTTP sources.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    /// Timeout for browser-backed sources.
    pub fn browser_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.browser_fetch_timeout_seconds)
    }

    /// Cache entry lifetime.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Rate-limit window length.
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sensible_values() {
        let config = AggregatorConfig::default();
        assert_eq!(config.worker_pool_size, 5);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(5));
        assert_eq!(config.browser_fetch_timeout(), Duration::from_secs(30));
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.rate_limit_requests, 10);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(60));
        assert!((config.fuzzy_threshold - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.default_currency, "INR");
    }

    #[test]
    fn valid_config_passes_validation() {
        assert!(AggregatorConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_pool_rejected() {
        let config = AggregatorConfig {
            worker_pool_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("worker_pool_size"));
    }

    #[test]
    fn zero_timeout_rejected() {
        let config = AggregatorConfig {
            browser_fetch_timeout_seconds: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        for threshold in [0.0, -0.1, 1.01, f64::NAN] {
            let config = AggregatorConfig {
                fuzzy_threshold: threshold,
                ..Default::default()
            };
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("fuzzy_threshold"));
        }
    }

    #[test]
    fn zero_ttl_disables_cache_without_capacity() {
        let config = AggregatorConfig {
            cache_ttl_seconds: 0,
            cache_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_rate_limit_rejected() {
        let config = AggregatorConfig {
            rate_limit_requests: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn overlong_rate_limit_window_rejected() {
        let config = AggregatorConfig {
            rate_limit_window_seconds: u64::MAX,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rate_limit_window_seconds"));

        let day = AggregatorConfig {
            rate_limit_window_seconds: MAX_RATE_LIMIT_WINDOW_SECONDS,
            ..Default::default()
        };
        assert!(day.validate().is_ok());
    }

    #[test]
    fn bad_currency_rejected() {
        let config = AggregatorConfig {
            default_currency: "RUPEE".into(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("default_currency"));
    }

    #[test]
    fn deserializes_partial_section() {
        let config: AggregatorConfig =
            serde_json::from_str(r#"{"worker_pool_size": 8, "fuzzy_threshold": 0.9}"#)
                .expect("parse");
        assert_eq!(config.worker_pool_size, 8);
        assert!((config.fuzzy_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.cache_ttl_seconds, 300);
    }
}
