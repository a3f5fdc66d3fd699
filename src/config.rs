//! Host configuration loaded from a TOML file.
//!
//! ```toml
//! [aggregator]
//! worker_pool_size = 5
//! cache_ttl_seconds = 300
//!
//! [logging]
//! filter = "pricewise=debug"
//! json = false
//!
//! [[sources]]
//! id = "amazon"
//! name = "Amazon India"
//! domains = ["amazon.in"]
//! fixture = "fixtures/amazon.json"
//! ```
//!
//! Every section and field is optional. Durations are in seconds.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use pricewise_aggregate::AggregatorConfig;
use serde::{Deserialize, Serialize};

use crate::error::{PricewiseError, Result};

/// Default log filter when neither `RUST_LOG` nor the config file sets one.
pub const DEFAULT_LOG_FILTER: &str = "pricewise=info,pricewise_aggregate=info";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricewiseConfig {
    /// Engine tuning.
    pub aggregator: AggregatorConfig,
    /// Log output.
    pub logging: LoggingConfig,
    /// Registered sources, in dispatch order.
    pub sources: Vec<SourceConfig>,
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive. `RUST_LOG` takes precedence.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.into(),
            json: false,
        }
    }
}

/// Simulated failure for a fixture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Answer as if the site never responded.
    Timeout,
    /// Answer as if the site served a captcha or a 403.
    Blocked,
    /// Answer as if the page layout could not be parsed.
    ParseError,
    /// Answer as if the connection failed.
    NetworkError,
}

/// One fixture-backed source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Stable source identifier.
    pub id: String,
    /// Display name; defaults to the id.
    pub name: Option<String>,
    /// Domains whose product URLs this source handles.
    pub domains: Vec<String>,
    /// Scale of bare rating numbers from this source.
    pub rating_scale: f64,
    /// Currency assumed for this source's prices.
    pub default_currency: Option<String>,
    /// Whether the source stands in for a browser-backed scraper.
    pub browser: bool,
    /// JSON file of raw listings. Relative paths resolve against the
    /// config file's directory.
    pub fixture: PathBuf,
    /// Artificial latency before answering, in milliseconds.
    pub latency_ms: u64,
    /// Fail every fetch with this error instead of answering.
    pub fail: Option<FailureMode>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: None,
            domains: Vec::new(),
            rating_scale: 5.0,
            default_currency: None,
            browser: false,
            fixture: PathBuf::new(),
            latency_ms: 0,
            fail: None,
        }
    }
}

impl PricewiseConfig {
    /// Load configuration from a TOML file.
    ///
    /// Relative fixture paths are resolved against the file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self =
            toml::from_str(&content).map_err(|e| PricewiseError::Config(e.to_string()))?;
        if let Some(base) = path.parent() {
            for source in &mut config.sources {
                if source.fixture.is_relative() && !source.fixture.as_os_str().is_empty() {
                    source.fixture = base.join(&source.fixture);
                }
            }
        }
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PricewiseError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/pricewise/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("pricewise").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("pricewise")
                .join("config.toml")
        } else {
            PathBuf::from("/tmp/pricewise-config/config.toml")
        }
    }

    /// Check the engine settings and the source list.
    ///
    /// # Errors
    ///
    /// Returns [`PricewiseError::Config`] for an invalid engine setting, a
    /// source without an id or fixture, or a duplicate source id.
    pub fn validate(&self) -> Result<()> {
        self.aggregator
            .validate()
            .map_err(|e| PricewiseError::Config(e.to_string()))?;

        let mut seen = HashSet::new();
        for source in &self.sources {
            let id = source.id.trim().to_lowercase();
            if id.is_empty() {
                return Err(PricewiseError::Config("source id must not be empty".into()));
            }
            if source.fixture.as_os_str().is_empty() {
                return Err(PricewiseError::Config(format!(
                    "source {id} has no fixture file"
                )));
            }
            if !(source.rating_scale > 0.0) {
                return Err(PricewiseError::Config(format!(
                    "source {id} rating_scale must be positive"
                )));
            }
            if !seen.insert(id.clone()) {
                return Err(PricewiseError::Config(format!("duplicate source {id}")));
            }
        }
        Ok(())
    }
}
