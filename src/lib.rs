//! # pricewise
//!
//! Host for the [`pricewise_aggregate`] engine: TOML configuration, logging
//! bootstrap and fixture-backed sources, plus the `pricewise` CLI.
//!
//! ```no_run
//! # async fn example() -> pricewise::Result<()> {
//! let config = pricewise::PricewiseConfig::from_file("pricewise.toml".as_ref())?;
//! let aggregator = pricewise::build_aggregator(&config)?;
//! let response = aggregator
//!     .search("cli", pricewise_aggregate::SearchRequest::new("wireless mouse"))
//!     .await?;
//! println!("{} products", response.pagination.total);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fixtures;
pub mod logging;

pub use config::{FailureMode, LoggingConfig, PricewiseConfig, SourceConfig};
pub use error::{PricewiseError, Result};
pub use fixtures::FixtureScraper;

use pricewise_aggregate::Aggregator;

/// Validate `config` and build an aggregator over its fixture sources.
///
/// # Errors
///
/// Returns an error if the config is invalid, a fixture cannot be loaded,
/// or no source is configured.
pub fn build_aggregator(config: &PricewiseConfig) -> Result<Aggregator> {
    config.validate()?;
    let registry = fixtures::build_registry(&config.sources)?;
    Ok(Aggregator::new(config.aggregator.clone(), registry)?)
}
