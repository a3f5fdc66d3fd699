//! Fixture-backed scraper capabilities.
//!
//! A [`FixtureScraper`] answers from a JSON file of raw listings instead of
//! a live site, so the whole aggregation pipeline can run offline. Query
//! fetches return every listing whose title contains all query words; URL
//! fetches return the listings recorded under that exact URL. Latency and
//! failures can be simulated per source.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pricewise_aggregate::{
    FetchTarget, RawListing, Registry, ScrapeError, ScraperCapability, SourceDescriptor,
};

use crate::config::{FailureMode, SourceConfig};
use crate::error::{PricewiseError, Result};

/// A scraper capability that serves canned listings.
#[derive(Debug)]
pub struct FixtureScraper {
    descriptor: SourceDescriptor,
    listings: Vec<RawListing>,
    latency: Duration,
    fail: Option<FailureMode>,
}

impl FixtureScraper {
    /// Serve `listings` as `descriptor`.
    pub fn new(descriptor: SourceDescriptor, listings: Vec<RawListing>) -> Self {
        Self {
            descriptor,
            listings,
            latency: Duration::ZERO,
            fail: None,
        }
    }

    /// Delay every fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every fetch with `mode`.
    pub fn failing(mut self, mode: FailureMode) -> Self {
        self.fail = Some(mode);
        self
    }

    /// Build a scraper from its config entry, reading the fixture file.
    ///
    /// # Errors
    ///
    /// Returns [`PricewiseError::Fixture`] if the file is unreadable or is
    /// not a JSON array of listings.
    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        let mut descriptor = SourceDescriptor::new(
            &config.id,
            config.name.clone().unwrap_or_else(|| config.id.clone()),
        )
        .with_domains(config.domains.iter().cloned())
        .with_rating_scale(config.rating_scale);
        if let Some(currency) = &config.default_currency {
            descriptor = descriptor.with_default_currency(currency.clone());
        }
        if config.browser {
            descriptor = descriptor.browser_backed();
        }

        let listings = load_listings(&config.fixture)?;
        tracing::debug!(source = %descriptor.id, count = listings.len(), "loaded fixture");

        let mut scraper = Self::new(descriptor, listings)
            .with_latency(Duration::from_millis(config.latency_ms));
        if let Some(mode) = config.fail {
            scraper = scraper.failing(mode);
        }
        Ok(scraper)
    }

    fn matching(&self, target: &FetchTarget) -> Vec<RawListing> {
        match target {
            FetchTarget::Query(query) => {
                let words: Vec<String> =
                    query.split_whitespace().map(str::to_lowercase).collect();
                self.listings
                    .iter()
                    .filter(|listing| {
                        let title = listing.title.to_lowercase();
                        words.iter().all(|w| title.contains(w.as_str()))
                    })
                    .cloned()
                    .collect()
            }
            FetchTarget::Url(url) => {
                let wanted = url.as_str().trim_end_matches('/');
                self.listings
                    .iter()
                    .filter(|listing| listing.url.trim().trim_end_matches('/') == wanted)
                    .cloned()
                    .collect()
            }
        }
    }
}

#[async_trait]
impl ScraperCapability for FixtureScraper {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn fetch(&self, target: &FetchTarget) -> std::result::Result<Vec<RawListing>, ScrapeError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let source = &self.descriptor.id;
        match self.fail {
            Some(FailureMode::Timeout) => {
                return Err(ScrapeError::Timeout(format!("{source} did not respond")));
            }
            Some(FailureMode::Blocked) => {
                return Err(ScrapeError::Blocked(format!("{source} served a captcha")));
            }
            Some(FailureMode::ParseError) => {
                return Err(ScrapeError::Parse(format!("{source} page layout not recognised")));
            }
            Some(FailureMode::NetworkError) => {
                return Err(ScrapeError::Network(format!("connection to {source} reset")));
            }
            None => {}
        }

        let listings = self.matching(target);
        if listings.is_empty() {
            if let FetchTarget::Url(url) = target {
                return Err(ScrapeError::Parse(format!("no product found at {url}")));
            }
        }
        Ok(listings)
    }
}

/// Read a JSON array of raw listings.
///
/// # Errors
///
/// Returns [`PricewiseError::Fixture`] naming the file on any failure.
pub fn load_listings(path: &Path) -> Result<Vec<RawListing>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PricewiseError::Fixture(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| PricewiseError::Fixture(format!("{}: {e}", path.display())))
}

/// Build a registry with one fixture scraper per configured source, in
/// config order.
///
/// # Errors
///
/// Returns an error if a fixture cannot be loaded or two sources share an id.
pub fn build_registry(sources: &[SourceConfig]) -> Result<Registry> {
    let mut registry = Registry::new();
    for source in sources {
        registry.register(Arc::new(FixtureScraper::from_config(source)?))?;
    }
    Ok(registry)
}
