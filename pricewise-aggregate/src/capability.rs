//! Trait definition for pluggable source scrapers.
//!
//! Each e-commerce source implements [`ScraperCapability`] to provide a
//! uniform interface for fetching listings by search query or by product
//! URL. Fetching and HTML parsing are the implementor's business; the
//! aggregator only sees [`RawListing`] values or a typed [`ScrapeError`].

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

use crate::types::{RawListing, SourceErrorKind, SourceId};

/// What a capability is asked to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTarget {
    /// Search the source for a free-text query.
    Query(String),
    /// Scrape one product page.
    Url(Url),
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query(q) => write!(f, "query {q:?}"),
            Self::Url(u) => write!(f, "url {u}"),
        }
    }
}

/// Errors a scraper capability may return.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScrapeError {
    /// The source did not answer in time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The source rejected the request (captcha, 403, bot wall).
    #[error("blocked: {0}")]
    Blocked(String),

    /// The page was fetched but listings could not be extracted.
    #[error("parse error: {0}")]
    Parse(String),

    /// Connection, DNS or HTTP-status failure.
    #[error("network error: {0}")]
    Network(String),
}

impl ScrapeError {
    /// The reporting category for this error.
    pub fn kind(&self) -> SourceErrorKind {
        match self {
            Self::Timeout(_) => SourceErrorKind::Timeout,
            Self::Blocked(_) => SourceErrorKind::Blocked,
            Self::Parse(_) => SourceErrorKind::ParseError,
            Self::Network(_) => SourceErrorKind::NetworkError,
        }
    }
}

/// Static metadata describing one source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceDescriptor {
    /// Registry key, e.g. `amazon`.
    pub id: SourceId,
    /// Display name, e.g. `Amazon`.
    pub name: String,
    /// Hostnames (or host suffixes) whose product URLs this source scrapes.
    pub domains: Vec<String>,
    /// Maximum of the source's native rating scale (5 or 10 typically).
    pub rating_scale: f64,
    /// Currency assumed when a price carries no symbol or code.
    pub default_currency: Option<String>,
    /// Whether fetching drives a headless browser (and so gets the
    /// longer timeout).
    pub browser: bool,
}

impl SourceDescriptor {
    /// Descriptor with a 5-point rating scale, no domains and no
    /// currency override.
    pub fn new(id: impl AsRef<str>, name: impl Into<String>) -> Self {
        Self {
            id: SourceId::new(id),
            name: name.into(),
            domains: Vec::new(),
            rating_scale: 5.0,
            default_currency: None,
            browser: false,
        }
    }

    /// Set the product-URL domains.
    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = domains
            .into_iter()
            .map(|d| d.into().to_lowercase())
            .collect();
        self
    }

    /// Set the native rating scale maximum.
    pub fn with_rating_scale(mut self, scale: f64) -> Self {
        self.rating_scale = scale;
        self
    }

    /// Set the fallback currency code.
    pub fn with_default_currency(mut self, currency: impl Into<String>) -> Self {
        self.default_currency = Some(currency.into().to_uppercase());
        self
    }

    /// Mark the source as browser-backed.
    pub fn browser_backed(mut self) -> Self {
        self.browser = true;
        self
    }

    /// Whether `host` is one of this source's domains or a subdomain of one.
    pub fn handles_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        self.domains
            .iter()
            .any(|d| host == *d || host.ends_with(&format!(".{d}")))
    }
}

/// A pluggable source scraper.
///
/// Implementors must be `Send + Sync`; the aggregator shares them across
/// concurrently running requests behind an `Arc` and never mutates them.
#[async_trait]
pub trait ScraperCapability: Send + Sync {
    /// Static metadata for this source.
    fn descriptor(&self) -> &SourceDescriptor;

    /// Fetch raw listings for a query or product URL.
    ///
    /// # Errors
    ///
    /// Returns a [`ScrapeError`] whose variant tells the aggregator how
    /// to report the failure.
    async fn fetch(&self, target: &FetchTarget) -> Result<Vec<RawListing>, ScrapeError>;

    /// Shorthand for `descriptor().id`.
    fn id(&self) -> &SourceId {
        &self.descriptor().id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockScraper {
        descriptor: SourceDescriptor,
        listings: Vec<RawListing>,
    }

    #[async_trait]
    impl ScraperCapability for MockScraper {
        fn descriptor(&self) -> &SourceDescriptor {
            &self.descriptor
        }

        async fn fetch(&self, _target: &FetchTarget) -> Result<Vec<RawListing>, ScrapeError> {
            if self.listings.is_empty() {
                return Err(ScrapeError::Blocked("mock captcha".into()));
            }
            Ok(self.listings.clone())
        }
    }

    #[test]
    fn capability_is_object_safe_and_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn ScraperCapability>();
    }

    #[tokio::test]
    async fn mock_scraper_returns_listings() {
        let scraper = MockScraper {
            descriptor: SourceDescriptor::new("amazon", "Amazon"),
            listings: vec![RawListing {
                title: "Wireless Mouse".into(),
                price_text: "₹499".into(),
                ..Default::default()
            }],
        };
        let listings = scraper
            .fetch(&FetchTarget::Query("mouse".into()))
            .await
            .expect("should succeed");
        assert_eq!(listings.len(), 1);
        assert_eq!(scraper.id().as_str(), "amazon");
    }

    #[tokio::test]
    async fn mock_scraper_propagates_errors() {
        let scraper = MockScraper {
            descriptor: SourceDescriptor::new("croma", "Croma"),
            listings: vec![],
        };
        let err = scraper
            .fetch(&FetchTarget::Query("mouse".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), SourceErrorKind::Blocked);
        assert!(err.to_string().contains("mock captcha"));
    }

    #[test]
    fn scrape_error_kinds() {
        assert_eq!(ScrapeError::Timeout("x".into()).kind(), SourceErrorKind::Timeout);
        assert_eq!(ScrapeError::Parse("x".into()).kind(), SourceErrorKind::ParseError);
        assert_eq!(
            ScrapeError::Network("x".into()).kind(),
            SourceErrorKind::NetworkError
        );
    }

    #[test]
    fn descriptor_matches_domains_and_subdomains() {
        let d = SourceDescriptor::new("amazon", "Amazon").with_domains(["amazon.in", "Amazon.com"]);
        assert!(d.handles_host("amazon.in"));
        assert!(d.handles_host("www.amazon.com"));
        assert!(!d.handles_host("notamazon.in"));
        assert!(!d.handles_host("flipkart.com"));
    }

    #[test]
    fn descriptor_builder_defaults() {
        let d = SourceDescriptor::new("Myntra", "Myntra")
            .with_rating_scale(10.0)
            .with_default_currency("inr")
            .browser_backed();
        assert_eq!(d.id.as_str(), "myntra");
        assert!((d.rating_scale - 10.0).abs() < f64::EPSILON);
        assert_eq!(d.default_currency.as_deref(), Some("INR"));
        assert!(d.browser);
    }

    #[test]
    fn fetch_target_display() {
        assert_eq!(
            FetchTarget::Query("mouse".into()).to_string(),
            "query \"mouse\""
        );
    }
}
