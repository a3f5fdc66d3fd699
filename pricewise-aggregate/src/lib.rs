//! # pricewise-aggregate
//!
//! Concurrent product-listing aggregation across independent e-commerce
//! sources.
//!
//! A query is fanned out to every registered [`ScraperCapability`] under a
//! bounded worker pool, raw listings are normalised into a canonical schema
//! (decimal prices with currency, 0–5 ratings, cleaned text), near-duplicate
//! listings are merged into [`CanonicalProduct`]s by fuzzy title matching,
//! and the paginated response is cached briefly. Callers are throttled per
//! client before any work is done.
//!
//! ## Design
//!
//! - Scraping and HTML parsing live behind [`ScraperCapability`]; this crate
//!   only orchestrates calls to it
//! - Partial failure is success: failing sources are reported alongside the
//!   products from the ones that answered
//! - Output is deterministic for a given registry order, whatever order the
//!   sources respond in
//! - Search queries are logged only at trace level
//!
//! ## Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use pricewise_aggregate::{Aggregator, AggregatorConfig, Registry, SearchRequest, ScraperCapability};
//! # async fn example(amazon: Arc<dyn ScraperCapability>) -> pricewise_aggregate::Result<()> {
//! let registry = Registry::new().with(amazon)?;
//! let aggregator = Aggregator::new(AggregatorConfig::default(), registry)?;
//! let response = aggregator.search("203.0.113.7", SearchRequest::new("wireless mouse")).await?;
//! for product in &response.products {
//!     println!("{} {} {}", product.title, product.currency, product.price);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod capability;
pub mod compare;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod rate_limit;
pub mod registry;
pub mod request;
pub mod service;
pub mod types;

pub use cache::{CacheStats, TtlCache};
pub use capability::{FetchTarget, ScrapeError, ScraperCapability, SourceDescriptor};
pub use compare::{best_by, discount_percent, Best, BestBy};
pub use config::AggregatorConfig;
pub use error::{AggregateError, Result};
pub use rate_limit::{Admission, RateLimiter};
pub use registry::Registry;
pub use request::{
    Pagination, RequestFingerprint, SearchFilters, SearchParams, SearchRequest, SortKey, SortOrder,
};
pub use service::{AggregationResponse, Aggregator, BatchLookupEntry, UrlLookup};
pub use types::{
    CanonicalListing, CanonicalProduct, Offer, Outcome, RawListing, SourceError, SourceErrorKind,
    SourceId,
};
