//! The aggregator facade: per-request state machine over shared state.
//!
//! ```text
//! RECEIVED -> RATE_CHECKED -> CACHE_HIT -> DONE
//!                          \-> CACHE_MISS -> DISPATCHED -> NORMALIZED
//!                              -> DEDUPLICATED -> CACHED -> DONE
//! ```
//!
//! A denied rate check, a validation failure and a total source failure
//! end the request early with an [`AggregateError`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Instrument;
use url::Url;

use crate::cache::{CacheStats, TtlCache};
use crate::capability::{FetchTarget, SourceDescriptor};
use crate::compare::{best_by, BestBy};
use crate::config::AggregatorConfig;
use crate::error::{AggregateError, Result};
use crate::orchestrator::{deduplicate, Dispatch, Normalizer, Orchestrator, SourceBatch};
use crate::rate_limit::{Admission, RateLimiter};
use crate::registry::Registry;
use crate::request::{Pagination, RequestFingerprint, SearchRequest, SortKey, SortOrder};
use crate::types::{CanonicalListing, CanonicalProduct, Outcome, SourceError, SourceId};

/// Response to a search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResponse {
    /// The query as submitted, trimmed.
    pub query: String,
    /// Products on the requested page.
    pub products: Vec<CanonicalProduct>,
    /// Sources that failed, in registry order.
    pub source_errors: Vec<SourceError>,
    /// Whether this response was served from the cache.
    pub cached: bool,
    /// How the fan-out ended.
    pub outcome: Outcome,
    /// Listings discarded during normalisation.
    pub dropped_listings: usize,
    /// Position of `products` within all matching products.
    pub pagination: Pagination,
    /// Field the products were sorted by.
    pub sort: SortKey,
    /// Direction of the sort.
    pub order: SortOrder,
    /// Highlights over `products`.
    pub best: BestBy,
}

/// Response to a product URL lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlLookup {
    /// The looked-up URL, as parsed.
    pub url: String,
    /// The source that owns the URL's domain.
    pub source: SourceId,
    /// Products found on the page, merged.
    pub products: Vec<CanonicalProduct>,
    /// [`Outcome::Complete`], or [`Outcome::NoResults`] for an empty page.
    pub outcome: Outcome,
    /// Listings discarded during normalisation.
    pub dropped_listings: usize,
}

/// One entry of a batch URL lookup, in the order the URLs were given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchLookupEntry {
    /// The owning source answered.
    Success(UrlLookup),
    /// No registered source handles the URL's domain.
    Unsupported {
        /// The URL, as parsed.
        url: String,
    },
    /// The owning source failed.
    Failed {
        /// The URL, as parsed.
        url: String,
        /// What went wrong.
        error: SourceError,
    },
}

impl BatchLookupEntry {
    /// The URL this entry answers.
    pub fn url(&self) -> &str {
        match self {
            Self::Success(lookup) => &lookup.url,
            Self::Unsupported { url } | Self::Failed { url, .. } => url,
        }
    }

    /// Whether the owning source answered.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Owns the registry, rate limiter, response cache and worker pool, and
/// runs every request against them.
///
/// Construct once and share behind an `Arc`; all methods take `&self`.
#[derive(Debug)]
pub struct Aggregator {
    config: AggregatorConfig,
    registry: Registry,
    limiter: RateLimiter,
    cache: TtlCache<RequestFingerprint, AggregationResponse>,
    orchestrator: Orchestrator,
    normalizer: Normalizer,
    next_request_id: AtomicU64,
}

impl Aggregator {
    /// Build an aggregator over `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Config`] if the configuration is invalid or
    /// no source is registered.
    pub fn new(config: AggregatorConfig, registry: Registry) -> Result<Self> {
        config.validate()?;
        if registry.is_empty() {
            return Err(AggregateError::Config(
                "at least one source must be registered".into(),
            ));
        }
        tracing::debug!(sources = registry.len(), pool = config.worker_pool_size, "aggregator ready");
        Ok(Self {
            limiter: RateLimiter::new(config.rate_limit_requests, config.rate_limit_window()),
            cache: TtlCache::new(config.cache_ttl(), config.cache_capacity),
            orchestrator: Orchestrator::new(&config),
            normalizer: Normalizer::new(config.default_currency.clone()),
            next_request_id: AtomicU64::new(1),
            config,
            registry,
        })
    }

    /// Search every selected source for `request.query`.
    ///
    /// # Errors
    ///
    /// - [`AggregateError::RateLimitExceeded`] if `client_id` is over budget
    /// - [`AggregateError::Validation`] for malformed requests
    /// - [`AggregateError::EmptyFailure`] if every source failed
    pub async fn search(&self, client_id: &str, request: SearchRequest) -> Result<AggregationResponse> {
        let span = tracing::debug_span!("search", request_id = self.request_id(), client = client_id);
        self.run_search(client_id, request).instrument(span).await
    }

    async fn run_search(&self, client_id: &str, request: SearchRequest) -> Result<AggregationResponse> {
        self.rate_check(client_id)?;
        request.validate(self.config.max_page_size, &self.registry)?;

        let fingerprint = request.fingerprint();
        if let Some(mut hit) = self.cache.get(&fingerprint).await {
            tracing::debug!("cache hit");
            hit.cached = true;
            return Ok(hit);
        }
        tracing::debug!("cache miss");

        let query = request.query.trim().to_string();
        tracing::trace!(%query, "dispatching");
        let capabilities = self.registry.select(&request.filters.sources);
        let dispatch = self
            .orchestrator
            .aggregate(&FetchTarget::Query(query.clone()), &capabilities)
            .await;
        let (products, outcome, dropped, source_errors) = self.merge(dispatch)?;

        let (products, pagination) = request.apply(products);
        let response = AggregationResponse {
            query,
            best: best_by(&products),
            products,
            source_errors,
            cached: false,
            outcome,
            dropped_listings: dropped,
            pagination,
            sort: request.sort,
            order: request.order,
        };

        self.cache.put(fingerprint, response.clone()).await;
        tracing::debug!(products = response.pagination.total, ?outcome, "cached");
        Ok(response)
    }

    /// Look up a product by its page URL on the source that owns the domain.
    ///
    /// # Errors
    ///
    /// - [`AggregateError::RateLimitExceeded`] if `client_id` is over budget
    /// - [`AggregateError::Validation`] if `url` is not an http(s) URL
    /// - [`AggregateError::UnsupportedUrl`] if no source handles the domain
    /// - [`AggregateError::EmptyFailure`] if the source failed
    pub async fn lookup_url(&self, client_id: &str, url: &str) -> Result<UrlLookup> {
        let span = tracing::debug_span!("lookup", request_id = self.request_id(), client = client_id);
        self.run_lookup(client_id, url).instrument(span).await
    }

    async fn run_lookup(&self, client_id: &str, url: &str) -> Result<UrlLookup> {
        self.rate_check(client_id)?;

        let parsed = parse_product_url(url)?;
        let capability = self
            .registry
            .for_url(&parsed)
            .cloned()
            .ok_or_else(|| AggregateError::UnsupportedUrl(parsed.to_string()))?;
        let source = capability.id().clone();
        tracing::trace!(%source, url = %parsed, "dispatching lookup");

        let dispatch = self
            .orchestrator
            .aggregate(&FetchTarget::Url(parsed.clone()), &[capability])
            .await;
        let (products, outcome, dropped, _) = self.merge(dispatch)?;
        Ok(UrlLookup {
            url: parsed.to_string(),
            source,
            products,
            outcome,
            dropped_listings: dropped,
        })
    }

    /// Look up several product URLs at once.
    ///
    /// The whole batch costs one rate-limit admission. Every URL is
    /// validated before anything is fetched; the fetches then share the
    /// worker pool like any other fan-out. Entries come back in input
    /// order, with unsupported domains and failing sources reported per
    /// URL instead of failing the batch.
    ///
    /// # Errors
    ///
    /// - [`AggregateError::RateLimitExceeded`] if `client_id` is over budget
    /// - [`AggregateError::Validation`] if `urls` is empty or any URL is
    ///   not an http(s) URL
    pub async fn lookup_urls(&self, client_id: &str, urls: &[&str]) -> Result<Vec<BatchLookupEntry>> {
        let span = tracing::debug_span!(
            "lookup_batch",
            request_id = self.request_id(),
            client = client_id,
            urls = urls.len()
        );
        self.run_lookup_batch(client_id, urls).instrument(span).await
    }

    async fn run_lookup_batch(&self, client_id: &str, urls: &[&str]) -> Result<Vec<BatchLookupEntry>> {
        self.rate_check(client_id)?;
        if urls.is_empty() {
            return Err(AggregateError::Validation(
                "urls must be a non-empty list".into(),
            ));
        }

        let mut parsed = Vec::with_capacity(urls.len());
        let mut invalid = Vec::new();
        for url in urls {
            match parse_product_url(url) {
                Ok(url) => parsed.push(url),
                Err(_) => invalid.push(url.trim()),
            }
        }
        if !invalid.is_empty() {
            return Err(AggregateError::Validation(format!(
                "invalid url format: {}",
                invalid.join(", ")
            )));
        }

        let routes: Vec<_> = parsed
            .iter()
            .map(|url| self.registry.for_url(url).cloned())
            .collect();
        let jobs = parsed
            .iter()
            .zip(&routes)
            .filter_map(|(url, route)| {
                route
                    .as_ref()
                    .map(|capability| (FetchTarget::Url(url.clone()), Arc::clone(capability)))
            })
            .collect::<Vec<_>>();
        tracing::debug!(routed = jobs.len(), "dispatching batch lookup");
        let mut fetched = self.orchestrator.fetch_each(jobs).await.into_iter();

        let mut entries = Vec::with_capacity(parsed.len());
        for (url, route) in parsed.into_iter().zip(routes) {
            let url = url.to_string();
            if route.is_none() {
                entries.push(BatchLookupEntry::Unsupported { url });
                continue;
            }
            let Some((source, result)) = fetched.next() else {
                break;
            };
            let entry = match result {
                Ok(listings) => {
                    let outcome = if listings.is_empty() {
                        Outcome::NoResults
                    } else {
                        Outcome::Complete
                    };
                    let batch = SourceBatch {
                        source: source.clone(),
                        listings,
                    };
                    let (products, dropped) = self.normalize_and_merge(std::slice::from_ref(&batch));
                    BatchLookupEntry::Success(UrlLookup {
                        url,
                        source,
                        products,
                        outcome,
                        dropped_listings: dropped,
                    })
                }
                Err(error) => BatchLookupEntry::Failed { url, error },
            };
            entries.push(entry);
        }

        let succeeded = entries.iter().filter(|e| e.is_success()).count();
        tracing::debug!(succeeded, failed = entries.len() - succeeded, "batch lookup done");
        Ok(entries)
    }

    /// Descriptors of every registered source, in registry order.
    pub fn supported_sources(&self) -> Vec<SourceDescriptor> {
        self.registry.descriptors()
    }

    /// Requests `client_id` may still make in the current window.
    pub fn remaining_requests(&self, client_id: &str) -> u32 {
        self.limiter.remaining(client_id)
    }

    /// Forget rate-limit windows with no live requests.
    ///
    /// Admission checks already do this periodically; call it to reclaim
    /// memory sooner.
    pub fn purge_idle_clients(&self) -> usize {
        self.limiter.purge_idle()
    }

    /// Occupancy and limits of the response cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached response.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        tracing::debug!("cache cleared");
    }

    /// The validated configuration this aggregator runs with.
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// The registered sources.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    fn rate_check(&self, client_id: &str) -> Result<()> {
        match self.limiter.admit(client_id) {
            Admission::Allowed { remaining } => {
                tracing::debug!(remaining, "rate check passed");
                Ok(())
            }
            Admission::Denied { retry_after } => Err(AggregateError::RateLimitExceeded { retry_after }),
        }
    }

    /// Classify, normalise and deduplicate one fan-out.
    fn merge(
        &self,
        dispatch: Dispatch,
    ) -> Result<(Vec<CanonicalProduct>, Outcome, usize, Vec<SourceError>)> {
        let Some(outcome) = dispatch.outcome() else {
            tracing::warn!(failed = dispatch.errors.len(), "every source failed");
            return Err(AggregateError::EmptyFailure {
                source_errors: dispatch.errors,
            });
        };

        let (products, dropped) = self.normalize_and_merge(&dispatch.batches);
        Ok((products, outcome, dropped, dispatch.errors))
    }

    fn normalize_and_merge(&self, batches: &[SourceBatch]) -> (Vec<CanonicalProduct>, usize) {
        let mut listings: Vec<CanonicalListing> =
            Vec::with_capacity(batches.iter().map(|b| b.listings.len()).sum());
        let mut dropped = 0;
        for batch in batches {
            let Some(capability) = self.registry.get(&batch.source) else {
                continue;
            };
            let (normalized, lost) = self
                .normalizer
                .normalize_batch(&batch.listings, capability.descriptor());
            listings.extend(normalized);
            dropped += lost;
        }
        tracing::debug!(listings = listings.len(), dropped, "normalized");

        let products = deduplicate(listings, self.config.fuzzy_threshold);
        tracing::debug!(products = products.len(), "deduplicated");
        (products, dropped)
    }
}

fn parse_product_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| AggregateError::Validation(format!("invalid url: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AggregateError::Validation(
            "url must use http or https".into(),
        ));
    }
    Ok(parsed)
}
