//! Concurrent fan-out to source capabilities.
//!
//! One task per capability is spawned onto the runtime and gated by the
//! shared [`WorkerPool`]. Each task runs the fetch under its own timeout;
//! a failure, timeout or panic in one task becomes a [`SourceError`] and
//! never touches its siblings. Results are joined in the order the
//! capabilities were given (registry order), whatever order they finish in.

use std::sync::Arc;
use std::time::Duration;

use crate::capability::{FetchTarget, ScraperCapability};
use crate::config::AggregatorConfig;
use crate::types::{Outcome, RawListing, SourceError, SourceErrorKind, SourceId};

use super::pool::WorkerPool;

/// Listings returned by one source.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    /// The answering source.
    pub source: SourceId,
    /// Raw listings, capped at the per-source maximum.
    pub listings: Vec<RawListing>,
}

/// Everything collected from one fan-out.
#[derive(Debug, Clone, Default)]
pub struct Dispatch {
    /// Successful batches, in registry order.
    pub batches: Vec<SourceBatch>,
    /// Failed sources, in registry order.
    pub errors: Vec<SourceError>,
}

impl Dispatch {
    /// Total raw listings across all batches.
    pub fn listing_count(&self) -> usize {
        self.batches.iter().map(|b| b.listings.len()).sum()
    }

    /// Add one source's result to the fan-out.
    pub fn record(&mut self, source: SourceId, result: Result<Vec<RawListing>, SourceError>) {
        match result {
            Ok(listings) => {
                tracing::debug!(%source, count = listings.len(), "source returned listings");
                self.batches.push(SourceBatch { source, listings });
            }
            Err(error) => {
                tracing::warn!(
                    source = %error.source,
                    kind = %error.kind,
                    error = %error.message,
                    "source fetch failed"
                );
                self.errors.push(error);
            }
        }
    }

    /// Classify the fan-out.
    ///
    /// Returns `None` for total failure: no listings and at least one error.
    pub fn outcome(&self) -> Option<Outcome> {
        match (self.listing_count(), self.errors.is_empty()) {
            (0, false) => None,
            (0, true) => Some(Outcome::NoResults),
            (_, true) => Some(Outcome::Complete),
            (_, false) => Some(Outcome::Partial),
        }
    }
}

/// Runs source fetches concurrently under a bounded pool.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    pool: WorkerPool,
    fetch_timeout: Duration,
    browser_fetch_timeout: Duration,
    max_results_per_source: usize,
}

impl Orchestrator {
    /// Build an orchestrator from validated configuration.
    pub fn new(config: &AggregatorConfig) -> Self {
        Self {
            pool: WorkerPool::new(config.worker_pool_size),
            fetch_timeout: config.fetch_timeout(),
            browser_fetch_timeout: config.browser_fetch_timeout(),
            max_results_per_source: config.max_results_per_source,
        }
    }

    /// The shared worker pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Timeout applied to a fetch from `capability`.
    pub fn timeout_for(&self, capability: &dyn ScraperCapability) -> Duration {
        if capability.descriptor().browser {
            self.browser_fetch_timeout
        } else {
            self.fetch_timeout
        }
    }

    /// Fetch `target` from every capability concurrently.
    ///
    /// Completes once every task has answered, failed or timed out.
    pub async fn aggregate(
        &self,
        target: &FetchTarget,
        capabilities: &[Arc<dyn ScraperCapability>],
    ) -> Dispatch {
        let jobs = capabilities
            .iter()
            .map(|capability| (target.clone(), Arc::clone(capability)))
            .collect();

        let mut dispatch = Dispatch::default();
        for (source, result) in self.fetch_each(jobs).await {
            dispatch.record(source, result);
        }
        dispatch
    }

    /// Run one fetch per `(target, capability)` job, all under the shared
    /// pool, and return each job's result in job order.
    pub async fn fetch_each(
        &self,
        jobs: Vec<(FetchTarget, Arc<dyn ScraperCapability>)>,
    ) -> Vec<(SourceId, Result<Vec<RawListing>, SourceError>)> {
        let (sources, handles): (Vec<_>, Vec<_>) = jobs
            .into_iter()
            .map(|(target, capability)| {
                let pool = self.pool.clone();
                let timeout = self.timeout_for(capability.as_ref());
                let cap = self.max_results_per_source;
                let source = capability.id().clone();
                let handle = tokio::spawn(async move {
                    fetch_one(capability, target, pool, timeout, cap).await
                });
                (source, handle)
            })
            .unzip();
        let joined = futures::future::join_all(handles).await;

        sources
            .into_iter()
            .zip(joined)
            .map(|(source, joined)| {
                let result = joined.unwrap_or_else(|err| {
                    Err(SourceError::new(
                        source.clone(),
                        SourceErrorKind::Internal,
                        format!("scraper task crashed: {err}"),
                    ))
                });
                (source, result)
            })
            .collect()
    }
}

async fn fetch_one(
    capability: Arc<dyn ScraperCapability>,
    target: FetchTarget,
    pool: WorkerPool,
    timeout: Duration,
    cap: usize,
) -> Result<Vec<RawListing>, SourceError> {
    let source = capability.id().clone();
    let _permit = pool.acquire().await.map_err(|err| {
        SourceError::new(source.clone(), SourceErrorKind::Internal, err.to_string())
    })?;

    match tokio::time::timeout(timeout, capability.fetch(&target)).await {
        Ok(Ok(mut listings)) => {
            listings.truncate(cap);
            Ok(listings)
        }
        Ok(Err(err)) => Err(SourceError::new(source, err.kind(), err.to_string())),
        Err(_) => Err(SourceError::new(
            source,
            SourceErrorKind::Timeout,
            format!("no response within {}s", timeout.as_secs_f64()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{ScrapeError, SourceDescriptor};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Listings(usize),
        Fail(ScrapeError),
        Panic,
    }

    struct Stub {
        descriptor: SourceDescriptor,
        delay: Duration,
        behaviour: Behaviour,
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Stub {
        fn new(id: &str, delay_ms: u64, behaviour: Behaviour) -> Self {
            Self {
                descriptor: SourceDescriptor::new(id, id),
                delay: Duration::from_millis(delay_ms),
                behaviour,
                in_flight: Arc::default(),
                peak: Arc::default(),
            }
        }

        fn browser(mut self) -> Self {
            self.descriptor = self.descriptor.browser_backed();
            self
        }

        fn tracked(mut self, in_flight: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> Self {
            self.in_flight = Arc::clone(in_flight);
            self.peak = Arc::clone(peak);
            self
        }
    }

    #[async_trait]
    impl ScraperCapability for Stub {
        fn descriptor(&self) -> &SourceDescriptor {
            &self.descriptor
        }

        async fn fetch(&self, _target: &FetchTarget) -> Result<Vec<RawListing>, ScrapeError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match &self.behaviour {
                Behaviour::Listings(n) => Ok((0..*n)
                    .map(|i| RawListing {
                        title: format!("{} item {i}", self.descriptor.id),
                        price_text: format!("{}", 100 + i),
                        ..RawListing::default()
                    })
                    .collect()),
                Behaviour::Fail(err) => Err(err.clone()),
                Behaviour::Panic => panic!("scraper blew up"),
            }
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(&AggregatorConfig::default())
    }

    fn caps(stubs: Vec<Stub>) -> Vec<Arc<dyn ScraperCapability>> {
        stubs
            .into_iter()
            .map(|s| Arc::new(s) as Arc<dyn ScraperCapability>)
            .collect()
    }

    fn query() -> FetchTarget {
        FetchTarget::Query("wireless mouse".into())
    }

    #[tokio::test(start_paused = true)]
    async fn results_follow_registry_order_not_completion_order() {
        let capabilities = caps(vec![
            Stub::new("slow", 300, Behaviour::Listings(1)),
            Stub::new("fast", 10, Behaviour::Listings(1)),
            Stub::new("medium", 100, Behaviour::Listings(1)),
        ]);
        let dispatch = orchestrator().aggregate(&query(), &capabilities).await;
        let order: Vec<_> = dispatch.batches.iter().map(|b| b.source.as_str()).collect();
        assert_eq!(order, ["slow", "fast", "medium"]);
        assert_eq!(dispatch.outcome(), Some(Outcome::Complete));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_source_error_without_cancelling_siblings() {
        let capabilities = caps(vec![
            Stub::new("stuck", 60_000, Behaviour::Listings(1)),
            Stub::new("ok", 50, Behaviour::Listings(2)),
        ]);
        let dispatch = orchestrator().aggregate(&query(), &capabilities).await;
        assert_eq!(dispatch.errors.len(), 1);
        assert_eq!(dispatch.errors[0].source.as_str(), "stuck");
        assert_eq!(dispatch.errors[0].kind, SourceErrorKind::Timeout);
        assert_eq!(dispatch.listing_count(), 2);
        assert_eq!(dispatch.outcome(), Some(Outcome::Partial));
    }

    #[tokio::test(start_paused = true)]
    async fn browser_sources_get_the_longer_timeout() {
        let capabilities = caps(vec![
            Stub::new("headless", 20_000, Behaviour::Listings(1)).browser(),
            Stub::new("plain", 20_000, Behaviour::Listings(1)),
        ]);
        let dispatch = orchestrator().aggregate(&query(), &capabilities).await;
        assert_eq!(dispatch.batches.len(), 1);
        assert_eq!(dispatch.batches[0].source.as_str(), "headless");
        assert_eq!(dispatch.errors[0].source.as_str(), "plain");
    }

    #[tokio::test]
    async fn panicking_task_is_isolated_as_internal() {
        let capabilities = caps(vec![
            Stub::new("boom", 0, Behaviour::Panic),
            Stub::new("ok", 0, Behaviour::Listings(1)),
        ]);
        let dispatch = orchestrator().aggregate(&query(), &capabilities).await;
        assert_eq!(dispatch.errors.len(), 1);
        assert_eq!(dispatch.errors[0].kind, SourceErrorKind::Internal);
        assert_eq!(dispatch.batches.len(), 1);
    }

    #[tokio::test]
    async fn scrape_errors_keep_their_kind() {
        let capabilities = caps(vec![
            Stub::new("a", 0, Behaviour::Fail(ScrapeError::Blocked("captcha".into()))),
            Stub::new("b", 0, Behaviour::Fail(ScrapeError::Parse("no cards".into()))),
        ]);
        let dispatch = orchestrator().aggregate(&query(), &capabilities).await;
        let kinds: Vec<_> = dispatch.errors.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, [SourceErrorKind::Blocked, SourceErrorKind::ParseError]);
        assert!(dispatch.errors[0].message.contains("captcha"));
        assert_eq!(dispatch.outcome(), None);
    }

    #[tokio::test]
    async fn empty_answers_are_no_results() {
        let capabilities = caps(vec![Stub::new("a", 0, Behaviour::Listings(0))]);
        let dispatch = orchestrator().aggregate(&query(), &capabilities).await;
        assert_eq!(dispatch.outcome(), Some(Outcome::NoResults));
    }

    #[tokio::test]
    async fn batches_are_capped_per_source() {
        let capabilities = caps(vec![Stub::new("bulk", 0, Behaviour::Listings(50))]);
        let dispatch = orchestrator().aggregate(&query(), &capabilities).await;
        assert_eq!(dispatch.batches[0].listings.len(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn pool_bounds_concurrent_fetches() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let stubs = (0..12)
            .map(|i| {
                Stub::new(&format!("s{i}"), 100, Behaviour::Listings(1)).tracked(&in_flight, &peak)
            })
            .collect();
        let config = AggregatorConfig {
            worker_pool_size: 3,
            ..AggregatorConfig::default()
        };
        let dispatch = Orchestrator::new(&config).aggregate(&query(), &caps(stubs)).await;
        assert_eq!(dispatch.batches.len(), 12);
        assert!(dispatch.errors.is_empty(), "queued tasks must not time out");
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_wait_does_not_count_against_timeout() {
        // Each fetch takes 4s against a 5s timeout; with one worker the last
        // one starts 8s after dispatch.
        let stubs = (0..3)
            .map(|i| Stub::new(&format!("s{i}"), 4_000, Behaviour::Listings(1)))
            .collect();
        let config = AggregatorConfig {
            worker_pool_size: 1,
            ..AggregatorConfig::default()
        };
        let dispatch = Orchestrator::new(&config).aggregate(&query(), &caps(stubs)).await;
        assert!(dispatch.errors.is_empty());
        assert_eq!(dispatch.batches.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_each_shares_the_pool_and_keeps_job_order() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let shared: Arc<dyn ScraperCapability> =
            Arc::new(Stub::new("shop", 100, Behaviour::Listings(1)).tracked(&in_flight, &peak));
        let failing: Arc<dyn ScraperCapability> = Arc::new(Stub::new(
            "down",
            0,
            Behaviour::Fail(ScrapeError::Network("reset".into())),
        ));
        let config = AggregatorConfig {
            worker_pool_size: 2,
            ..AggregatorConfig::default()
        };
        let jobs = vec![
            (query(), Arc::clone(&shared)),
            (query(), Arc::clone(&failing)),
            (query(), Arc::clone(&shared)),
            (query(), Arc::clone(&shared)),
        ];

        let results = Orchestrator::new(&config).fetch_each(jobs).await;
        let sources: Vec<_> = results.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(sources, ["shop", "down", "shop", "shop"]);
        assert!(results[0].1.is_ok());
        assert_eq!(
            results[1].1.as_ref().map_err(|e| e.kind).unwrap_err(),
            SourceErrorKind::NetworkError
        );
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
