//! Source registry: maps source identifiers to scraper capabilities.
//!
//! Registration order is significant. The orchestrator reports results in
//! registry order, which makes clustering deterministic no matter which
//! source answers first.

use std::sync::Arc;

use url::Url;

use crate::capability::{ScraperCapability, SourceDescriptor};
use crate::error::AggregateError;
use crate::types::SourceId;

/// Ordered collection of registered scraper capabilities.
#[derive(Default, Clone)]
pub struct Registry {
    sources: Vec<Arc<dyn ScraperCapability>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability at the end of the dispatch order.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Config`] if a capability with the same
    /// source id is already registered.
    pub fn register(&mut self, capability: Arc<dyn ScraperCapability>) -> Result<(), AggregateError> {
        let id = capability.id().clone();
        if self.get(&id).is_some() {
            return Err(AggregateError::Config(format!(
                "source {id} is already registered"
            )));
        }
        tracing::debug!(source = %id, "registered source");
        self.sources.push(capability);
        Ok(())
    }

    /// Builder-style [`Registry::register`].
    ///
    /// # Errors
    ///
    /// Same as [`Registry::register`].
    pub fn with(mut self, capability: Arc<dyn ScraperCapability>) -> Result<Self, AggregateError> {
        self.register(capability)?;
        Ok(self)
    }

    /// Look up a capability by id.
    pub fn get(&self, id: &SourceId) -> Option<&Arc<dyn ScraperCapability>> {
        self.sources.iter().find(|s| s.id() == id)
    }

    /// Whether a source id is registered.
    pub fn contains(&self, id: &SourceId) -> bool {
        self.get(id).is_some()
    }

    /// All capabilities in registry order.
    pub fn all(&self) -> Vec<Arc<dyn ScraperCapability>> {
        self.sources.clone()
    }

    /// The capabilities named in `ids`, in registry order.
    ///
    /// An empty `ids` slice selects every source. Unknown ids are ignored;
    /// request validation rejects them earlier.
    pub fn select(&self, ids: &[SourceId]) -> Vec<Arc<dyn ScraperCapability>> {
        if ids.is_empty() {
            return self.all();
        }
        self.sources
            .iter()
            .filter(|s| ids.contains(s.id()))
            .cloned()
            .collect()
    }

    /// The capability whose domain list matches the URL's host.
    pub fn for_url(&self, url: &Url) -> Option<&Arc<dyn ScraperCapability>> {
        let host = url.host_str()?;
        self.sources
            .iter()
            .find(|s| s.descriptor().handles_host(host))
    }

    /// Descriptors of every supported source, in registry order.
    pub fn descriptors(&self) -> Vec<SourceDescriptor> {
        self.sources
            .iter()
            .map(|s| s.descriptor().clone())
            .collect()
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether no source is registered.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sources.iter().map(|s| s.id()))
            .finish()
    }
}
