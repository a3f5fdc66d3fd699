//! Error types for the pricewise-aggregate crate.
//!
//! Per-source and per-listing failures are absorbed into the response;
//! only the variants of [`AggregateError`] surface as request-level
//! failures. Messages are stable lowercase strings.

use std::time::Duration;

use crate::types::SourceError;

/// Request-level failures of the aggregation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    /// The client exceeded its request budget; nothing was dispatched.
    #[error("rate limit exceeded; retry after {}s", retry_after.as_secs())]
    RateLimitExceeded {
        /// How long the client should wait before retrying.
        retry_after: Duration,
    },

    /// Every source failed and none produced listings.
    #[error("all sources failed: {}", summarize(source_errors))]
    EmptyFailure {
        /// One entry per failed source, in registry order.
        source_errors: Vec<SourceError>,
    },

    /// Malformed request parameters, rejected before dispatch.
    #[error("validation error: {0}")]
    Validation(String),

    /// No registered source handles the given product URL.
    #[error("unsupported url: {0}")]
    UnsupportedUrl(String),

    /// Invalid aggregator configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl AggregateError {
    /// Source errors carried by an [`AggregateError::EmptyFailure`].
    pub fn source_errors(&self) -> &[SourceError] {
        match self {
            Self::EmptyFailure { source_errors } => source_errors,
            _ => &[],
        }
    }
}

fn summarize(errors: &[SourceError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.source, e.kind))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Convenience type alias for pricewise-aggregate results.
pub type Result<T> = std::result::Result<T, AggregateError>;
