//! Error types for the pricewise host.

use pricewise_aggregate::AggregateError;

/// Top-level error type for the host: configuration, fixtures and the
/// aggregation engine.
#[derive(Debug, thiserror::Error)]
pub enum PricewiseError {
    /// Configuration file or value error.
    #[error("config error: {0}")]
    Config(String),

    /// Fixture file could not be loaded.
    #[error("fixture error: {0}")]
    Fixture(String),

    /// Logging could not be initialised.
    #[error("logging error: {0}")]
    Logging(String),

    /// Error from the aggregation engine.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, PricewiseError>;
