//! Core types: source identity, raw and canonical listings, merged products,
//! per-source errors.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stable identifier of one e-commerce source (e.g. `"amazon"`).
///
/// Identifiers are compared case-insensitively by storing them lowercased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    /// Create an identifier, trimming and lowercasing the input.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_lowercase())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A listing exactly as one scraper capability produced it.
///
/// All fields are unparsed text; interpretation happens in
/// [`crate::orchestrator::normalize`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawListing {
    /// Product title as shown on the source.
    pub title: String,
    /// Price text, e.g. `"₹1,299.00"`.
    pub price_text: String,
    /// Pre-discount price text, if the source shows one.
    pub original_price_text: Option<String>,
    /// ISO currency code hint when the source knows it.
    pub currency_hint: Option<String>,
    /// Rating text, e.g. `"4.2 out of 5"`, `"84%"`, `"8.6"`.
    pub rating_text: Option<String>,
    /// Rating count text, e.g. `"1,234 ratings"`.
    pub rating_count_text: Option<String>,
    /// Product page URL.
    pub url: String,
    /// Product image URL.
    pub image_url: Option<String>,
    /// Availability text, e.g. `"In stock"`.
    pub availability: Option<String>,
}

/// One listing after normalisation into the canonical schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalListing {
    /// Whitespace-collapsed title.
    pub title: String,
    /// Case-folded, punctuation-free title used for similarity matching.
    pub match_key: String,
    /// Current price, always non-negative.
    pub price: Decimal,
    /// Pre-discount price, if known.
    pub original_price: Option<Decimal>,
    /// ISO currency code of `price`.
    pub currency: String,
    /// Rating on the 0–5 scale.
    pub rating: Option<f64>,
    /// Number of ratings behind `rating`.
    pub rating_count: Option<u64>,
    /// Product page URL.
    pub url: String,
    /// Product image URL.
    pub image_url: Option<String>,
    /// Availability text.
    pub availability: Option<String>,
    /// Source that produced the listing.
    pub source: SourceId,
    /// When the listing was normalised.
    pub observed_at: DateTime<Utc>,
}

/// One source's offer for a merged product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Offering source.
    pub source: SourceId,
    /// Offer URL on that source.
    pub url: String,
    /// Offer price.
    pub price: Decimal,
    /// Availability text reported by the source.
    pub availability: Option<String>,
}

/// The merged representation of one or more near-duplicate listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProduct {
    /// Title of the group representative.
    pub title: String,
    /// Lowest observed price across the group.
    pub price: Decimal,
    /// Currency shared by every member of the group.
    pub currency: String,
    /// Highest observed pre-discount price, if any member reported one.
    pub original_price: Option<Decimal>,
    /// Discount of `price` against `original_price`, in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<Decimal>,
    /// Mean of the present member ratings.
    pub rating: Option<f64>,
    /// Sum of the present member rating counts.
    pub rating_count: Option<u64>,
    /// Representative's product URL.
    pub url: String,
    /// Representative's image, or the first member image.
    pub image_url: Option<String>,
    /// Contributing sources; never empty.
    pub sources: BTreeSet<SourceId>,
    /// Every contributing listing, in input order.
    pub offers: Vec<Offer>,
    /// Latest observation time across the group.
    pub last_observed: DateTime<Utc>,
}

/// Why a single source failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceErrorKind {
    /// The fetch did not finish within its timeout.
    Timeout,
    /// The source refused or challenged the request.
    Blocked,
    /// The response could not be parsed into listings.
    ParseError,
    /// Transport-level failure.
    NetworkError,
    /// The scraper task itself crashed.
    Internal,
}

impl SourceErrorKind {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Blocked => "blocked",
            Self::ParseError => "parse_error",
            Self::NetworkError => "network_error",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for SourceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A non-fatal per-source failure reported alongside the products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    /// The failing source.
    pub source: SourceId,
    /// Failure category.
    pub kind: SourceErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl SourceError {
    /// Build a source error.
    pub fn new(source: SourceId, kind: SourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            source,
            kind,
            message: message.into(),
        }
    }
}

/// How the fan-out ended for a request that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every source answered.
    Complete,
    /// Some sources failed but at least one produced listings.
    Partial,
    /// No source failed and none produced listings.
    NoResults,
}
