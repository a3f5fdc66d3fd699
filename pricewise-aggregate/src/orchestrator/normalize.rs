//! Normalisation of raw source listings into the canonical schema.
//!
//! - Prices: currency detected from symbols (`₹ $ € £ ¥`), `Rs`/`Rs.` and
//!   ISO codes; thousands separators and whitespace stripped; parsed as
//!   [`Decimal`].
//! - Ratings: `84%`, `4.2 out of 5`, `8/10` and bare numbers are rescaled
//!   onto 0–5 using the source's declared scale.
//! - Text: whitespace trimmed and collapsed.
//!
//! Listings without a recoverable price are dropped and counted; they
//! never abort the batch.

use std::str::FromStr;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::capability::SourceDescriptor;
use crate::types::{CanonicalListing, RawListing};

use super::similarity::match_key;

/// Why a single listing was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// No numeric value could be found in the price text.
    #[error("no numeric price in {0:?}")]
    MissingPrice(String),

    /// A numeric value was found but is not a valid amount.
    #[error("invalid price {0:?}")]
    InvalidPrice(String),

    /// The listing has no title to match on.
    #[error("listing has an empty title")]
    EmptyTitle,
}

/// Currency markers recognised in price text, checked in order.
const SYMBOLS: &[(&str, &str)] = &[("₹", "INR"), ("$", "USD"), ("€", "EUR"), ("£", "GBP"), ("¥", "JPY")];

/// Alphabetic currency words (lowercase, trailing dot stripped).
const CODES: &[(&str, &str)] = &[
    ("rs", "INR"),
    ("inr", "INR"),
    ("usd", "USD"),
    ("eur", "EUR"),
    ("gbp", "GBP"),
    ("jpy", "JPY"),
];

/// Maps raw listings onto [`CanonicalListing`].
#[derive(Debug, Clone)]
pub struct Normalizer {
    default_currency: String,
}

impl Normalizer {
    /// Create a normaliser falling back to `default_currency` when neither
    /// the price, the listing nor the source names one.
    pub fn new(default_currency: impl Into<String>) -> Self {
        Self {
            default_currency: default_currency.into().to_uppercase(),
        }
    }

    /// Normalise one listing from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError`] if the title is empty or the price text
    /// holds no valid non-negative amount.
    pub fn normalize(
        &self,
        raw: &RawListing,
        source: &SourceDescriptor,
    ) -> Result<CanonicalListing, NormalizeError> {
        let title = clean_text(&raw.title);
        if title.is_empty() {
            return Err(NormalizeError::EmptyTitle);
        }

        let fallback = raw
            .currency_hint
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .or(source.default_currency.as_deref())
            .unwrap_or(self.default_currency.as_str());
        let (price, currency) = parse_price(&raw.price_text, fallback)?;

        let original_price = raw
            .original_price_text
            .as_deref()
            .and_then(|text| parse_price(text, &currency).ok())
            .map(|(amount, _)| amount)
            .filter(|amount| *amount >= price);

        Ok(CanonicalListing {
            match_key: match_key(&title),
            title,
            price,
            original_price,
            currency,
            rating: raw
                .rating_text
                .as_deref()
                .and_then(|text| parse_rating(text, source.rating_scale)),
            rating_count: raw.rating_count_text.as_deref().and_then(parse_count),
            url: raw.url.trim().to_string(),
            image_url: non_empty(raw.image_url.as_deref()),
            availability: non_empty(raw.availability.as_deref()).map(|a| clean_text(&a)),
            source: source.id.clone(),
            observed_at: Utc::now(),
        })
    }

    /// Normalise a source's batch, dropping invalid listings.
    ///
    /// Returns the surviving listings in input order and the number dropped.
    pub fn normalize_batch(
        &self,
        raws: &[RawListing],
        source: &SourceDescriptor,
    ) -> (Vec<CanonicalListing>, usize) {
        let mut listings = Vec::with_capacity(raws.len());
        let mut dropped = 0;
        for raw in raws {
            match self.normalize(raw, source) {
                Ok(listing) => listings.push(listing),
                Err(err) => {
                    dropped += 1;
                    tracing::warn!(source = %source.id, error = %err, "dropping listing");
                }
            }
        }
        (listings, dropped)
    }
}

/// Trim and collapse internal whitespace.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Parse price text into an amount and an ISO currency code.
///
/// # Errors
///
/// Returns [`NormalizeError::MissingPrice`] when no digits are present and
/// [`NormalizeError::InvalidPrice`] for malformed or negative amounts.
pub fn parse_price(text: &str, fallback_currency: &str) -> Result<(Decimal, String), NormalizeError> {
    let currency = detect_currency(text).unwrap_or(fallback_currency).to_uppercase();

    let chars: Vec<char> = text.chars().collect();
    let start = chars
        .iter()
        .position(|c| c.is_ascii_digit())
        .ok_or_else(|| NormalizeError::MissingPrice(text.to_string()))?;

    let negative = chars[..start]
        .iter()
        .rev()
        .find(|c| !c.is_whitespace() && !is_currency_symbol(c))
        .is_some_and(|&c| c == '-');
    if negative {
        return Err(NormalizeError::InvalidPrice(text.to_string()));
    }

    let number: String = chars[start..]
        .iter()
        .take_while(|c| c.is_ascii_digit() || **c == ',' || **c == '.' || c.is_whitespace())
        .filter(|c| c.is_ascii_digit() || **c == '.')
        .collect();
    let number = number.trim_end_matches('.');

    let amount =
        Decimal::from_str(number).map_err(|_| NormalizeError::InvalidPrice(text.to_string()))?;
    Ok((amount, currency))
}

fn is_currency_symbol(c: &char) -> bool {
    SYMBOLS.iter().any(|(symbol, _)| symbol.starts_with(*c))
}

fn detect_currency(text: &str) -> Option<&'static str> {
    if let Some((_, code)) = SYMBOLS.iter().find(|(symbol, _)| text.contains(symbol)) {
        return Some(*code);
    }
    text.split(|c: char| !c.is_alphabetic())
        .filter(|word| !word.is_empty())
        .find_map(|word| {
            let word = word.to_lowercase();
            CODES
                .iter()
                .find(|(marker, _)| *marker == word)
                .map(|(_, code)| *code)
        })
}

/// Parse rating text onto the 0–5 scale.
///
/// `scale` is the maximum of the source's native scale and is used only
/// for bare numbers. Returns `None` when no number is present.
pub fn parse_rating(text: &str, scale: f64) -> Option<f64> {
    let numbers = extract_numbers(text);
    let first = *numbers.first()?;
    let lower = text.to_lowercase();

    let rating = if let Some(percent) = number_before_percent(text) {
        percent / 20.0
    } else if (lower.contains("out of") || text.contains('/')) && numbers.len() >= 2 {
        let max = numbers[1];
        if max <= 0.0 {
            return None;
        }
        first / max * 5.0
    } else if (scale - 5.0).abs() > f64::EPSILON && scale > 0.0 {
        first / scale * 5.0
    } else if first > 5.0 && first <= 10.0 {
        first / 2.0
    } else if first > 10.0 && first <= 100.0 {
        first / 20.0
    } else {
        first
    };

    rating.is_finite().then(|| rating.clamp(0.0, 5.0))
}

/// Parse a count such as `"1,234 ratings"`.
pub fn parse_count(text: &str) -> Option<u64> {
    let digits: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// The number written directly before the first `%` that has one.
fn number_before_percent(text: &str) -> Option<f64> {
    text.match_indices('%').find_map(|(end, _)| {
        let head = &text[..end];
        let start = head
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
            .last()
            .map(|(i, _)| i)?;
        head[start..].parse::<f64>().ok()
    })
}

fn extract_numbers(text: &str) -> Vec<f64> {
    let mut numbers = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        let continues_number = !current.is_empty()
            && (c == '.' || c == ',')
            && chars.peek().is_some_and(char::is_ascii_digit);
        if c.is_ascii_digit() || continues_number {
            if c != ',' {
                current.push(c);
            }
        } else if !current.is_empty() {
            numbers.extend(current.parse::<f64>().ok());
            current.clear();
        }
    }
    if !current.is_empty() {
        numbers.extend(current.parse::<f64>().ok());
    }
    numbers
}
