//! Aggregation requests: parameters, validation, fingerprinting and the
//! filter/sort/paginate step applied after deduplication.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AggregateError, Result};
use crate::registry::Registry;
use crate::types::{CanonicalProduct, SourceId};

/// Longest accepted query, in characters.
pub const MAX_QUERY_CHARS: usize = 200;

/// Default page size.
pub const DEFAULT_PER_PAGE: u32 = 20;

/// Field products are ordered by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Merged (lowest) price.
    #[default]
    Price,
    /// Mean rating; unrated products sort as 0.
    Rating,
    /// Deduplication order. Ignores [`SortOrder`].
    Relevance,
}

impl FromStr for SortKey {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "price" => Ok(Self::Price),
            "rating" => Ok(Self::Rating),
            "relevance" => Ok(Self::Relevance),
            other => Err(AggregateError::Validation(format!(
                "unknown sort key {other:?}; expected price, rating or relevance"
            ))),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Price => "price",
            Self::Rating => "rating",
            Self::Relevance => "relevance",
        })
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

impl FromStr for SortOrder {
    type Err = AggregateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(AggregateError::Validation(format!(
                "unknown sort order {other:?}; expected asc or desc"
            ))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        })
    }
}

/// Result filters. Every field is optional; an empty `sources` list means
/// every registered source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    /// Restrict the fan-out to these sources.
    pub sources: Vec<SourceId>,
    /// Inclusive lower price bound.
    pub min_price: Option<Decimal>,
    /// Inclusive upper price bound.
    pub max_price: Option<Decimal>,
    /// Inclusive lower rating bound on the 0–5 scale.
    pub min_rating: Option<f64>,
}

impl SearchFilters {
    fn matches(&self, product: &CanonicalProduct) -> bool {
        if !self.sources.is_empty() && !product.sources.iter().any(|s| self.sources.contains(s)) {
            return false;
        }
        if self.min_price.is_some_and(|min| product.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| product.price > max) {
            return false;
        }
        if let Some(min) = self.min_rating {
            if product.rating.unwrap_or(0.0) < min {
                return false;
            }
        }
        true
    }
}

/// A typed aggregation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text product query.
    pub query: String,
    /// 1-based page number.
    pub page: u32,
    /// Products per page.
    pub per_page: u32,
    /// Sort field.
    pub sort: SortKey,
    /// Sort direction.
    pub order: SortOrder,
    /// Result filters.
    pub filters: SearchFilters,
}

impl SearchRequest {
    /// A first-page request for `query` with default sorting.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            sort: SortKey::default(),
            order: SortOrder::default(),
            filters: SearchFilters::default(),
        }
    }

    /// Select a page.
    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }

    /// Set the ordering.
    pub fn sorted_by(mut self, sort: SortKey, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    /// Replace the filters.
    pub fn filtered(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Check the request against the page-size limit and the registry.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Validation`] describing the first problem.
    pub fn validate(&self, max_page_size: u32, registry: &Registry) -> Result<()> {
        let query = self.query.trim();
        if query.is_empty() {
            return Err(invalid("query must not be empty"));
        }
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(invalid(format!(
                "query must be at most {MAX_QUERY_CHARS} characters"
            )));
        }
        if self.page == 0 {
            return Err(invalid("page must be at least 1"));
        }
        if self.per_page == 0 || self.per_page > max_page_size {
            return Err(invalid(format!(
                "per_page must be between 1 and {max_page_size}"
            )));
        }

        let filters = &self.filters;
        if filters.min_price.is_some_and(|p| p < Decimal::ZERO)
            || filters.max_price.is_some_and(|p| p < Decimal::ZERO)
        {
            return Err(invalid("price bounds must not be negative"));
        }
        if let (Some(min), Some(max)) = (filters.min_price, filters.max_price) {
            if min > max {
                return Err(invalid("min_price must not exceed max_price"));
            }
        }
        if let Some(rating) = filters.min_rating {
            if !(0.0..=5.0).contains(&rating) {
                return Err(invalid("min_rating must be between 0 and 5"));
            }
        }
        if let Some(unknown) = filters.sources.iter().find(|s| !registry.contains(s)) {
            return Err(invalid(format!("unknown source {unknown}")));
        }
        Ok(())
    }

    /// Derive the cache key for this request.
    ///
    /// Two requests that differ only in query case or surrounding
    /// whitespace, or in the order or repetition of source filters, share a
    /// fingerprint.
    pub fn fingerprint(&self) -> RequestFingerprint {
        let mut sources = self.filters.sources.clone();
        sources.sort();
        sources.dedup();
        RequestFingerprint {
            query: self
                .query
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
            sources,
            min_price: self.filters.min_price.map(|d| d.normalize()),
            max_price: self.filters.max_price.map(|d| d.normalize()),
            min_rating: self.filters.min_rating.map(f64::to_bits),
            sort: self.sort,
            order: self.order,
            page: self.page,
            per_page: self.per_page,
        }
    }

    /// Filter, sort and paginate deduplicated products.
    ///
    /// Sorting is stable, so products with equal keys keep their
    /// deduplication order. An unvalidated `page` of 0 reads as page 1.
    pub fn apply(&self, products: Vec<CanonicalProduct>) -> (Vec<CanonicalProduct>, Pagination) {
        let mut products: Vec<_> = products
            .into_iter()
            .filter(|p| self.filters.matches(p))
            .collect();

        let direction = |ord: Ordering| match self.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        };
        match self.sort {
            SortKey::Price => products.sort_by(|a, b| direction(a.price.cmp(&b.price))),
            SortKey::Rating => products.sort_by(|a, b| {
                direction(a.rating.unwrap_or(0.0).total_cmp(&b.rating.unwrap_or(0.0)))
            }),
            SortKey::Relevance => {}
        }

        let pagination = Pagination::new(self.page, self.per_page, products.len());
        let start = (self.page as usize).saturating_sub(1).saturating_mul(self.per_page as usize);
        let page = products
            .into_iter()
            .skip(start)
            .take(self.per_page as usize)
            .collect();
        (page, pagination)
    }
}

fn invalid(message: impl Into<String>) -> AggregateError {
    AggregateError::Validation(message.into())
}

/// Untyped request parameters as a query string or CLI would supply them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Free-text product query.
    pub query: String,
    /// 1-based page number; defaults to 1.
    pub page: Option<u32>,
    /// Products per page; defaults to [`DEFAULT_PER_PAGE`].
    pub per_page: Option<u32>,
    /// `price`, `rating` or `relevance`.
    pub sort: Option<String>,
    /// `asc` or `desc`.
    pub order: Option<String>,
    /// Source ids to restrict the fan-out to.
    pub sources: Vec<String>,
    /// Inclusive lower price bound.
    pub min_price: Option<Decimal>,
    /// Inclusive upper price bound.
    pub max_price: Option<Decimal>,
    /// Inclusive lower rating bound on the 0–5 scale.
    pub min_rating: Option<f64>,
}

impl TryFrom<SearchParams> for SearchRequest {
    type Error = AggregateError;

    fn try_from(params: SearchParams) -> Result<Self> {
        let sort = params.sort.as_deref().map(SortKey::from_str).transpose()?;
        let order = params.order.as_deref().map(SortOrder::from_str).transpose()?;
        Ok(Self {
            query: params.query,
            page: params.page.unwrap_or(1),
            per_page: params.per_page.unwrap_or(DEFAULT_PER_PAGE),
            sort: sort.unwrap_or_default(),
            order: order.unwrap_or_default(),
            filters: SearchFilters {
                sources: params.sources.iter().map(SourceId::new).collect(),
                min_price: params.min_price,
                max_price: params.max_price,
                min_rating: params.min_rating,
            },
        })
    }
}

/// Deterministic cache key of a [`SearchRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestFingerprint {
    query: String,
    sources: Vec<SourceId>,
    min_price: Option<Decimal>,
    max_price: Option<Decimal>,
    min_rating: Option<u64>,
    sort: SortKey,
    order: SortOrder,
    page: u32,
    per_page: u32,
}

impl fmt::Display for RequestFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sources: Vec<_> = self.sources.iter().map(SourceId::as_str).collect();
        let bound = |d: Option<Decimal>| d.map(|d| d.to_string()).unwrap_or_default();
        write!(
            f,
            "{}|sources={}|price={}..{}|rating>={}|sort={}:{}|page={}x{}",
            self.query,
            sources.join(","),
            bound(self.min_price),
            bound(self.max_price),
            self.min_rating.map(f64::from_bits).unwrap_or(0.0),
            self.sort,
            self.order,
            self.page,
            self.per_page,
        )
    }
}

/// Page metadata for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// 1-based page number.
    pub page: u32,
    /// Products per page.
    pub per_page: u32,
    /// Products matching the filters, across all pages.
    pub total: usize,
    /// Pages needed to show `total` products; 0 when there are none.
    pub total_pages: u32,
    /// Whether a later page has products.
    pub has_next: bool,
    /// Whether this is past the first page.
    pub has_prev: bool,
}

impl Pagination {
    fn new(page: u32, per_page: u32, total: usize) -> Self {
        let per = per_page.max(1) as usize;
        let total_pages = u32::try_from(total.div_ceil(per)).unwrap_or(u32::MAX);
        Self {
            page,
            per_page,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{FetchTarget, ScrapeError, ScraperCapability, SourceDescriptor};
    use crate::types::RawListing;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    struct Stub(SourceDescriptor);

    #[async_trait]
    impl ScraperCapability for Stub {
        fn descriptor(&self) -> &SourceDescriptor {
            &self.0
        }

        async fn fetch(&self, _target: &FetchTarget) -> std::result::Result<Vec<RawListing>, ScrapeError> {
            Ok(Vec::new())
        }
    }

    fn registry() -> Registry {
        let mut registry = Registry::new();
        for id in ["amazon", "flipkart"] {
            registry
                .register(Arc::new(Stub(SourceDescriptor::new(id, id))))
                .expect("register");
        }
        registry
    }

    fn product(title: &str, price: i64, rating: Option<f64>, source: &str) -> CanonicalProduct {
        CanonicalProduct {
            title: title.into(),
            price: Decimal::from(price),
            currency: "INR".into(),
            original_price: None,
            discount_percent: None,
            rating,
            rating_count: None,
            url: format!("https://{source}.example/{title}"),
            image_url: None,
            sources: BTreeSet::from([SourceId::new(source)]),
            offers: Vec::new(),
            last_observed: Utc::now(),
        }
    }

    fn products() -> Vec<CanonicalProduct> {
        vec![
            product("a", 300, Some(4.0), "amazon"),
            product("b", 100, None, "flipkart"),
            product("c", 200, Some(4.5), "amazon"),
            product("d", 100, Some(3.0), "flipkart"),
        ]
    }

    fn titles(products: &[CanonicalProduct]) -> Vec<&str> {
        products.iter().map(|p| p.title.as_str()).collect()
    }

    fn validation_message(request: &SearchRequest) -> String {
        match request.validate(100, &registry()) {
            Err(AggregateError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn defaults() {
        let request = SearchRequest::new("mouse");
        assert_eq!(request.page, 1);
        assert_eq!(request.per_page, 20);
        assert_eq!(request.sort, SortKey::Price);
        assert_eq!(request.order, SortOrder::Asc);
        assert!(request.validate(100, &registry()).is_ok());
    }

    #[test]
    fn rejects_blank_and_overlong_queries() {
        assert!(validation_message(&SearchRequest::new("   ")).contains("query"));
        let long = "x".repeat(MAX_QUERY_CHARS + 1);
        assert!(validation_message(&SearchRequest::new(long)).contains("200"));
        let exact = "x".repeat(MAX_QUERY_CHARS);
        assert!(SearchRequest::new(exact).validate(100, &registry()).is_ok());
    }

    #[test]
    fn rejects_bad_paging() {
        assert!(validation_message(&SearchRequest::new("q").page(0, 20)).contains("page"));
        assert!(validation_message(&SearchRequest::new("q").page(1, 0)).contains("per_page"));
        assert!(validation_message(&SearchRequest::new("q").page(1, 101)).contains("per_page"));
        assert!(SearchRequest::new("q").page(1, 100).validate(100, &registry()).is_ok());
    }

    #[test]
    fn rejects_bad_filters() {
        let inverted = SearchRequest::new("q").filtered(SearchFilters {
            min_price: Some(Decimal::from(500)),
            max_price: Some(Decimal::from(100)),
            ..SearchFilters::default()
        });
        assert!(validation_message(&inverted).contains("min_price"));

        let rating = SearchRequest::new("q").filtered(SearchFilters {
            min_rating: Some(5.5),
            ..SearchFilters::default()
        });
        assert!(validation_message(&rating).contains("min_rating"));

        let unknown = SearchRequest::new("q").filtered(SearchFilters {
            sources: vec![SourceId::new("ebay")],
            ..SearchFilters::default()
        });
        assert!(validation_message(&unknown).contains("ebay"));
    }

    #[test]
    fn params_parse_sort_strings() {
        let request = SearchRequest::try_from(SearchParams {
            query: "mouse".into(),
            sort: Some("Rating".into()),
            order: Some("desc".into()),
            sources: vec!["Amazon".into()],
            ..SearchParams::default()
        })
        .expect("valid");
        assert_eq!(request.sort, SortKey::Rating);
        assert_eq!(request.order, SortOrder::Desc);
        assert_eq!(request.filters.sources, [SourceId::new("amazon")]);

        let bad = SearchRequest::try_from(SearchParams {
            query: "mouse".into(),
            sort: Some("popularity".into()),
            ..SearchParams::default()
        });
        assert!(matches!(bad, Err(AggregateError::Validation(_))));
    }

    #[test]
    fn fingerprint_ignores_case_whitespace_and_source_order() {
        let a = SearchRequest::new("  Wireless   Mouse ").filtered(SearchFilters {
            sources: vec![SourceId::new("flipkart"), SourceId::new("amazon")],
            min_price: Some(Decimal::from_str("100.00").expect("decimal")),
            ..SearchFilters::default()
        });
        let b = SearchRequest::new("wireless mouse").filtered(SearchFilters {
            sources: vec![
                SourceId::new("amazon"),
                SourceId::new("flipkart"),
                SourceId::new("amazon"),
            ],
            min_price: Some(Decimal::from(100)),
            ..SearchFilters::default()
        });
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().to_string(), b.fingerprint().to_string());
    }

    #[test]
    fn fingerprint_distinguishes_paging_and_sorting() {
        let base = SearchRequest::new("mouse");
        assert_ne!(base.fingerprint(), base.clone().page(2, 20).fingerprint());
        assert_ne!(
            base.fingerprint(),
            base.clone().sorted_by(SortKey::Price, SortOrder::Desc).fingerprint()
        );
    }

    #[test]
    fn price_sort_is_stable() {
        let (page, _) = SearchRequest::new("q").apply(products());
        assert_eq!(titles(&page), ["b", "d", "c", "a"]);

        let (page, _) = SearchRequest::new("q")
            .sorted_by(SortKey::Price, SortOrder::Desc)
            .apply(products());
        assert_eq!(titles(&page), ["a", "c", "b", "d"]);
    }

    #[test]
    fn rating_sort_treats_missing_as_zero() {
        let (page, _) = SearchRequest::new("q")
            .sorted_by(SortKey::Rating, SortOrder::Desc)
            .apply(products());
        assert_eq!(titles(&page), ["c", "a", "d", "b"]);
    }

    #[test]
    fn relevance_keeps_input_order() {
        let (page, _) = SearchRequest::new("q")
            .sorted_by(SortKey::Relevance, SortOrder::Desc)
            .apply(products());
        assert_eq!(titles(&page), ["a", "b", "c", "d"]);
    }

    #[test]
    fn filters_apply_before_paging() {
        let request = SearchRequest::new("q").filtered(SearchFilters {
            sources: vec![SourceId::new("amazon")],
            min_rating: Some(4.2),
            ..SearchFilters::default()
        });
        let (page, pagination) = request.apply(products());
        assert_eq!(titles(&page), ["c"]);
        assert_eq!(pagination.total, 1);

        let priced = SearchRequest::new("q").filtered(SearchFilters {
            min_price: Some(Decimal::from(100)),
            max_price: Some(Decimal::from(200)),
            ..SearchFilters::default()
        });
        let (page, _) = priced.apply(products());
        assert_eq!(titles(&page), ["b", "d", "c"]);
    }

    #[test]
    fn pagination_metadata() {
        let (page, meta) = SearchRequest::new("q").page(2, 3).apply(products());
        assert_eq!(titles(&page), ["a"]);
        assert_eq!(
            meta,
            Pagination {
                page: 2,
                per_page: 3,
                total: 4,
                total_pages: 2,
                has_next: false,
                has_prev: true,
            }
        );

        let (page, meta) = SearchRequest::new("q").page(5, 3).apply(products());
        assert!(page.is_empty());
        assert!(!meta.has_next);

        let (_, meta) = SearchRequest::new("q").apply(Vec::new());
        assert_eq!(meta.total_pages, 0);
        assert!(!meta.has_next && !meta.has_prev);
    }

    #[test]
    fn unvalidated_page_zero_reads_as_first_page() {
        let (page, meta) = SearchRequest::new("q").page(0, 3).apply(products());
        assert_eq!(titles(&page), ["b", "d", "c"]);
        assert_eq!(meta.total, 4);
        assert!(!meta.has_prev);

        let (page, _) = SearchRequest::new("q").page(0, 20).apply(Vec::new());
        assert!(page.is_empty());
    }
}
