//! Fuzzy deduplication of normalised listings into canonical products.
//!
//! Greedy single-link clustering in input order: each listing is scored
//! against the representative (first member) of every existing group and
//! joins the best-scoring group at or above the threshold, or starts a
//! new one. Equal best scores go to the earliest group. Listings priced in
//! different currencies never share a group.
//!
//! The result depends only on the input order, which the orchestrator
//! fixes to registry order.

use std::collections::BTreeSet;

use rust_decimal::Decimal;

use crate::compare::discount;
use crate::types::{CanonicalListing, CanonicalProduct, Offer};

use super::similarity::similarity;

/// Listings judged to describe the same product.
#[derive(Debug, Clone)]
pub struct MergeGroup {
    members: Vec<CanonicalListing>,
}

impl MergeGroup {
    fn new(first: CanonicalListing) -> Self {
        Self {
            members: vec![first],
        }
    }

    /// The first listing inserted; all match decisions compare against it.
    pub fn representative(&self) -> &CanonicalListing {
        &self.members[0]
    }

    /// All members in insertion order.
    pub fn members(&self) -> &[CanonicalListing] {
        &self.members
    }

    /// Merge the group into one canonical product.
    ///
    /// Price is the minimum observed; title, url and match key come from
    /// the representative; rating is the mean of present ratings; sources
    /// are the union of contributors.
    pub fn into_product(self) -> CanonicalProduct {
        let rep = &self.members[0];

        let price = self
            .members
            .iter()
            .map(|m| m.price)
            .min()
            .unwrap_or(rep.price);
        let original_price: Option<Decimal> =
            self.members.iter().filter_map(|m| m.original_price).max();

        let ratings: Vec<f64> = self.members.iter().filter_map(|m| m.rating).collect();
        let rating = (!ratings.is_empty()).then(|| ratings.iter().sum::<f64>() / ratings.len() as f64);

        let counts: Vec<u64> = self.members.iter().filter_map(|m| m.rating_count).collect();
        let rating_count =
            (!counts.is_empty()).then(|| counts.iter().fold(0u64, |a, &c| a.saturating_add(c)));

        let image_url = rep
            .image_url
            .clone()
            .or_else(|| self.members.iter().find_map(|m| m.image_url.clone()));
        let last_observed = self
            .members
            .iter()
            .map(|m| m.observed_at)
            .max()
            .unwrap_or(rep.observed_at);
        let sources: BTreeSet<_> = self.members.iter().map(|m| m.source.clone()).collect();
        let offers = self
            .members
            .iter()
            .map(|m| Offer {
                source: m.source.clone(),
                url: m.url.clone(),
                price: m.price,
                availability: m.availability.clone(),
            })
            .collect();

        CanonicalProduct {
            title: rep.title.clone(),
            price,
            currency: rep.currency.clone(),
            original_price,
            discount_percent: discount(price, original_price),
            rating,
            rating_count,
            url: rep.url.clone(),
            image_url,
            sources,
            offers,
            last_observed,
        }
    }
}

/// Cluster listings into merge groups, in input order.
pub fn cluster(listings: Vec<CanonicalListing>, threshold: f64) -> Vec<MergeGroup> {
    let mut groups: Vec<MergeGroup> = Vec::new();

    for listing in listings {
        let mut best: Option<(usize, f64)> = None;
        for (index, group) in groups.iter().enumerate() {
            let rep = group.representative();
            if rep.currency != listing.currency {
                continue;
            }
            let score = similarity(&rep.match_key, &listing.match_key);
            if score >= threshold && best.map_or(true, |(_, s)| score > s) {
                best = Some((index, score));
            }
        }

        match best {
            Some((index, score)) => {
                tracing::trace!(title = %listing.title, group = index, score, "merging listing");
                groups[index].members.push(listing);
            }
            None => groups.push(MergeGroup::new(listing)),
        }
    }

    groups
}

/// Deduplicate listings into canonical products.
///
/// Output order follows group creation order, i.e. the position of each
/// group's representative in the input.
pub fn deduplicate(listings: Vec<CanonicalListing>, threshold: f64) -> Vec<CanonicalProduct> {
    cluster(listings, threshold)
        .into_iter()
        .map(MergeGroup::into_product)
        .collect()
}
