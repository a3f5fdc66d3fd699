//! Best-by highlighting and discount computation over merged products.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::CanonicalProduct;

/// The winning value of one comparison and every product that reaches it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Best<T> {
    /// The best value.
    pub value: T,
    /// Indices into the compared slice, ascending. Ties list every index.
    pub indices: Vec<usize>,
}

impl<T> Best<T> {
    fn new(value: T, index: usize) -> Self {
        Self {
            value,
            indices: vec![index],
        }
    }
}

/// Highlights across a product list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BestBy {
    /// Lowest price per currency; prices in different currencies are not
    /// compared.
    pub lowest_price: BTreeMap<String, Best<Decimal>>,
    /// Highest rating among rated products.
    pub highest_rating: Option<Best<f64>>,
}

/// Find the cheapest and best-rated products.
pub fn best_by(products: &[CanonicalProduct]) -> BestBy {
    let mut best = BestBy::default();

    for (index, product) in products.iter().enumerate() {
        match best.lowest_price.get_mut(&product.currency) {
            Some(current) if product.price < current.value => {
                *current = Best::new(product.price, index);
            }
            Some(current) if product.price == current.value => current.indices.push(index),
            Some(_) => {}
            None => {
                best.lowest_price
                    .insert(product.currency.clone(), Best::new(product.price, index));
            }
        }

        if let Some(rating) = product.rating {
            match &mut best.highest_rating {
                Some(current) if rating > current.value => *current = Best::new(rating, index),
                Some(current) if rating == current.value => current.indices.push(index),
                Some(_) => {}
                None => best.highest_rating = Some(Best::new(rating, index)),
            }
        }
    }

    best
}

/// Discount of a product against its original price, in percent.
pub fn discount_percent(product: &CanonicalProduct) -> Option<Decimal> {
    discount(product.price, product.original_price)
}

/// Percent off `original` that `price` represents, to one decimal place.
///
/// `None` without an original price or when it is not above `price`.
pub fn discount(price: Decimal, original: Option<Decimal>) -> Option<Decimal> {
    let original = original.filter(|o| *o > price && *o > Decimal::ZERO)?;
    let percent = (original - price) / original * Decimal::ONE_HUNDRED;
    Some(percent.round_dp(1))
}
