//! Merges per-category listings into one record per product

use crate::error::PriceParseError;
use crate::price::parse_price;
use crate::snapshot::Listing;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// A product merged across every category it was listed under
#[derive(Debug, Clone, PartialEq)]
pub struct ConsolidatedProduct {
    pub product_id: String,
    pub name: String,
    pub url: String,
    pub price: Decimal,
    /// Archive key of the product image, taken from the first listing
    pub image: Option<String>,
    /// Every category the product appeared in, without duplicates
    pub categories: Vec<String>,
}

/// Why a listing produced no consolidated record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    /// Listing had no product ID
    MissingProductId { category: String },
    /// First listing of the product carried an unparsable price
    InvalidPrice {
        product_id: String,
        raw_price: String,
        reason: String,
    },
}

/// Outcome of consolidating one snapshot
#[derive(Debug, Default)]
pub struct Consolidation {
    /// Products in first-seen order
    pub products: Vec<ConsolidatedProduct>,
    pub rejected: Vec<Rejection>,
}

#[derive(Clone, Copy)]
enum Slot {
    Accepted(usize),
    Rejected,
}

/// Consolidate listings keyed by category.
///
/// Categories are visited in sorted order and listings in document order, so
/// the first-seen listing of a product (which supplies name, URL, image and
/// price) is deterministic. Later listings only contribute their category.
pub fn consolidate(categories: &BTreeMap<String, Vec<Listing>>) -> Consolidation {
    let mut result = Consolidation::default();
    let mut seen: HashMap<String, Slot> = HashMap::new();

    for (category, listings) in categories {
        for listing in listings {
            let product_id = match listing.product_id.as_deref().map(str::trim) {
                Some(id) if !id.is_empty() => id,
                _ => {
                    result.rejected.push(Rejection::MissingProductId {
                        category: category.clone(),
                    });
                    continue;
                }
            };

            match seen.get(product_id).copied() {
                Some(Slot::Accepted(index)) => {
                    let product = &mut result.products[index];
                    if !product.categories.contains(category) {
                        product.categories.push(category.clone());
                    }
                }
                Some(Slot::Rejected) => {}
                None => {
                    let slot = match parse_price(&listing.price) {
                        Ok(price) => {
                            result.products.push(ConsolidatedProduct {
                                product_id: product_id.to_string(),
                                name: listing.name.clone(),
                                url: listing.url.clone(),
                                price,
                                image: listing.image.clone(),
                                categories: vec![category.clone()],
                            });
                            Slot::Accepted(result.products.len() - 1)
                        }
                        Err(e) => {
                            result.rejected.push(invalid_price(product_id, listing, &e));
                            Slot::Rejected
                        }
                    };
                    seen.insert(product_id.to_string(), slot);
                }
            }
        }
    }

    result
}

fn invalid_price(product_id: &str, listing: &Listing, err: &PriceParseError) -> Rejection {
    Rejection::InvalidPrice {
        product_id: product_id.to_string(),
        raw_price: listing.price.clone(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
#[path = "consolidate_tests.rs"]
mod tests;
