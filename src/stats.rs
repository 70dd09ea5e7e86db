//! Per-product price statistics
//!
//! Lowest and highest prices are maintained incrementally. The regular price
//! is the mode of the whole price history and is recomputed on every update.

use crate::error::StoreResult;
use crate::model::{PriceObservation, ProductStats};
use crate::store::{ObservationStore, StatsStore};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Most frequent price; ties go to the higher price.
///
/// Returns `None` for an empty input.
pub fn regular_price<I>(prices: I) -> Option<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    let mut counts: BTreeMap<Decimal, usize> = BTreeMap::new();
    for price in prices {
        *counts.entry(price).or_insert(0) += 1;
    }

    counts
        .into_iter()
        .max_by(|(price_a, count_a), (price_b, count_b)| {
            count_a.cmp(count_b).then(price_a.cmp(price_b))
        })
        .map(|(price, _)| price)
}

/// Record a new observation in a product's stats row.
///
/// The observation itself must already be persisted: the regular price is
/// computed over the stored history. The updated row is written with a single
/// upsert.
pub fn update_stats<S>(
    store: &S,
    product_id: &str,
    price: Decimal,
    at: DateTime<Utc>,
) -> StoreResult<ProductStats>
where
    S: ObservationStore + StatsStore + ?Sized,
{
    let Some(mut stats) = store.get_stats(product_id)? else {
        let stats = ProductStats::first(product_id, price, at);
        store.upsert_stats(&stats)?;
        log::debug!("Created stats for {} at {}", product_id, price);
        return Ok(stats);
    };

    if price < stats.lowest_price {
        stats.lowest_price = price;
        stats.lowest_price_at = at;
    }
    if price > stats.highest_price {
        stats.highest_price = price;
        stats.highest_price_at = at;
    }

    let history = store.history(product_id)?;
    stats.regular_price = regular_price(history.iter().map(|o| o.price)).unwrap_or(price);

    store.upsert_stats(&stats)?;
    Ok(stats)
}

/// Rebuild stats from a price history when no stats row exists.
///
/// Lowest and highest carry the timestamp of the first observation that
/// reached them. Returns `None` for an empty history.
pub fn derive_stats(product_id: &str, history: &[PriceObservation]) -> Option<ProductStats> {
    let (first, rest) = history.split_first()?;
    let mut stats = ProductStats::first(product_id, first.price, first.observed_at);

    for observation in rest {
        if observation.price < stats.lowest_price {
            stats.lowest_price = observation.price;
            stats.lowest_price_at = observation.observed_at;
        }
        if observation.price > stats.highest_price {
            stats.highest_price = observation.price;
            stats.highest_price_at = observation.observed_at;
        }
    }

    stats.regular_price = regular_price(history.iter().map(|o| o.price))?;
    Some(stats)
}

#[cfg(test)]
#[path = "stats_tests.rs"]
mod tests;
