//! Read-side views computed from the store
//!
//! These are the uncached computations; `Tracker` puts the TTL caches in front
//! of them.

use crate::error::StoreResult;
use crate::model::{PriceObservation, ProductStats};
use crate::stats::derive_stats;
use crate::store::{ObservationStore, StatsStore};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// A product of the newest generation with its headline stats
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSummary {
    pub product_id: String,
    pub name: String,
    pub price: Decimal,
    pub url: String,
    pub categories: Vec<String>,
    #[serde(rename = "datetime")]
    pub observed_at: DateTime<Utc>,
    pub lowest_price: Decimal,
    pub regular_price: Decimal,
    pub is_all_time_low: bool,
}

/// Every product of the newest generation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogView {
    /// Generation timestamp, `None` before the first ingestion
    pub datetime: Option<DateTime<Utc>>,
    pub count: usize,
    pub products: Vec<ProductSummary>,
}

/// Newest-generation products listed under one category
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryView {
    pub datetime: Option<DateTime<Utc>>,
    pub category: String,
    pub count: usize,
    pub products: Vec<ProductSummary>,
}

/// One point of a product's price history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Datapoint {
    pub price: Decimal,
    pub categories: Vec<String>,
    pub datetime: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowestPrice {
    pub lowest_price: Decimal,
    pub lowest_price_datetime: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HighestPrice {
    pub highest_price: Decimal,
    pub highest_price_datetime: DateTime<Utc>,
}

/// Full price history and stats of one product
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDetail {
    pub product_id: String,
    pub name: String,
    pub url: String,
    pub datapoints: Vec<Datapoint>,
    pub lowest_price: LowestPrice,
    pub highest_price: HighestPrice,
    pub regular_price: Decimal,
    pub current_price: Decimal,
    pub on_sale: bool,
    pub is_all_time_low: bool,
}

/// Current price is at or below the lowest price ever seen
pub fn is_all_time_low(current: Decimal, lowest: Decimal) -> bool {
    current <= lowest
}

/// Current price is below the regular (modal) price
pub fn is_on_sale(current: Decimal, regular: Decimal) -> bool {
    current < regular
}

/// Stats row for a product, rebuilt from history when the row is missing
fn stats_or_derived<S>(store: &S, product_id: &str) -> StoreResult<Option<ProductStats>>
where
    S: ObservationStore + StatsStore + ?Sized,
{
    if let Some(stats) = store.get_stats(product_id)? {
        return Ok(Some(stats));
    }
    log::warn!("No stats row for {}, deriving from history", product_id);
    let history = store.history(product_id)?;
    Ok(derive_stats(product_id, &history))
}

fn summarize(observation: PriceObservation, stats: Option<ProductStats>) -> ProductSummary {
    let (lowest_price, regular_price) = match stats {
        Some(stats) => (stats.lowest_price, stats.regular_price),
        None => (observation.price, observation.price),
    };

    ProductSummary {
        is_all_time_low: is_all_time_low(observation.price, lowest_price),
        product_id: observation.product_id,
        name: observation.name,
        price: observation.price,
        url: observation.url,
        categories: observation.categories,
        observed_at: observation.observed_at,
        lowest_price,
        regular_price,
    }
}

/// List every product of the newest generation
pub fn load_catalog<S>(store: &S) -> StoreResult<CatalogView>
where
    S: ObservationStore + StatsStore + ?Sized,
{
    let Some(latest) = store.max_observed_at()? else {
        return Ok(CatalogView {
            datetime: None,
            count: 0,
            products: Vec::new(),
        });
    };

    let products = store
        .generation(latest)?
        .into_iter()
        .map(|observation| {
            let stats = stats_or_derived(store, &observation.product_id)?;
            Ok(summarize(observation, stats))
        })
        .collect::<StoreResult<Vec<_>>>()?;

    log::debug!("Computed catalog view: {} products at {}", products.len(), latest);

    Ok(CatalogView {
        datetime: Some(latest),
        count: products.len(),
        products,
    })
}

/// Narrow a catalog view down to one category
pub fn filter_category(catalog: &CatalogView, category: &str) -> CategoryView {
    let products: Vec<ProductSummary> = catalog
        .products
        .iter()
        .filter(|p| p.categories.iter().any(|c| c == category))
        .cloned()
        .collect();

    CategoryView {
        datetime: catalog.datetime,
        category: category.to_string(),
        count: products.len(),
        products,
    }
}

/// Price history and stats of one product, `None` if it was never observed
pub fn load_product_detail<S>(store: &S, product_id: &str) -> StoreResult<Option<ProductDetail>>
where
    S: ObservationStore + StatsStore + ?Sized,
{
    let history = store.history(product_id)?;
    let Some(latest) = history.last() else {
        return Ok(None);
    };
    let (name, url, current_price) = (latest.name.clone(), latest.url.clone(), latest.price);

    let stats = match store.get_stats(product_id)? {
        Some(stats) => stats,
        None => match derive_stats(product_id, &history) {
            Some(stats) => {
                log::warn!("No stats row for {}, derived from history", product_id);
                stats
            }
            None => return Ok(None),
        },
    };

    let datapoints = history
        .into_iter()
        .map(|o| Datapoint {
            price: o.price,
            categories: o.categories,
            datetime: o.observed_at,
        })
        .collect();

    Ok(Some(ProductDetail {
        product_id: product_id.to_string(),
        name,
        url,
        datapoints,
        lowest_price: LowestPrice {
            lowest_price: stats.lowest_price,
            lowest_price_datetime: stats.lowest_price_at,
        },
        highest_price: HighestPrice {
            highest_price: stats.highest_price,
            highest_price_datetime: stats.highest_price_at,
        },
        regular_price: stats.regular_price,
        current_price,
        on_sale: is_on_sale(current_price, stats.regular_price),
        is_all_time_low: is_all_time_low(current_price, stats.lowest_price),
    }))
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
