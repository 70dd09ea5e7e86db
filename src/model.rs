//! Persisted domain records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One product's price as seen by one ingestion. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub product_id: String,
    pub name: String,
    pub url: String,
    pub price: Decimal,
    pub categories: Vec<String>,
    pub observed_at: DateTime<Utc>,
}

/// Running price statistics for one product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductStats {
    pub product_id: String,
    pub lowest_price: Decimal,
    pub lowest_price_at: DateTime<Utc>,
    pub highest_price: Decimal,
    pub highest_price_at: DateTime<Utc>,
    pub regular_price: Decimal,
}

impl ProductStats {
    /// Stats for a product seen exactly once
    pub fn first(product_id: &str, price: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            product_id: product_id.to_string(),
            lowest_price: price,
            lowest_price_at: at,
            highest_price: price,
            highest_price_at: at,
            regular_price: price,
        }
    }
}

/// Summary of one scraper run, written once per ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Scrape time declared by the scraper (ingestion time if unparsable)
    pub snapshot_at: DateTime<Utc>,
    pub scraper_version: String,
    pub duration_seconds: f64,
    pub total_products: u64,
    pub total_failed: u64,
    pub categories_scraped: u64,
    pub categories: Vec<String>,
    /// Generation timestamp shared by every observation of this run
    pub ingested_at: DateTime<Utc>,
    pub products_written: u64,
    pub products_failed: u64,
}
