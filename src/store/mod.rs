//! Persistence interfaces
//!
//! The engine only talks to these traits. `SqliteStore` implements all of
//! them on a single SQLite connection.

mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::StoreResult;
use crate::model::{PriceObservation, ProductStats, RunSummary};
use chrono::{DateTime, Utc};

/// Append-only price history
pub trait ObservationStore {
    /// Persist one observation. The row appears in full or not at all.
    fn append_observation(&self, observation: &PriceObservation) -> StoreResult<()>;

    /// Every observation of a product, oldest first
    fn history(&self, product_id: &str) -> StoreResult<Vec<PriceObservation>>;

    /// Timestamp of the newest generation, `None` when nothing was ingested yet
    fn max_observed_at(&self) -> StoreResult<Option<DateTime<Utc>>>;

    /// All observations stamped with `observed_at`
    fn generation(&self, observed_at: DateTime<Utc>) -> StoreResult<Vec<PriceObservation>>;
}

/// Materialized per-product statistics
pub trait StatsStore {
    fn get_stats(&self, product_id: &str) -> StoreResult<Option<ProductStats>>;

    /// Insert or replace the whole row in one statement
    fn upsert_stats(&self, stats: &ProductStats) -> StoreResult<()>;
}

/// Product image bytes, one per product
pub trait ImageStore {
    fn put_image(&self, product_id: &str, bytes: &[u8]) -> StoreResult<()>;
    fn get_image(&self, product_id: &str) -> StoreResult<Option<Vec<u8>>>;
}

/// Scraper run metadata
pub trait RunLog {
    fn append_run(&self, run: &RunSummary) -> StoreResult<()>;
    fn latest_run(&self) -> StoreResult<Option<RunSummary>>;
}

/// Everything the tracker needs from its backing store
pub trait Store: ObservationStore + StatsStore + ImageStore + RunLog + Send + Sync {}

impl<T> Store for T where T: ObservationStore + StatsStore + ImageStore + RunLog + Send + Sync {}
