//! Price Tracker - retail price history from scraper snapshots
//!
//! Ingests scraped product snapshots into a SQLite price history, keeps
//! per-product lowest/highest/regular price statistics and serves cached
//! catalog and product views over HTTP.

pub mod cache;
pub mod catalog;
pub mod client;
pub mod consolidate;
pub mod error;
pub mod ingest;
pub mod model;
pub mod price;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod tracker;
pub mod web;

pub use catalog::{CatalogView, CategoryView, ProductDetail, ProductSummary};
pub use error::{PriceParseError, Result, SnapshotError, StoreError, TrackerError};
pub use ingest::{IngestReport, Issue, Stage};
pub use model::{PriceObservation, ProductStats, RunSummary};
pub use snapshot::{decode, Listing, Snapshot, SnapshotMetadata};
pub use store::{ImageStore, ObservationStore, RunLog, SqliteStore, StatsStore, Store};
pub use tracker::{ProductListing, Tracker};
