//! SQLite-backed store
//!
//! Uses parameterized queries exclusively (no SQL string concatenation).
//! Prices are stored as normalised decimal text, timestamps as RFC 3339 text
//! with microsecond precision, so `MAX(datetime)` orders correctly.

use super::{ImageStore, ObservationStore, RunLog, StatsStore};
use crate::error::{StoreError, StoreResult};
use crate::model::{PriceObservation, ProductStats, RunSummary};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

/// Store implementation on a single shared SQLite connection
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file and initialize the schema
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        log::info!("Opened database: {}", path.display());
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Total number of stored observations
    pub fn observation_count(&self) -> StoreResult<u64> {
        let conn = self.conn.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?)
    }

    /// Total number of stats rows
    pub fn stats_count(&self) -> StoreResult<u64> {
        let conn = self.conn.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM stats", [], |row| row.get(0))?)
    }
}

/// Initialize the database schema
///
/// Creates tables if they don't exist:
/// - `products`: one row per product per ingestion (price history)
/// - `stats`: lowest/highest/regular price per product
/// - `images`: latest image per product
/// - `scraper`: one row per scraper run
fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS products (
            product_id TEXT NOT NULL,
            name TEXT NOT NULL,
            price TEXT NOT NULL,
            url TEXT NOT NULL,
            category TEXT NOT NULL,
            datetime TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_products_product ON products(product_id);
        CREATE INDEX IF NOT EXISTS idx_products_datetime ON products(datetime);

        CREATE TABLE IF NOT EXISTS stats (
            product_id TEXT PRIMARY KEY,
            lowest_price TEXT NOT NULL,
            lowest_price_datetime TEXT NOT NULL,
            highest_price TEXT NOT NULL,
            highest_price_datetime TEXT NOT NULL,
            regular_price TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS images (
            product_id TEXT PRIMARY KEY,
            image BLOB NOT NULL,
            last_updated TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS scraper (
            datetime TEXT NOT NULL,
            scraper_version TEXT NOT NULL,
            duration_seconds REAL NOT NULL,
            total_products INTEGER NOT NULL,
            total_failed INTEGER NOT NULL,
            categories_scraped INTEGER NOT NULL,
            categories TEXT NOT NULL,
            ingested_at TEXT NOT NULL,
            products_written INTEGER NOT NULL,
            products_failed INTEGER NOT NULL
        );
        ",
    )?;

    log::debug!("Database schema initialized");
    Ok(())
}

fn encode_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(column: &'static str, value: String) -> StoreResult<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(&value) {
        Ok(dt) => Ok(dt.with_timezone(&Utc)),
        Err(_) => Err(StoreError::InvalidValue { column, value }),
    }
}

fn decode_price(column: &'static str, value: String) -> StoreResult<Decimal> {
    match Decimal::from_str(&value) {
        Ok(price) => Ok(price),
        Err(_) => Err(StoreError::InvalidValue { column, value }),
    }
}

fn decode_categories(value: String) -> StoreResult<Vec<String>> {
    match serde_json::from_str(&value) {
        Ok(categories) => Ok(categories),
        Err(_) => Err(StoreError::InvalidValue {
            column: "category",
            value,
        }),
    }
}

/// Raw `products` row before decoding
struct ObservationRow {
    product_id: String,
    name: String,
    price: String,
    url: String,
    category: String,
    datetime: String,
}

impl ObservationRow {
    const COLUMNS: &'static str = "product_id, name, price, url, category, datetime";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            product_id: row.get(0)?,
            name: row.get(1)?,
            price: row.get(2)?,
            url: row.get(3)?,
            category: row.get(4)?,
            datetime: row.get(5)?,
        })
    }

    fn decode(self) -> StoreResult<PriceObservation> {
        Ok(PriceObservation {
            product_id: self.product_id,
            name: self.name,
            url: self.url,
            price: decode_price("price", self.price)?,
            categories: decode_categories(self.category)?,
            observed_at: decode_time("datetime", self.datetime)?,
        })
    }
}

impl ObservationStore for SqliteStore {
    fn append_observation(&self, observation: &PriceObservation) -> StoreResult<()> {
        let categories = serde_json::to_string(&observation.categories).map_err(|_| {
            StoreError::InvalidValue {
                column: "category",
                value: format!("{:?}", observation.categories),
            }
        })?;

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO products (product_id, name, price, url, category, datetime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        stmt.execute(params![
            &observation.product_id,
            &observation.name,
            observation.price.to_string(),
            &observation.url,
            categories,
            encode_time(observation.observed_at),
        ])?;
        Ok(())
    }

    fn history(&self, product_id: &str) -> StoreResult<Vec<PriceObservation>> {
        let rows: Vec<ObservationRow> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM products WHERE product_id = ?1 ORDER BY datetime ASC, rowid ASC",
                ObservationRow::COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![product_id], ObservationRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        rows.into_iter().map(ObservationRow::decode).collect()
    }

    fn max_observed_at(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let latest: Option<String> = {
            let conn = self.conn.lock();
            conn.query_row("SELECT MAX(datetime) FROM products", [], |row| row.get(0))?
        };
        latest.map(|value| decode_time("datetime", value)).transpose()
    }

    fn generation(&self, observed_at: DateTime<Utc>) -> StoreResult<Vec<PriceObservation>> {
        let rows: Vec<ObservationRow> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM products WHERE datetime = ?1 ORDER BY rowid ASC",
                ObservationRow::COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![encode_time(observed_at)], ObservationRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        rows.into_iter().map(ObservationRow::decode).collect()
    }
}

impl StatsStore for SqliteStore {
    fn get_stats(&self, product_id: &str) -> StoreResult<Option<ProductStats>> {
        let row: Option<[String; 5]> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT lowest_price, lowest_price_datetime, highest_price,
                        highest_price_datetime, regular_price
                 FROM stats WHERE product_id = ?1",
                params![product_id],
                |row| Ok([row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?]),
            )
            .optional()?
        };

        let Some([lowest, lowest_at, highest, highest_at, regular]) = row else {
            return Ok(None);
        };

        Ok(Some(ProductStats {
            product_id: product_id.to_string(),
            lowest_price: decode_price("lowest_price", lowest)?,
            lowest_price_at: decode_time("lowest_price_datetime", lowest_at)?,
            highest_price: decode_price("highest_price", highest)?,
            highest_price_at: decode_time("highest_price_datetime", highest_at)?,
            regular_price: decode_price("regular_price", regular)?,
        }))
    }

    fn upsert_stats(&self, stats: &ProductStats) -> StoreResult<()> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO stats (product_id, lowest_price, lowest_price_datetime,
                                highest_price, highest_price_datetime, regular_price)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (product_id) DO UPDATE SET
                lowest_price = excluded.lowest_price,
                lowest_price_datetime = excluded.lowest_price_datetime,
                highest_price = excluded.highest_price,
                highest_price_datetime = excluded.highest_price_datetime,
                regular_price = excluded.regular_price",
        )?;
        stmt.execute(params![
            &stats.product_id,
            stats.lowest_price.to_string(),
            encode_time(stats.lowest_price_at),
            stats.highest_price.to_string(),
            encode_time(stats.highest_price_at),
            stats.regular_price.to_string(),
        ])?;
        Ok(())
    }
}

impl ImageStore for SqliteStore {
    fn put_image(&self, product_id: &str, bytes: &[u8]) -> StoreResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO images (product_id, image) VALUES (?1, ?2)
             ON CONFLICT (product_id) DO UPDATE SET
                image = excluded.image,
                last_updated = datetime('now')",
            params![product_id, bytes],
        )?;
        Ok(())
    }

    fn get_image(&self, product_id: &str) -> StoreResult<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let image = conn
            .query_row(
                "SELECT image FROM images WHERE product_id = ?1",
                params![product_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(image)
    }
}

impl RunLog for SqliteStore {
    fn append_run(&self, run: &RunSummary) -> StoreResult<()> {
        let categories = run.categories.join(",");
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO scraper (datetime, scraper_version, duration_seconds, total_products,
                                  total_failed, categories_scraped, categories, ingested_at,
                                  products_written, products_failed)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                encode_time(run.snapshot_at),
                &run.scraper_version,
                run.duration_seconds,
                run.total_products,
                run.total_failed,
                run.categories_scraped,
                categories,
                encode_time(run.ingested_at),
                run.products_written,
                run.products_failed,
            ],
        )?;
        Ok(())
    }

    fn latest_run(&self) -> StoreResult<Option<RunSummary>> {
        type RawRun = (String, String, f64, u64, u64, u64, String, String, u64, u64);

        let raw: Option<RawRun> = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT datetime, scraper_version, duration_seconds, total_products, total_failed,
                        categories_scraped, categories, ingested_at, products_written,
                        products_failed
                 FROM scraper ORDER BY ingested_at DESC, rowid DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                        row.get(9)?,
                    ))
                },
            )
            .optional()?
        };

        let Some((
            snapshot_at,
            scraper_version,
            duration_seconds,
            total_products,
            total_failed,
            categories_scraped,
            categories,
            ingested_at,
            products_written,
            products_failed,
        )) = raw
        else {
            return Ok(None);
        };

        Ok(Some(RunSummary {
            snapshot_at: decode_time("datetime", snapshot_at)?,
            scraper_version,
            duration_seconds,
            total_products,
            total_failed,
            categories_scraped,
            categories: categories
                .split(',')
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
            ingested_at: decode_time("ingested_at", ingested_at)?,
            products_written,
            products_failed,
        }))
    }
}

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;
