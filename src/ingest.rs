//! Snapshot ingestion
//!
//! Turns one decoded snapshot into one generation of observations, updates
//! per-product stats, attaches images and records the run. Only a malformed
//! container fails the whole request (at decode time); everything after that
//! is best-effort and reported through `IngestReport`.

use crate::consolidate::{consolidate, ConsolidatedProduct, Rejection};
use crate::model::{PriceObservation, RunSummary};
use crate::snapshot::Snapshot;
use crate::stats::update_stats;
use crate::store::Store;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Step of the pipeline an issue was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    MissingProductId,
    Price,
    Observation,
    Stats,
    Image,
    RunLog,
}

/// One soft failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub stage: Stage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub message: String,
}

/// Outcome of one ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Products whose observation was written
    pub count: u64,
    /// Unique products found after consolidation
    pub consolidated: u64,
    /// Generation timestamp shared by every written observation
    pub observed_at: DateTime<Utc>,
    /// Items that produced no observation
    pub errors: Vec<Issue>,
    /// Failures that did not prevent the observation write
    pub warnings: Vec<Issue>,
}

impl IngestReport {
    fn new(observed_at: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            consolidated: 0,
            observed_at,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn error(&mut self, stage: Stage, product_id: Option<&str>, message: String) {
        log::warn!(
            "Ingest error ({:?}) for {}: {}",
            stage,
            product_id.unwrap_or("-"),
            message
        );
        self.errors.push(Issue {
            stage,
            product_id: product_id.map(str::to_string),
            message,
        });
    }

    fn warning(&mut self, stage: Stage, product_id: Option<&str>, message: String) {
        log::warn!(
            "Ingest warning ({:?}) for {}: {}",
            stage,
            product_id.unwrap_or("-"),
            message
        );
        self.warnings.push(Issue {
            stage,
            product_id: product_id.map(str::to_string),
            message,
        });
    }

    fn reject(&mut self, rejection: &Rejection) {
        match rejection {
            Rejection::MissingProductId { category } => self.error(
                Stage::MissingProductId,
                None,
                format!("listing without product_id in category {}", category),
            ),
            Rejection::InvalidPrice {
                product_id, reason, ..
            } => self.error(Stage::Price, Some(product_id), reason.clone()),
        }
    }
}

/// Ingest a snapshot stamped with the current time
pub fn ingest<S: Store + ?Sized>(store: &S, snapshot: &mut Snapshot) -> IngestReport {
    let observed_at = next_generation_at(store, Utc::now().trunc_subsecs(6));
    ingest_at(store, snapshot, observed_at)
}

/// Timestamp for a new generation: `now`, unless the newest stored
/// generation is not older than `now` (clock stepped back), in which case one
/// microsecond after it.
pub(crate) fn next_generation_at<S: Store + ?Sized>(
    store: &S,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match store.max_observed_at() {
        Ok(Some(latest)) if latest >= now => {
            log::warn!(
                "Clock is behind newest generation {} (now {}), stamping after it",
                latest,
                now
            );
            latest + Duration::microseconds(1)
        }
        Ok(_) => now,
        Err(e) => {
            log::warn!("Failed to read newest generation, using current time: {}", e);
            now
        }
    }
}

/// Ingest a snapshot as the generation `observed_at`
pub fn ingest_at<S: Store + ?Sized>(
    store: &S,
    snapshot: &mut Snapshot,
    observed_at: DateTime<Utc>,
) -> IngestReport {
    let mut report = IngestReport::new(observed_at);

    let consolidation = consolidate(&snapshot.categories);
    report.consolidated = consolidation.products.len() as u64;
    for rejection in &consolidation.rejected {
        report.reject(rejection);
    }

    log::info!(
        "Ingesting {} products from {} listings",
        consolidation.products.len(),
        snapshot.listing_count()
    );

    for product in &consolidation.products {
        if record_product(store, snapshot, product, observed_at, &mut report) {
            report.count += 1;
        }
    }

    record_run(store, snapshot, observed_at, &mut report);

    log::info!(
        "Ingestion at {} done: {} written, {} errors, {} warnings",
        observed_at,
        report.count,
        report.errors.len(),
        report.warnings.len()
    );
    report
}

/// Write one product's observation, stats and image. Returns whether the
/// observation was written.
fn record_product<S: Store + ?Sized>(
    store: &S,
    snapshot: &mut Snapshot,
    product: &ConsolidatedProduct,
    observed_at: DateTime<Utc>,
    report: &mut IngestReport,
) -> bool {
    let id = product.product_id.as_str();
    let observation = PriceObservation {
        product_id: product.product_id.clone(),
        name: product.name.clone(),
        url: product.url.clone(),
        price: product.price,
        categories: product.categories.clone(),
        observed_at,
    };

    if let Err(e) = store.append_observation(&observation) {
        report.error(Stage::Observation, Some(id), e.to_string());
        return false;
    }

    match update_stats(store, id, product.price, observed_at) {
        Ok(stats) => log::debug!(
            "{} at {} (low {}, high {}, regular {})",
            id,
            product.price,
            stats.lowest_price,
            stats.highest_price,
            stats.regular_price
        ),
        Err(e) => report.warning(Stage::Stats, Some(id), e.to_string()),
    }

    if let Some(key) = product.image.as_deref() {
        match snapshot.image(key) {
            Ok(Some(bytes)) => {
                if let Err(e) = store.put_image(id, &bytes) {
                    report.warning(Stage::Image, Some(id), e.to_string());
                }
            }
            Ok(None) => report.warning(
                Stage::Image,
                Some(id),
                format!("image {} not found in snapshot", key),
            ),
            Err(e) => report.warning(Stage::Image, Some(id), e.to_string()),
        }
    }

    true
}

fn record_run<S: Store + ?Sized>(
    store: &S,
    snapshot: &Snapshot,
    observed_at: DateTime<Utc>,
    report: &mut IngestReport,
) {
    let metadata = &snapshot.metadata;
    let snapshot_at = metadata.declared_at().unwrap_or_else(|| {
        log::warn!(
            "Unparsable snapshot datetime {:?}, using ingestion time",
            metadata.datetime
        );
        observed_at
    });

    let run = RunSummary {
        snapshot_at,
        scraper_version: metadata.scraper_version.clone(),
        duration_seconds: metadata.duration_seconds,
        total_products: metadata.total_products,
        total_failed: metadata.total_failed,
        categories_scraped: metadata.categories_scraped,
        categories: metadata.categories.clone(),
        ingested_at: observed_at,
        products_written: report.count,
        products_failed: report.errors.len() as u64,
    };

    if let Err(e) = store.append_run(&run) {
        report.warning(Stage::RunLog, None, e.to_string());
    }
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
