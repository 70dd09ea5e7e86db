//! Integration tests for snapshot ingestion against an on-disk database.
//!
//! Archives are built in memory with the same layout the scraper produces:
//! a `prices.json` manifest plus `images/<category>/<id>.jpg` entries.

use price_tracker::{ObservationStore, SqliteStore, StatsStore, Tracker};
use rust_decimal_macros::dec;
use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn archive(manifest: &serde_json::Value, images: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("prices.json", SimpleFileOptions::default())
        .unwrap();
    writer
        .write_all(manifest.to_string().as_bytes())
        .unwrap();
    for (name, bytes) in images {
        writer
            .start_file(name.to_string(), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn listing(id: &str, price: &str, image: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "product_id": id,
        "name": format!("Product {id}"),
        "price": price,
        "url": format!("https://www.example.com/ca/en/products/{id}"),
        "image": image,
    })
}

fn first_snapshot() -> Vec<u8> {
    let manifest = serde_json::json!({
        "metadata": {
            "datetime": "2026-08-01T03:00:00.000000+00:00",
            "scraper_version": "1.4.2",
            "duration_seconds": 812.4,
            "total_products": 3,
            "total_failed": 0,
            "categories_scraped": 2,
            "categories": ["men", "sale"]
        },
        "products": {
            "men": [
                listing("A", "CA $ 10.00", Some("images/men/A.jpg")),
                listing("B", "CA $ 20.00", None)
            ],
            "sale": [listing("A", "CA $ 10.00", Some("images/sale/A.jpg"))]
        }
    });
    archive(&manifest, &[("images/men/A.jpg", b"jpeg A")])
}

fn second_snapshot() -> Vec<u8> {
    let manifest = serde_json::json!({
        "metadata": {"datetime": "2026-08-02T03:00:00Z", "scraper_version": "1.4.2"},
        "products": {"men": [listing("A", "CA $ 8.00", None)]}
    });
    archive(&manifest, &[])
}

fn open(dir: &TempDir) -> Tracker<SqliteStore> {
    let store = SqliteStore::open(&dir.path().join("prices.db")).unwrap();
    Tracker::new(Arc::new(store))
}

mod end_to_end {
    use super::*;

    #[test]
    fn two_snapshots_update_stats() {
        let dir = TempDir::new().unwrap();
        let tracker = open(&dir);

        let t1 = tracker.ingest_bytes(first_snapshot()).unwrap();
        assert_eq!(t1.count, 2);
        assert!(t1.errors.is_empty());

        let a = tracker.store().get_stats("A").unwrap().unwrap();
        assert_eq!(
            (a.lowest_price, a.highest_price, a.regular_price),
            (dec!(10.00), dec!(10.00), dec!(10.00))
        );

        std::thread::sleep(Duration::from_millis(2));
        let t2 = tracker.ingest_bytes(second_snapshot()).unwrap();
        assert_eq!(t2.count, 1);

        let a = tracker.store().get_stats("A").unwrap().unwrap();
        assert_eq!(a.lowest_price, dec!(8.00));
        assert_eq!(a.lowest_price_at, t2.observed_at);
        assert_eq!(a.highest_price, dec!(10.00));
        assert_eq!(a.highest_price_at, t1.observed_at);
        assert_eq!(a.regular_price, dec!(10.00));

        let detail = tracker.product_detail("A").unwrap().unwrap();
        assert_eq!(detail.datapoints.len(), 2);
        assert_eq!(detail.datapoints[0].categories, vec!["men", "sale"]);
        assert!(detail.on_sale);
        assert!(detail.is_all_time_low);

        let run = tracker.latest_run().unwrap().unwrap();
        assert_eq!(run.ingested_at, t2.observed_at);
        assert_eq!(run.products_written, 1);
    }

    #[test]
    fn first_listing_image_is_stored() {
        let dir = TempDir::new().unwrap();
        let tracker = open(&dir);

        let report = tracker.ingest_bytes(first_snapshot()).unwrap();
        assert!(report.warnings.is_empty());
        assert_eq!(
            tracker.product_image("A").unwrap(),
            Some(b"jpeg A".to_vec())
        );
        assert_eq!(tracker.product_image("B").unwrap(), None);
    }

    #[test]
    fn history_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let observed_at = {
            let tracker = open(&dir);
            tracker.ingest_bytes(first_snapshot()).unwrap().observed_at
        };

        let tracker = open(&dir);
        let catalog = tracker.catalog().unwrap();
        assert_eq!(catalog.datetime, Some(observed_at));
        assert_eq!(catalog.count, 2);
        assert_eq!(tracker.store().history("B").unwrap().len(), 1);
    }

    #[test]
    fn malformed_upload_has_no_side_effects() {
        let dir = TempDir::new().unwrap();
        let tracker = open(&dir);

        assert!(tracker.ingest_bytes(b"PK\x03\x04 truncated".to_vec()).is_err());

        let bad_manifest = {
            let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
            writer
                .start_file("prices.json", SimpleFileOptions::default())
                .unwrap();
            writer.write_all(b"{\"products\": [1, 2]}").unwrap();
            writer.finish().unwrap().into_inner()
        };
        assert!(tracker.ingest_bytes(bad_manifest).is_err());

        assert_eq!(tracker.store().observation_count().unwrap(), 0);
        assert_eq!(tracker.store().stats_count().unwrap(), 0);
        assert_eq!(tracker.store().max_observed_at().unwrap(), None);
        assert!(tracker.latest_run().unwrap().is_none());
    }
}

mod concurrency {
    use super::*;

    #[test]
    fn reads_after_ingestion_never_see_previous_generation() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(open(&dir));
        tracker.ingest_bytes(first_snapshot()).unwrap();
        let before = tracker.catalog().unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let tracker = Arc::clone(&tracker);
                scope.spawn(move || {
                    for _ in 0..50 {
                        tracker.catalog().unwrap();
                        tracker.product_detail("A").unwrap();
                    }
                });
            }

            std::thread::sleep(Duration::from_millis(2));
            let report = tracker.ingest_bytes(second_snapshot()).unwrap();

            let after = tracker.catalog().unwrap();
            assert_eq!(after.datetime, Some(report.observed_at));
            assert_ne!(after.datetime, before.datetime);
            let detail = tracker.product_detail("A").unwrap().unwrap();
            assert_eq!(detail.current_price, dec!(8.00));
        });
    }

    #[test]
    fn concurrent_ingestions_keep_stats_consistent() {
        let dir = TempDir::new().unwrap();
        let tracker = Arc::new(open(&dir));

        std::thread::scope(|scope| {
            for snapshot in [first_snapshot(), second_snapshot(), first_snapshot()] {
                let tracker = Arc::clone(&tracker);
                scope.spawn(move || tracker.ingest_bytes(snapshot).unwrap());
            }
        });

        let history = tracker.store().history("A").unwrap();
        let stats = tracker.store().get_stats("A").unwrap().unwrap();
        let min = history.iter().map(|o| o.price).min().unwrap();
        let max = history.iter().map(|o| o.price).max().unwrap();
        assert_eq!(stats.lowest_price, min);
        assert_eq!(stats.highest_price, max);
        assert_eq!(stats.regular_price, dec!(10.00));
    }
}
