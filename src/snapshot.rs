//! Scraper snapshot decoding
//!
//! A snapshot is a ZIP archive holding a `prices.json` manifest (run metadata
//! plus product listings per category) and the product images referenced by
//! the listings.

use crate::error::SnapshotError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

/// Name of the mandatory manifest entry
pub const MANIFEST_NAME: &str = "prices.json";

/// Largest image entry read from an archive
pub const MAX_IMAGE_BYTES: u64 = 16 * 1024 * 1024;

/// Run metadata written by the scraper
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    #[serde(default)]
    pub datetime: String,
    #[serde(default)]
    pub scraper_version: String,
    #[serde(default)]
    pub duration_seconds: f64,
    #[serde(default)]
    pub total_products: u64,
    #[serde(default)]
    pub total_failed: u64,
    #[serde(default)]
    pub categories_scraped: u64,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl SnapshotMetadata {
    /// Declared scrape time, if it is a valid RFC 3339 timestamp
    pub fn declared_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(self.datetime.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// One product as listed under one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub price: String,
    #[serde(default)]
    pub url: String,
    /// Archive path of the product image
    #[serde(default)]
    pub image: Option<String>,
}

/// Manifest file structure
#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    metadata: SnapshotMetadata,
    #[serde(default)]
    products: BTreeMap<String, Vec<Listing>>,
}

enum ImageSource {
    Archive(ZipArchive<Cursor<Vec<u8>>>),
    Memory(HashMap<String, Vec<u8>>),
}

/// A decoded snapshot
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    /// Listings keyed by category name
    pub categories: BTreeMap<String, Vec<Listing>>,
    images: ImageSource,
}

impl Snapshot {
    /// Build a snapshot without an archive (images added with `with_image`)
    pub fn new(metadata: SnapshotMetadata, categories: BTreeMap<String, Vec<Listing>>) -> Self {
        Self {
            metadata,
            categories,
            images: ImageSource::Memory(HashMap::new()),
        }
    }

    /// Attach an image under an archive key. Ignored for archive-backed snapshots.
    pub fn with_image(mut self, key: &str, bytes: Vec<u8>) -> Self {
        if let ImageSource::Memory(map) = &mut self.images {
            map.insert(key.to_string(), bytes);
        }
        self
    }

    /// Total number of listings across all categories (duplicates included)
    pub fn listing_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    /// Read the image stored under `key`.
    ///
    /// Returns `Ok(None)` when the snapshot has no such entry.
    pub fn image(&mut self, key: &str) -> Result<Option<Vec<u8>>, SnapshotError> {
        match &mut self.images {
            ImageSource::Archive(archive) => match archive.by_name(key) {
                Ok(entry) => {
                    // declared sizes come from the archive and are not trusted
                    if entry.size() > MAX_IMAGE_BYTES {
                        return Err(too_large(key, entry.size()));
                    }
                    let mut bytes = Vec::new();
                    entry.take(MAX_IMAGE_BYTES + 1).read_to_end(&mut bytes)?;
                    if bytes.len() as u64 > MAX_IMAGE_BYTES {
                        return Err(too_large(key, bytes.len() as u64));
                    }
                    Ok(Some(bytes))
                }
                Err(ZipError::FileNotFound) => Ok(None),
                Err(e) => Err(e.into()),
            },
            ImageSource::Memory(map) => Ok(map.get(key).cloned()),
        }
    }
}

fn too_large(key: &str, size: u64) -> SnapshotError {
    SnapshotError::ImageTooLarge {
        key: key.to_string(),
        size,
    }
}

/// Decode a snapshot archive.
///
/// Fails only when the bytes are not a ZIP archive or the manifest is missing
/// or unreadable. Image entries are read lazily.
pub fn decode(bytes: Vec<u8>) -> Result<Snapshot, SnapshotError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let manifest: Manifest = match archive.by_name(MANIFEST_NAME) {
        Ok(entry) => serde_json::from_reader(entry)?,
        Err(ZipError::FileNotFound) => return Err(SnapshotError::MissingManifest(MANIFEST_NAME)),
        Err(e) => return Err(e.into()),
    };

    log::debug!(
        "Decoded snapshot: {} categories, {} archive entries",
        manifest.products.len(),
        archive.len()
    );

    Ok(Snapshot {
        metadata: manifest.metadata,
        categories: manifest.products,
        images: ImageSource::Archive(archive),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{Cursor, Write};
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Build an in-memory ZIP archive from (name, bytes) entries
    pub fn build_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in entries {
            writer
                .start_file(name.to_string(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// Rewrite the central directory record of `name` so that it declares an
    /// uncompressed size of `size` through a ZIP64 extra field. The entry data
    /// is left untouched.
    pub fn declare_entry_size(mut archive: Vec<u8>, name: &str, size: u64) -> Vec<u8> {
        const CENTRAL_HEADER: &[u8] = b"PK\x01\x02";
        const EOCD_LEN: usize = 22;

        let header = (0..archive.len() - 46)
            .filter(|&i| archive[i..].starts_with(CENTRAL_HEADER))
            .find(|&i| {
                let name_len = u16::from_le_bytes([archive[i + 28], archive[i + 29]]) as usize;
                &archive[i + 46..i + 46 + name_len] == name.as_bytes()
            })
            .unwrap();

        let name_len = u16::from_le_bytes([archive[header + 28], archive[header + 29]]) as usize;
        let extra_len = u16::from_le_bytes([archive[header + 30], archive[header + 31]]) as usize;
        let comment_len = u16::from_le_bytes([archive[header + 32], archive[header + 33]]);
        assert_eq!(comment_len, 0);

        // uncompressed size 0xFFFFFFFF defers to the ZIP64 extra field
        archive[header + 24..header + 28].copy_from_slice(&u32::MAX.to_le_bytes());

        let mut zip64 = Vec::with_capacity(12);
        zip64.extend_from_slice(&1u16.to_le_bytes());
        zip64.extend_from_slice(&8u16.to_le_bytes());
        zip64.extend_from_slice(&size.to_le_bytes());

        let extra_end = header + 46 + name_len + extra_len;
        let tail = archive.split_off(extra_end);
        archive.extend_from_slice(&zip64);
        archive.extend_from_slice(&tail);
        let new_extra_len = (extra_len + zip64.len()) as u16;
        archive[header + 30..header + 32].copy_from_slice(&new_extra_len.to_le_bytes());

        // central directory grew by 12 bytes
        let eocd = archive.len() - EOCD_LEN;
        assert!(archive[eocd..].starts_with(b"PK\x05\x06"));
        let cd_size = u32::from_le_bytes([
            archive[eocd + 12],
            archive[eocd + 13],
            archive[eocd + 14],
            archive[eocd + 15],
        ]);
        archive[eocd + 12..eocd + 16].copy_from_slice(&(cd_size + 12).to_le_bytes());
        archive
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{build_archive, declare_entry_size};
    use super::*;

    const MANIFEST: &str = r#"{
        "metadata": {
            "datetime": "2026-01-10T08:30:00.123456+00:00",
            "scraper_version": "1.0.0",
            "duration_seconds": 42.5,
            "total_products": 3,
            "total_failed": 1,
            "categories_scraped": 2,
            "categories": ["men/tops", "men/bottoms"]
        },
        "products": {
            "men/tops": [
                {"product_id": "E482305-000", "name": "Crew Neck T-Shirt", "price": "CA $ 19.90",
                 "url": "https://example.com/E482305-000", "image": "images/men/tops/E482305-000.jpg"}
            ],
            "men/bottoms": [
                {"product_id": "E470001-000", "name": "Chino Pants", "price": "CA $ 49.90",
                 "url": "https://example.com/E470001-000", "image": null}
            ]
        }
    }"#;

    #[test]
    fn decodes_manifest_and_images() {
        let bytes = build_archive(&[
            (MANIFEST_NAME, MANIFEST.as_bytes()),
            ("images/men/tops/E482305-000.jpg", &[0xFF, 0xD8, 0xFF]),
        ]);

        let mut snapshot = decode(bytes).unwrap();
        assert_eq!(snapshot.metadata.scraper_version, "1.0.0");
        assert_eq!(snapshot.metadata.total_failed, 1);
        assert_eq!(snapshot.categories.len(), 2);
        assert_eq!(snapshot.listing_count(), 2);

        let tops = &snapshot.categories["men/tops"];
        assert_eq!(tops[0].product_id.as_deref(), Some("E482305-000"));
        assert_eq!(tops[0].price, "CA $ 19.90");

        let image = snapshot.image("images/men/tops/E482305-000.jpg").unwrap();
        assert_eq!(image, Some(vec![0xFF, 0xD8, 0xFF]));
        assert_eq!(snapshot.image("images/missing.jpg").unwrap(), None);
    }

    #[test]
    fn parses_declared_timestamp() {
        let bytes = build_archive(&[(MANIFEST_NAME, MANIFEST.as_bytes())]);
        let snapshot = decode(bytes).unwrap();
        let declared = snapshot.metadata.declared_at().unwrap();
        assert_eq!(declared.to_rfc3339(), "2026-01-10T08:30:00.123456+00:00");
    }

    #[test]
    fn unparsable_timestamp_is_none() {
        let metadata = SnapshotMetadata {
            datetime: "yesterday".to_string(),
            ..Default::default()
        };
        assert!(metadata.declared_at().is_none());
    }

    #[test]
    fn rejects_non_archive() {
        let result = decode(b"definitely not a zip file".to_vec());
        assert!(matches!(result, Err(SnapshotError::Archive(_))));
    }

    #[test]
    fn rejects_archive_without_manifest() {
        let bytes = build_archive(&[("images/a.jpg", &[1, 2, 3])]);
        assert!(matches!(
            decode(bytes),
            Err(SnapshotError::MissingManifest(MANIFEST_NAME))
        ));
    }

    #[test]
    fn rejects_invalid_manifest_json() {
        let bytes = build_archive(&[(MANIFEST_NAME, b"{ not json")]);
        assert!(matches!(decode(bytes), Err(SnapshotError::Manifest(_))));
    }

    #[test]
    fn empty_manifest_is_an_empty_snapshot() {
        let bytes = build_archive(&[(MANIFEST_NAME, b"{}")]);
        let snapshot = decode(bytes).unwrap();
        assert!(snapshot.categories.is_empty());
        assert_eq!(snapshot.metadata, SnapshotMetadata::default());
    }

    #[test]
    fn oversized_declared_image_is_an_error_not_an_allocation() {
        let bytes = build_archive(&[
            (MANIFEST_NAME, b"{}"),
            ("images/men/A.jpg", &[0xFF, 0xD8, 0xFF]),
        ]);
        let bytes = declare_entry_size(bytes, "images/men/A.jpg", 1 << 62);

        let mut snapshot = decode(bytes).unwrap();
        match snapshot.image("images/men/A.jpg") {
            Err(SnapshotError::ImageTooLarge { key, size }) => {
                assert_eq!(key, "images/men/A.jpg");
                assert_eq!(size, 1 << 62);
            }
            other => panic!("Expected SnapshotError::ImageTooLarge, got: {other:?}"),
        }
    }

    #[test]
    fn memory_snapshot_serves_attached_images() {
        let mut snapshot = Snapshot::new(SnapshotMetadata::default(), BTreeMap::new())
            .with_image("img/a.jpg", vec![9, 9]);
        assert_eq!(snapshot.image("img/a.jpg").unwrap(), Some(vec![9, 9]));
        assert_eq!(snapshot.image("img/b.jpg").unwrap(), None);
    }
}
