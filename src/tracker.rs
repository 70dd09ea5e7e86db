//! Tracker service
//!
//! Owns the store, the response caches and the ingestion lock. HTTP handlers
//! and the CLI share one `Tracker` through an `Arc`.

use crate::cache::{ResponseCache, CACHE_TTL};
use crate::catalog::{
    filter_category, load_catalog, load_product_detail, CatalogView, CategoryView, ProductDetail,
};
use crate::error::{SnapshotError, StoreResult};
use crate::ingest::{self, IngestReport};
use crate::model::RunSummary;
use crate::snapshot::{self, Snapshot};
use crate::store::Store;
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;

/// Result of `list_products`
#[derive(Debug, Clone)]
pub enum ProductListing {
    All(Arc<CatalogView>),
    Category(CategoryView),
}

impl Serialize for ProductListing {
    fn serialize<Ser: Serializer>(&self, serializer: Ser) -> Result<Ser::Ok, Ser::Error> {
        match self {
            ProductListing::All(catalog) => catalog.serialize(serializer),
            ProductListing::Category(view) => view.serialize(serializer),
        }
    }
}

pub struct Tracker<S> {
    store: Arc<S>,
    cache: ResponseCache<CatalogView, ProductDetail>,
    ingest_lock: Mutex<()>,
}

impl<S: Store> Tracker<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_ttl(store, CACHE_TTL)
    }

    pub fn with_ttl(store: Arc<S>, ttl: Duration) -> Self {
        Self {
            store,
            cache: ResponseCache::new(ttl),
            ingest_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Ingest a decoded snapshot and invalidate the caches.
    ///
    /// Ingestions run one at a time. The caches are invalidated even if the
    /// ingestion panics part way, since earlier writes are already persisted.
    pub fn ingest(&self, mut snapshot: Snapshot) -> IngestReport {
        let _lock = self.ingest_lock.lock();
        let _invalidate = self.cache.invalidate_on_drop();
        ingest::ingest(self.store.as_ref(), &mut snapshot)
    }

    /// Decode an uploaded archive and ingest it.
    ///
    /// A malformed archive is rejected before anything is written.
    pub fn ingest_bytes(&self, bytes: Vec<u8>) -> Result<IngestReport, SnapshotError> {
        let snapshot = snapshot::decode(bytes).map_err(|e| {
            log::error!("Rejected snapshot: {}", e);
            e
        })?;
        Ok(self.ingest(snapshot))
    }

    /// Newest-generation catalog, served from cache when fresh
    pub fn catalog(&self) -> StoreResult<Arc<CatalogView>> {
        self.cache.catalog.get_or_try_insert_with(|| {
            log::debug!("Catalog cache miss");
            load_catalog(self.store.as_ref())
        })
    }

    /// Every current product, or only those listed under `category`
    pub fn list_products(&self, category: Option<&str>) -> StoreResult<ProductListing> {
        let catalog = self.catalog()?;
        Ok(match category {
            Some(category) => ProductListing::Category(filter_category(&catalog, category)),
            None => ProductListing::All(catalog),
        })
    }

    /// Detail view of one product, `None` if it was never observed
    pub fn product_detail(&self, product_id: &str) -> StoreResult<Option<Arc<ProductDetail>>> {
        self.cache.detail.get_or_try_insert_with(product_id, || {
            log::debug!("Detail cache miss for {}", product_id);
            load_product_detail(self.store.as_ref(), product_id)
        })
    }

    pub fn product_image(&self, product_id: &str) -> StoreResult<Option<Vec<u8>>> {
        self.store.get_image(product_id)
    }

    pub fn latest_run(&self) -> StoreResult<Option<RunSummary>> {
        self.store.latest_run()
    }
}
