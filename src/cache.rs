//! In-memory TTL caches for read views
//!
//! Two shapes: a single slot (whole catalog) and a keyed map (product detail).
//! Both sit behind a reader/writer lock that is only held for the lookup or the
//! mutation itself; computing a missing value happens outside the lock.
//!
//! Every cache carries a generation counter bumped by `invalidate`. A value
//! computed across an invalidation is handed to its caller but never stored,
//! so once an invalidation returns no older value can be served.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifetime of every cached view
pub const CACHE_TTL: Duration = Duration::from_secs(60 * 60);

struct Entry<V> {
    value: Arc<V>,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn fresh(&self, now: Instant) -> Option<Arc<V>> {
        (now < self.expires_at).then(|| Arc::clone(&self.value))
    }
}

struct SlotState<V> {
    entry: Option<Entry<V>>,
    generation: u64,
}

/// Single cached value with expiry
pub struct TtlSlot<V> {
    state: RwLock<SlotState<V>>,
    ttl: Duration,
}

impl<V> TtlSlot<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(SlotState {
                entry: None,
                generation: 0,
            }),
            ttl,
        }
    }

    /// Return the cached value, or compute, store and return a fresh one
    pub fn get_or_try_insert_with<E>(
        &self,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        self.get_or_try_insert_with_at(Instant::now(), compute)
    }

    pub(crate) fn get_or_try_insert_with_at<E>(
        &self,
        now: Instant,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        let generation = {
            let state = self.state.read();
            if let Some(value) = state.entry.as_ref().and_then(|e| e.fresh(now)) {
                return Ok(value);
            }
            state.generation
        };

        let value = Arc::new(compute()?);

        let mut state = self.state.write();
        if state.generation == generation {
            state.entry = Some(Entry {
                value: Arc::clone(&value),
                expires_at: now + self.ttl,
            });
        }
        Ok(value)
    }

    /// Drop the cached value
    pub fn invalidate(&self) {
        let mut state = self.state.write();
        state.entry = None;
        state.generation += 1;
    }
}

struct MapState<V> {
    entries: HashMap<String, Entry<V>>,
    generation: u64,
}

/// Cached values keyed by string, each with its own expiry
pub struct TtlMap<V> {
    state: RwLock<MapState<V>>,
    ttl: Duration,
}

impl<V> TtlMap<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: RwLock::new(MapState {
                entries: HashMap::new(),
                generation: 0,
            }),
            ttl,
        }
    }

    /// Return the cached value for `key`, or compute and store a fresh one.
    ///
    /// A computed `None` (unknown key) is returned but not cached.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: &str,
        compute: impl FnOnce() -> Result<Option<V>, E>,
    ) -> Result<Option<Arc<V>>, E> {
        self.get_or_try_insert_with_at(Instant::now(), key, compute)
    }

    pub(crate) fn get_or_try_insert_with_at<E>(
        &self,
        now: Instant,
        key: &str,
        compute: impl FnOnce() -> Result<Option<V>, E>,
    ) -> Result<Option<Arc<V>>, E> {
        let generation = {
            let state = self.state.read();
            if let Some(value) = state.entries.get(key).and_then(|e| e.fresh(now)) {
                return Ok(Some(value));
            }
            state.generation
        };

        let Some(value) = compute()? else {
            return Ok(None);
        };
        let value = Arc::new(value);

        let mut state = self.state.write();
        if state.generation == generation {
            state.entries.insert(
                key.to_string(),
                Entry {
                    value: Arc::clone(&value),
                    expires_at: now + self.ttl,
                },
            );
        }
        Ok(Some(value))
    }

    /// Drop every cached value
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.generation += 1;
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The catalog and detail caches served by the read side
pub struct ResponseCache<C, D> {
    pub catalog: TtlSlot<C>,
    pub detail: TtlMap<D>,
}

impl<C, D> ResponseCache<C, D> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            catalog: TtlSlot::new(ttl),
            detail: TtlMap::new(ttl),
        }
    }

    /// Clear both caches after an ingestion
    pub fn invalidate_all(&self) {
        self.catalog.invalidate();
        self.detail.clear();
        log::debug!("Response caches invalidated");
    }
}

/// Invalidates a `ResponseCache` when dropped, including during unwinding
pub struct InvalidateOnDrop<'a, C, D> {
    cache: &'a ResponseCache<C, D>,
}

impl<C, D> Drop for InvalidateOnDrop<'_, C, D> {
    fn drop(&mut self) {
        self.cache.invalidate_all();
    }
}

impl<C, D> ResponseCache<C, D> {
    /// Guard that clears both caches once it goes out of scope
    pub fn invalidate_on_drop(&self) -> InvalidateOnDrop<'_, C, D> {
        InvalidateOnDrop { cache: self }
    }
}

impl<C, D> Default for ResponseCache<C, D> {
    fn default() -> Self {
        Self::new(CACHE_TTL)
    }
}
