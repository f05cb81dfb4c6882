//! Cache manager: coordinates metadata, page storage, and eviction.
//!
//! The manager serves `put`, `get`, and `delete` concurrently while keeping
//! the metadata index, the page store byte counter, and the eviction policy
//! consistent, and while never letting stored bytes exceed the configured
//! budget.
//!
//! Lock hierarchy. Every operation follows this order:
//! 1. Acquire the page lock(s) — two locks in ascending stripe order.
//! 2. Acquire the metadata lock.
//! 3. Update the meta store.
//! 4. Release the metadata lock.
//! 5. Update the page store and evictor.
//! 6. Release the page lock(s).
//!
//! The metadata lock is never held across page store I/O; I/O runs under
//! per-page locks only, so throughput scales with the stripe count instead
//! of serializing on one lock.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io::{Cursor, Read};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cache::evictor::{Evictor, FifoEvictor, LruEvictor};
use crate::cache::meta::{HashMapMetaStore, MetaStore};
use crate::cache::metrics::CacheMetrics;
use crate::cache::page::{PageId, PageInfo};
use crate::config::{CacheConfig, EvictionPolicy, StoreBackend};
use crate::store::local::LocalPageStore;
use crate::store::mem::MemPageStore;
use crate::store::{PageStore, PageStoreError};

/// Number of page locks in the striped pool. Collisions between unrelated
/// pages merely serialize them.
const LOCK_STRIPES: usize = 1024;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to create cache manager: {0}")]
    Store(#[from] PageStoreError),
}

/// A readable view of a cached page body, starting at the requested offset.
#[derive(Debug)]
pub struct PageReader {
    data: Cursor<Vec<u8>>,
}

impl PageReader {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data: Cursor::new(data),
        }
    }
}

impl Read for PageReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.data.read(buf)
    }
}

/// Thread-safe coordinator serving cached pages.
pub struct CacheManager {
    page_size_max: u64,
    cache_size: u64,
    /// Striped read/write locks guarding individual pages.
    page_locks: Vec<RwLock<()>>,
    /// Metadata lock; the meta store is only touched through it.
    meta: RwLock<Box<dyn MetaStore>>,
    store: Box<dyn PageStore>,
    evictor: Box<dyn Evictor>,
    metrics: Arc<CacheMetrics>,
}

impl CacheManager {
    /// Build collaborators from `config` and restore whatever pages the
    /// store already holds.
    pub fn create(config: &CacheConfig, metrics: Arc<CacheMetrics>) -> Result<Self, CacheError> {
        let store: Box<dyn PageStore> = match &config.store.backend {
            StoreBackend::Local { root } => Box::new(LocalPageStore::open(
                root.clone(),
                config.store.overhead_ratio,
            )?),
            StoreBackend::Memory => Box::new(MemPageStore::new()),
        };
        let evictor: Box<dyn Evictor> = match config.eviction_policy {
            EvictionPolicy::Lru => Box::new(LruEvictor::new()),
            EvictionPolicy::Fifo => Box::new(FifoEvictor::new()),
        };
        Self::with_parts(
            config,
            Box::new(HashMapMetaStore::new()),
            store,
            evictor,
            metrics,
        )
    }

    /// Build a manager over pre-built collaborators. Performs the same
    /// restore pass as [`CacheManager::create`]; on failure the page store
    /// is closed and the restore error surfaced.
    pub fn with_parts(
        config: &CacheConfig,
        mut meta: Box<dyn MetaStore>,
        store: Box<dyn PageStore>,
        evictor: Box<dyn Evictor>,
        metrics: Arc<CacheMetrics>,
    ) -> Result<Self, CacheError> {
        let fail = |store: &dyn PageStore, err: CacheError| {
            if let Err(close_err) = store.close() {
                error!(error = %close_err, "failed to close page store after construction failure");
            }
            Err(err)
        };

        if config.page_size == 0 {
            return fail(
                store.as_ref(),
                CacheError::InvalidConfig("page_size must be positive".into()),
            );
        }
        if config.cache_size_bytes == 0 {
            return fail(
                store.as_ref(),
                CacheError::InvalidConfig("cache_size_bytes must be positive".into()),
            );
        }

        let pages = match store.pages() {
            Ok(pages) => pages,
            Err(e) => return fail(store.as_ref(), e.into()),
        };
        info!(pages = pages.len(), "restoring existing pages");
        for info in pages {
            evictor.update_on_put(info.page_id());
            meta.add(info);
        }

        let cache_size =
            (config.cache_size_bytes as f64 / (1.0 + store.overhead_ratio())) as u64;
        let manager = Self {
            page_size_max: config.page_size,
            cache_size,
            page_locks: (0..LOCK_STRIPES).map(|_| RwLock::new(())).collect(),
            meta: RwLock::new(meta),
            store,
            evictor,
            metrics,
        };
        info!(
            cache_size = manager.cache_size,
            space_used = manager.space_used(),
            space_available = manager.space_available(),
            "cache manager created"
        );
        Ok(manager)
    }

    /// Insert a page. Returns `false` when the page is already resident, a
    /// racing thread beat this one to the insert or to the eviction victim,
    /// no victim was available, or the page store failed.
    ///
    /// # Panics
    ///
    /// If `data` is longer than the configured page size.
    pub fn put(&self, page_id: &PageId, data: &[u8]) -> bool {
        assert!(
            data.len() as u64 <= self.page_size_max,
            "page body exceeds page size: len={} max={}",
            data.len(),
            self.page_size_max
        );
        debug!(page_id = %page_id, size = data.len(), "put enters");

        // Phase one: single page lock, insert directly if space allows.
        let mut victim = None;
        {
            let _page = self.page_locks[self.stripe(page_id)].write();
            let enough_space;
            {
                let mut meta = self.meta.write();
                if meta.has(page_id) {
                    debug!(page_id = %page_id, "page already inserted");
                    return false;
                }
                enough_space = self.store.bytes() + data.len() as u64 <= self.cache_size;
                if enough_space {
                    meta.add(PageInfo::new(page_id.clone(), data.len() as u64));
                } else {
                    victim = self.evictor.evict();
                }
            }
            if enough_space {
                let ok = self.add_page(page_id, data);
                debug!(page_id = %page_id, success = ok, "put exits without eviction");
                return ok;
            }
        }

        let Some(victim) = victim else {
            warn!(page_id = %page_id, "cache full but no eviction candidate");
            return false;
        };

        // Phase two: the page lock was released above so the pair can be
        // taken in ascending stripe order; re-check everything under the
        // metadata lock because the world may have moved.
        let (low, high) = self.stripe_pair(page_id, &victim);
        let _first = self.page_locks[low].write();
        let _second = (high != low).then(|| self.page_locks[high].write());

        let victim_info;
        let enough_space;
        {
            let mut meta = self.meta.write();
            if meta.has(page_id) {
                debug!(page_id = %page_id, "page inserted by a racing thread");
                return false;
            }
            if !meta.has(&victim) {
                debug!(page_id = %page_id, victim = %victim, "victim evicted by a racing thread");
                return false;
            }
            victim_info = match meta.remove(&victim) {
                Some(info) => info,
                None => {
                    error!(victim = %victim, "metadata lost the eviction victim");
                    return false;
                }
            };
            enough_space = self.store.bytes().saturating_sub(victim_info.page_size())
                + data.len() as u64
                <= self.cache_size;
            if enough_space {
                meta.add(PageInfo::new(page_id.clone(), data.len() as u64));
            }
        }

        if !self.delete_page(&victim, &victim_info) {
            debug!(victim = %victim, "failed to evict page");
            return false;
        }
        if enough_space {
            let ok = self.add_page(page_id, data);
            debug!(page_id = %page_id, victim = %victim, success = ok, "put exits after eviction");
            ok
        } else {
            debug!(page_id = %page_id, victim = %victim, "put fails after eviction");
            false
        }
    }

    /// Serve a page from its start. See [`CacheManager::get_at`].
    pub fn get(&self, page_id: &PageId) -> Option<PageReader> {
        self.get_at(page_id, 0)
    }

    /// Serve the body of `page_id` starting at `page_offset`, or `None`
    /// when the page is not resident or the page store fails.
    ///
    /// # Panics
    ///
    /// If `page_offset` exceeds the configured page size.
    pub fn get_at(&self, page_id: &PageId, page_offset: u64) -> Option<PageReader> {
        assert!(
            page_offset <= self.page_size_max,
            "read exceeds page boundary: offset={page_offset} max={}",
            self.page_size_max
        );
        debug!(page_id = %page_id, offset = page_offset, "get enters");

        // The shared page lock is held across the store read: eviction and
        // delete need the exclusive side, so the body cannot vanish between
        // the residency check and the read.
        let _page = self.page_locks[self.stripe(page_id)].read();
        let has_page = self.meta.read().has(page_id);
        if !has_page {
            debug!(page_id = %page_id, "get misses: page not resident");
            return None;
        }
        match self.store.get(page_id, page_offset) {
            Ok(data) => {
                self.evictor.update_on_get(page_id);
                debug!(page_id = %page_id, size = data.len(), "get exits");
                Some(PageReader::new(data))
            }
            Err(e) => {
                error!(page_id = %page_id, error = %e, "failed to read resident page");
                self.metrics.record_get_error();
                None
            }
        }
    }

    /// Remove a page. Returns `true` iff the page was resident and both the
    /// metadata and page store removals succeeded.
    pub fn delete(&self, page_id: &PageId) -> bool {
        debug!(page_id = %page_id, "delete enters");
        let _page = self.page_locks[self.stripe(page_id)].write();
        let removed = self.meta.write().remove(page_id);
        let info = match removed {
            Some(info) => info,
            None => {
                error!(page_id = %page_id, "failed to delete page: not resident");
                self.metrics.record_delete_error();
                return false;
            }
        };
        let ok = self.delete_page(page_id, &info);
        debug!(page_id = %page_id, success = ok, "delete exits");
        ok
    }

    /// Close the underlying page store. Behavior of other operations
    /// afterwards is undefined.
    pub fn close(&self) -> Result<(), CacheError> {
        self.store.close()?;
        Ok(())
    }

    /// Effective byte budget resolved at construction.
    pub fn cache_size(&self) -> u64 {
        self.cache_size
    }

    /// Bytes currently stored, as reported by the page store.
    pub fn space_used(&self) -> u64 {
        self.store.bytes()
    }

    /// Budget not yet consumed.
    pub fn space_available(&self) -> u64 {
        self.cache_size.saturating_sub(self.store.bytes())
    }

    /// Write `data` to the page store and notify the evictor. The page
    /// lock must be held and the metadata already updated.
    fn add_page(&self, page_id: &PageId, data: &[u8]) -> bool {
        if let Err(e) = self.store.put(page_id, data) {
            error!(page_id = %page_id, error = %e, "failed to add page");
            self.metrics.record_put_error();
            return false;
        }
        self.evictor.update_on_put(page_id);
        self.metrics.record_write(data.len() as u64);
        true
    }

    /// Remove a page's bytes and notify the evictor. The page lock must be
    /// held and the metadata entry already removed. A page store failure
    /// here leaves the bytes behind as an orphan, reclaimed at next reload.
    fn delete_page(&self, page_id: &PageId, info: &PageInfo) -> bool {
        if let Err(e) = self.store.delete(page_id, info.page_size()) {
            error!(page_id = %page_id, error = %e, "failed to delete page");
            self.metrics.record_delete_error();
            return false;
        }
        self.evictor.update_on_delete(page_id);
        self.metrics.record_eviction(info.page_size());
        true
    }

    fn stripe(&self, page_id: &PageId) -> usize {
        let mut hasher = DefaultHasher::new();
        page_id.file_id().hash(&mut hasher);
        let mixed = hasher.finish().wrapping_add(page_id.page_index());
        (mixed % LOCK_STRIPES as u64) as usize
    }

    /// Stripe indices for two pages in acquisition order. Both pages may
    /// share a stripe, in which case the lock must be taken only once.
    fn stripe_pair(&self, a: &PageId, b: &PageId) -> (usize, usize) {
        let (sa, sb) = (self.stripe(a), self.stripe(b));
        (sa.min(sb), sa.max(sb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;

    fn test_manager(cache_size_bytes: u64) -> CacheManager {
        let config = CacheConfig {
            page_size: 1024,
            cache_size_bytes,
            eviction_policy: EvictionPolicy::Lru,
            store: StoreConfig {
                backend: StoreBackend::Memory,
                overhead_ratio: 0.0,
            },
        };
        CacheManager::create(&config, Arc::new(CacheMetrics::new())).unwrap()
    }

    fn read_all(reader: PageReader) -> Vec<u8> {
        let mut reader = reader;
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_put_then_get() {
        let cache = test_manager(2048);
        let id = PageId::new("f", 0);

        assert!(cache.put(&id, &[0x41; 512]));
        assert_eq!(read_all(cache.get(&id).unwrap()), vec![0x41; 512]);
        assert_eq!(cache.space_used(), 512);
        assert_eq!(cache.space_available(), 1536);
    }

    #[test]
    fn test_put_duplicate_returns_false() {
        let cache = test_manager(2048);
        let id = PageId::new("f", 0);

        assert!(cache.put(&id, &[1; 100]));
        assert!(!cache.put(&id, &[2; 100]));
        assert_eq!(read_all(cache.get(&id).unwrap()), vec![1; 100]);
        assert_eq!(cache.space_used(), 100);
    }

    #[test]
    fn test_put_evicts_when_full() {
        let cache = test_manager(2048);
        assert!(cache.put(&PageId::new("f", 0), &[0; 1024]));
        assert!(cache.put(&PageId::new("f", 1), &[1; 1024]));

        // Cache is full; the LRU victim is ("f", 0).
        assert!(cache.put(&PageId::new("f", 2), &[2; 1024]));
        assert!(cache.get(&PageId::new("f", 0)).is_none());
        assert_eq!(read_all(cache.get(&PageId::new("f", 2)).unwrap()), vec![2; 1024]);
        assert_eq!(cache.space_used(), 2048);
    }

    #[test]
    fn test_get_offset_within_page() {
        let cache = test_manager(2048);
        let id = PageId::new("f", 0);
        let body: Vec<u8> = (0..200u8).collect();

        assert!(cache.put(&id, &body));
        assert_eq!(read_all(cache.get_at(&id, 100).unwrap()), body[100..]);
        assert!(read_all(cache.get_at(&id, 200).unwrap()).is_empty());
    }

    #[test]
    #[should_panic(expected = "read exceeds page boundary")]
    fn test_get_offset_past_page_size_panics() {
        let cache = test_manager(2048);
        cache.get_at(&PageId::new("f", 0), 1025);
    }

    #[test]
    fn test_delete_missing_counts_error() {
        let metrics = Arc::new(CacheMetrics::new());
        let config = CacheConfig {
            page_size: 1024,
            cache_size_bytes: 2048,
            eviction_policy: EvictionPolicy::Lru,
            store: StoreConfig {
                backend: StoreBackend::Memory,
                overhead_ratio: 0.0,
            },
        };
        let cache = CacheManager::create(&config, metrics.clone()).unwrap();

        assert!(!cache.delete(&PageId::new("h", 9)));
        assert_eq!(metrics.delete_errors(), 1);
    }

    #[test]
    fn test_overhead_ratio_shrinks_budget() {
        let config = CacheConfig {
            page_size: 1024,
            cache_size_bytes: 2100,
            eviction_policy: EvictionPolicy::Lru,
            store: StoreConfig {
                backend: StoreBackend::Memory,
                overhead_ratio: 0.05,
            },
        };
        let cache = CacheManager::create(&config, Arc::new(CacheMetrics::new())).unwrap();
        assert_eq!(cache.cache_size(), 2000);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = CacheConfig {
            page_size: 0,
            cache_size_bytes: 2048,
            eviction_policy: EvictionPolicy::Lru,
            store: StoreConfig {
                backend: StoreBackend::Memory,
                overhead_ratio: 0.0,
            },
        };
        assert!(matches!(
            CacheManager::create(&config, Arc::new(CacheMetrics::new())),
            Err(CacheError::InvalidConfig(_))
        ));
    }
}
