//! paged-cache: client-side on-disk page cache for remote file reads.
//!
//! Remote files are split into fixed-size pages; page bodies live in a
//! local page store while an in-memory index tracks residency and an
//! eviction policy keeps the total size under a byte budget. One
//! [`CacheManager`] serves `put`/`get`/`delete` from many threads, using a
//! striped page-lock pool plus a single metadata lock so I/O on distinct
//! pages proceeds in parallel.

pub mod cache;
pub mod config;
pub mod store;

pub use cache::evictor::{Evictor, FifoEvictor, LruEvictor};
pub use cache::manager::{CacheError, CacheManager, PageReader};
pub use cache::meta::{HashMapMetaStore, MetaStore};
pub use cache::metrics::CacheMetrics;
pub use cache::page::{PageId, PageInfo};
pub use config::{CacheConfig, EvictionPolicy, StoreBackend, StoreConfig};
pub use store::{PageStore, PageStoreError};
