//! Lock-free cache metrics.
//!
//! Counters use relaxed ordering; exact cross-counter consistency is not
//! required for monitoring. The host creates one `CacheMetrics`, hands it to
//! the cache at construction, and reads it from its own reporting loop.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe operation counters for a single cache instance.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Bytes successfully written to the page store.
    bytes_written: AtomicU64,
    /// Bytes removed from the page store by delete or eviction.
    bytes_evicted: AtomicU64,
    /// Pages removed from the page store by delete or eviction.
    pages_evicted: AtomicU64,
    /// Page store failures during put.
    put_errors: AtomicU64,
    /// Page store failures during get.
    get_errors: AtomicU64,
    /// Missing pages or page store failures during delete.
    delete_errors: AtomicU64,
}

impl CacheMetrics {
    /// Create metrics with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self, bytes: u64) {
        self.bytes_evicted.fetch_add(bytes, Ordering::Relaxed);
        self.pages_evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_put_error(&self) {
        self.put_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_get_error(&self) {
        self.get_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete_error(&self) {
        self.delete_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Bytes successfully written to the page store.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Bytes removed from the page store by delete or eviction.
    pub fn bytes_evicted(&self) -> u64 {
        self.bytes_evicted.load(Ordering::Relaxed)
    }

    /// Pages removed from the page store by delete or eviction.
    pub fn pages_evicted(&self) -> u64 {
        self.pages_evicted.load(Ordering::Relaxed)
    }

    /// Page store failures during put.
    pub fn put_errors(&self) -> u64 {
        self.put_errors.load(Ordering::Relaxed)
    }

    /// Page store failures during get.
    pub fn get_errors(&self) -> u64 {
        self.get_errors.load(Ordering::Relaxed)
    }

    /// Missing pages or page store failures during delete.
    pub fn delete_errors(&self) -> u64 {
        self.delete_errors.load(Ordering::Relaxed)
    }
}
