//! In-memory index of resident pages.
//!
//! The meta store is not internally synchronized: the cache manager guards
//! it with a single metadata lock and holds that lock only for these O(1)
//! map operations, never across page store I/O.

use std::collections::HashMap;

use crate::cache::page::{PageId, PageInfo};

/// Index of resident pages and their recorded sizes.
pub trait MetaStore: Send + Sync {
    /// Whether `page_id` is currently indexed.
    fn has(&self, page_id: &PageId) -> bool;

    /// Index a page. The caller must have checked `has` first; a page is
    /// indexed at most once.
    fn add(&mut self, info: PageInfo);

    /// Metadata for `page_id`, if indexed.
    fn info(&self, page_id: &PageId) -> Option<&PageInfo>;

    /// Remove `page_id` from the index, returning its metadata.
    fn remove(&mut self, page_id: &PageId) -> Option<PageInfo>;

    /// Number of indexed pages.
    fn len(&self) -> usize;

    /// Whether the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hash-map backed meta store.
#[derive(Debug, Default)]
pub struct HashMapMetaStore {
    pages: HashMap<PageId, PageInfo>,
}

impl HashMapMetaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetaStore for HashMapMetaStore {
    fn has(&self, page_id: &PageId) -> bool {
        self.pages.contains_key(page_id)
    }

    fn add(&mut self, info: PageInfo) {
        self.pages.insert(info.page_id().clone(), info);
    }

    fn info(&self, page_id: &PageId) -> Option<&PageInfo> {
        self.pages.get(page_id)
    }

    fn remove(&mut self, page_id: &PageId) -> Option<PageInfo> {
        self.pages.remove(page_id)
    }

    fn len(&self) -> usize {
        self.pages.len()
    }
}
