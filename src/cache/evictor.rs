//! Eviction policies: pick one victim page when the cache is full.
//!
//! An evictor only *recommends* — the cache manager re-validates the victim
//! under the metadata lock before removing it, so a policy may lag behind
//! the true resident set. Policies are internally synchronized because
//! access notifications arrive concurrently under shared page locks.

use std::collections::{HashSet, VecDeque};

use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;

use crate::cache::page::PageId;

/// Replacement-policy hooks observed by the cache manager.
///
/// Notifications may arrive more than once per event; implementations must
/// tolerate duplicates.
pub trait Evictor: Send + Sync {
    /// A page was served from the cache.
    fn update_on_get(&self, page_id: &PageId);

    /// A page was written to the cache (or restored at startup).
    fn update_on_put(&self, page_id: &PageId);

    /// A page was removed from the cache.
    fn update_on_delete(&self, page_id: &PageId);

    /// Recommend one currently tracked page to remove, or `None` when
    /// nothing is tracked. Does not untrack the page; the manager reports
    /// the removal through [`Evictor::update_on_delete`].
    fn evict(&self) -> Option<PageId>;
}

/// Least-recently-used policy over an access-ordered map.
#[derive(Debug, Default)]
pub struct LruEvictor {
    pages: Mutex<LinkedHashMap<PageId, ()>>,
}

impl LruEvictor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Evictor for LruEvictor {
    fn update_on_get(&self, page_id: &PageId) {
        self.pages.lock().get_refresh(page_id);
    }

    fn update_on_put(&self, page_id: &PageId) {
        let mut pages = self.pages.lock();
        // Re-insert so a duplicate put still moves the page to the tail.
        pages.remove(page_id);
        pages.insert(page_id.clone(), ());
    }

    fn update_on_delete(&self, page_id: &PageId) {
        self.pages.lock().remove(page_id);
    }

    fn evict(&self) -> Option<PageId> {
        self.pages.lock().front().map(|(id, _)| id.clone())
    }
}

/// First-in-first-out policy. Accesses do not reorder pages.
#[derive(Debug, Default)]
pub struct FifoEvictor {
    inner: Mutex<FifoInner>,
}

#[derive(Debug, Default)]
struct FifoInner {
    queue: VecDeque<PageId>,
    tracked: HashSet<PageId>,
}

impl FifoEvictor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Evictor for FifoEvictor {
    fn update_on_get(&self, _page_id: &PageId) {}

    fn update_on_put(&self, page_id: &PageId) {
        let mut inner = self.inner.lock();
        if inner.tracked.insert(page_id.clone()) {
            inner.queue.push_back(page_id.clone());
        }
    }

    fn update_on_delete(&self, page_id: &PageId) {
        // Queue entries for deleted pages are dropped lazily in evict().
        self.inner.lock().tracked.remove(page_id);
    }

    fn evict(&self) -> Option<PageId> {
        let mut inner = self.inner.lock();
        while let Some(front) = inner.queue.front() {
            if inner.tracked.contains(front) {
                let victim = front.clone();
                return Some(victim);
            }
            inner.queue.pop_front();
        }
        None
    }
}
