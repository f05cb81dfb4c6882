//! In-memory page store.
//!
//! Same contract as the on-disk store, backed by a map. Durable only for
//! the process lifetime; intended for tests and hosts that want a pure
//! memory cache.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::cache::page::{PageId, PageInfo};
use crate::store::{PageStore, PageStoreError};

#[derive(Debug, Default)]
pub struct MemPageStore {
    pages: Mutex<HashMap<PageId, Vec<u8>>>,
    bytes: AtomicU64,
}

impl MemPageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageStore for MemPageStore {
    fn put(&self, page_id: &PageId, data: &[u8]) -> Result<(), PageStoreError> {
        let mut pages = self.pages.lock();
        if pages.contains_key(page_id) {
            return Err(PageStoreError::AlreadyExists(page_id.clone()));
        }
        pages.insert(page_id.clone(), data.to_vec());
        self.bytes.fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn get(&self, page_id: &PageId, offset: u64) -> Result<Vec<u8>, PageStoreError> {
        let pages = self.pages.lock();
        let data = pages
            .get(page_id)
            .ok_or_else(|| PageStoreError::NotFound(page_id.clone()))?;
        let start = (offset as usize).min(data.len());
        Ok(data[start..].to_vec())
    }

    fn delete(&self, page_id: &PageId, expected_size: u64) -> Result<(), PageStoreError> {
        let mut pages = self.pages.lock();
        if pages.remove(page_id).is_none() {
            return Err(PageStoreError::NotFound(page_id.clone()));
        }
        self.bytes.fetch_sub(expected_size, Ordering::Relaxed);
        Ok(())
    }

    fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn pages(&self) -> Result<Vec<PageInfo>, PageStoreError> {
        let pages = self.pages.lock();
        Ok(pages
            .iter()
            .map(|(id, data)| PageInfo::new(id.clone(), data.len() as u64))
            .collect())
    }

    fn overhead_ratio(&self) -> f64 {
        0.0
    }

    fn close(&self) -> Result<(), PageStoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_and_accounting() {
        let store = MemPageStore::new();
        let id = PageId::new("f", 0);

        store.put(&id, &[9u8; 128]).unwrap();
        assert_eq!(store.bytes(), 128);
        assert_eq!(store.get(&id, 0).unwrap(), vec![9u8; 128]);
        assert_eq!(store.get(&id, 100).unwrap().len(), 28);
        assert!(store.get(&id, 500).unwrap().is_empty());

        store.delete(&id, 128).unwrap();
        assert_eq!(store.bytes(), 0);
    }

    #[test]
    fn test_overwrite_and_missing_errors() {
        let store = MemPageStore::new();
        let id = PageId::new("f", 0);

        store.put(&id, b"data").unwrap();
        assert!(matches!(
            store.put(&id, b"other"),
            Err(PageStoreError::AlreadyExists(_))
        ));
        assert!(matches!(
            store.delete(&PageId::new("f", 1), 4),
            Err(PageStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_pages_enumeration() {
        let store = MemPageStore::new();
        store.put(&PageId::new("f", 0), &[0u8; 10]).unwrap();
        store.put(&PageId::new("g", 2), &[0u8; 20]).unwrap();

        let mut pages = store.pages().unwrap();
        pages.sort_by_key(|info| info.page_size());
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_id(), &PageId::new("f", 0));
        assert_eq!(pages[1].page_size(), 20);
    }
}
