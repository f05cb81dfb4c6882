//! File-per-page storage under a local directory.
//!
//! Layout: `<root>/<hex(file_id)>/<page_index>.page`. File ids are hex
//! encoded so arbitrary identifier strings (URIs, paths) stay
//! filesystem-safe, and the encoding is reversed when enumerating pages at
//! startup.

use std::fs;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::cache::page::{PageId, PageInfo};
use crate::store::{PageStore, PageStoreError};

const PAGE_FILE_EXT: &str = "page";

/// Page store writing one file per page under a root directory.
pub struct LocalPageStore {
    root: PathBuf,
    overhead_ratio: f64,
    bytes: AtomicU64,
}

impl LocalPageStore {
    /// Open (creating if needed) a store rooted at `root`. Walks any
    /// existing pages to initialize the byte counter.
    pub fn open(root: impl Into<PathBuf>, overhead_ratio: f64) -> Result<Self, PageStoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let store = Self {
            root,
            overhead_ratio,
            bytes: AtomicU64::new(0),
        };
        let existing: u64 = store.pages()?.iter().map(PageInfo::page_size).sum();
        store.bytes.store(existing, Ordering::Relaxed);

        debug!(root = %store.root.display(), bytes = existing, "opened local page store");
        Ok(store)
    }

    fn page_path(&self, page_id: &PageId) -> PathBuf {
        self.root
            .join(encode_file_id(page_id.file_id()))
            .join(format!("{}.{PAGE_FILE_EXT}", page_id.page_index()))
    }

    fn scan_dir(&self, dir: &Path, file_id: &str, out: &mut Vec<PageInfo>) -> std::io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let index = match parse_page_index(&path) {
                Some(index) => index,
                None => {
                    warn!(path = %path.display(), "skipping unrecognized file in page store");
                    continue;
                }
            };
            let size = entry.metadata()?.len();
            out.push(PageInfo::new(PageId::new(file_id, index), size));
        }
        Ok(())
    }
}

impl PageStore for LocalPageStore {
    fn put(&self, page_id: &PageId, data: &[u8]) -> Result<(), PageStoreError> {
        let path = self.page_path(page_id);
        if path.exists() {
            return Err(PageStoreError::AlreadyExists(page_id.clone()));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, data)?;
        self.bytes.fetch_add(data.len() as u64, Ordering::Relaxed);

        debug!(page_id = %page_id, size = data.len(), "wrote page");
        Ok(())
    }

    fn get(&self, page_id: &PageId, offset: u64) -> Result<Vec<u8>, PageStoreError> {
        let path = self.page_path(page_id);
        let mut file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PageStoreError::NotFound(page_id.clone()));
            }
            Err(e) => return Err(e.into()),
        };
        file.seek(SeekFrom::Start(offset))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(data)
    }

    fn delete(&self, page_id: &PageId, expected_size: u64) -> Result<(), PageStoreError> {
        let path = self.page_path(page_id);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PageStoreError::NotFound(page_id.clone()));
            }
            Err(e) => return Err(e.into()),
        }
        self.bytes.fetch_sub(expected_size, Ordering::Relaxed);

        debug!(page_id = %page_id, size = expected_size, "deleted page");
        Ok(())
    }

    fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn pages(&self) -> Result<Vec<PageInfo>, PageStoreError> {
        let mut pages = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                warn!(path = %entry.path().display(), "skipping stray file in page store root");
                continue;
            }
            let file_id = match entry.file_name().to_str().and_then(decode_file_id) {
                Some(file_id) => file_id,
                None => {
                    warn!(path = %entry.path().display(), "skipping undecodable directory in page store");
                    continue;
                }
            };
            self.scan_dir(&entry.path(), &file_id, &mut pages)?;
        }
        Ok(pages)
    }

    fn overhead_ratio(&self) -> f64 {
        self.overhead_ratio
    }

    fn close(&self) -> Result<(), PageStoreError> {
        debug!(root = %self.root.display(), "closed local page store");
        Ok(())
    }
}

fn encode_file_id(file_id: &str) -> String {
    let mut encoded = String::with_capacity(file_id.len() * 2);
    for byte in file_id.bytes() {
        encoded.push_str(&format!("{byte:02x}"));
    }
    encoded
}

fn decode_file_id(encoded: &str) -> Option<String> {
    if encoded.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(encoded.len() / 2);
    for chunk in encoded.as_bytes().chunks(2) {
        let pair = std::str::from_utf8(chunk).ok()?;
        bytes.push(u8::from_str_radix(pair, 16).ok()?);
    }
    String::from_utf8(bytes).ok()
}

fn parse_page_index(path: &Path) -> Option<u64> {
    if path.extension()?.to_str()? != PAGE_FILE_EXT {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_delete_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = LocalPageStore::open(tmp.path(), 0.0).unwrap();
        let id = PageId::new("remote://bucket/object", 3);

        store.put(&id, &[7u8; 256]).unwrap();
        assert_eq!(store.bytes(), 256);
        assert_eq!(store.get(&id, 0).unwrap(), vec![7u8; 256]);
        assert_eq!(store.get(&id, 250).unwrap().len(), 6);

        store.delete(&id, 256).unwrap();
        assert_eq!(store.bytes(), 0);
        assert!(matches!(
            store.get(&id, 0),
            Err(PageStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_put_refuses_overwrite() {
        let tmp = TempDir::new().unwrap();
        let store = LocalPageStore::open(tmp.path(), 0.0).unwrap();
        let id = PageId::new("f", 0);

        store.put(&id, b"first").unwrap();
        assert!(matches!(
            store.put(&id, b"second"),
            Err(PageStoreError::AlreadyExists(_))
        ));
        assert_eq!(store.get(&id, 0).unwrap(), b"first");
        assert_eq!(store.bytes(), 5);
    }

    #[test]
    fn test_get_past_end_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = LocalPageStore::open(tmp.path(), 0.0).unwrap();
        let id = PageId::new("f", 0);

        store.put(&id, &[1u8; 16]).unwrap();
        assert!(store.get(&id, 16).unwrap().is_empty());
        assert!(store.get(&id, 64).unwrap().is_empty());
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let store = LocalPageStore::open(tmp.path(), 0.0).unwrap();
        assert!(matches!(
            store.delete(&PageId::new("f", 9), 10),
            Err(PageStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_pages_enumerates_across_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let store = LocalPageStore::open(tmp.path(), 0.0).unwrap();
            store.put(&PageId::new("file-a", 0), &[0u8; 100]).unwrap();
            store.put(&PageId::new("file-a", 1), &[0u8; 200]).unwrap();
            store.put(&PageId::new("file/b", 0), &[0u8; 300]).unwrap();
            store.close().unwrap();
        }

        let store = LocalPageStore::open(tmp.path(), 0.0).unwrap();
        assert_eq!(store.bytes(), 600);

        let mut pages = store.pages().unwrap();
        pages.sort_by_key(|info| (info.page_id().file_id().to_owned(), info.page_id().page_index()));
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].page_id(), &PageId::new("file-a", 0));
        assert_eq!(pages[0].page_size(), 100);
        assert_eq!(pages[2].page_id(), &PageId::new("file/b", 0));
        assert_eq!(pages[2].page_size(), 300);
    }

    #[test]
    fn test_file_id_encoding_roundtrip() {
        for raw in ["plain", "s3://bucket/key with spaces", "αβγ", ""] {
            assert_eq!(decode_file_id(&encode_file_id(raw)).as_deref(), Some(raw));
        }
        assert_eq!(decode_file_id("zz"), None);
        assert_eq!(decode_file_id("abc"), None);
    }
}
