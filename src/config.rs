//! Runtime configuration for the paged cache.
//!
//! Configuration can be loaded from a JSON file or constructed
//! programmatically. All cache knobs (page size, byte budget, storage
//! backend, eviction policy) live here.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum bytes of any single page body.
    pub page_size: u64,

    /// Raw byte budget. The effective budget is
    /// `cache_size_bytes / (1 + overhead_ratio)` where the overhead ratio
    /// comes from the page store.
    pub cache_size_bytes: u64,

    /// Replacement policy.
    pub eviction_policy: EvictionPolicy,

    /// Page storage backend.
    pub store: StoreConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_size: 1024 * 1024,                  // 1 MiB
            cache_size_bytes: 512 * 1024 * 1024,     // 512 MiB
            eviction_policy: EvictionPolicy::Lru,
            store: StoreConfig::default(),
        }
    }
}

/// Which replacement policy the cache uses when full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the least recently used page.
    Lru,
    /// Evict the oldest page regardless of accesses.
    Fifo,
}

/// Page store selection and tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Where page bodies live.
    pub backend: StoreBackend,

    /// Storage overhead per stored byte (filesystem block rounding, format
    /// framing). Shrinks the effective cache budget so the reported byte
    /// counter stays within it.
    pub overhead_ratio: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Local {
                root: PathBuf::from("/tmp/paged-cache"),
            },
            overhead_ratio: 0.0,
        }
    }
}

/// Available page store backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum StoreBackend {
    /// File-per-page storage under `root`.
    Local { root: PathBuf },
    /// Process-lifetime in-memory storage.
    Memory,
}

impl CacheConfig {
    /// Load configuration from a JSON file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: CacheConfig = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(CacheConfig::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.page_size, 1024 * 1024);
        assert_eq!(cfg.eviction_policy, EvictionPolicy::Lru);
        assert!(matches!(cfg.store.backend, StoreBackend::Local { .. }));
    }

    #[test]
    fn test_json_roundtrip() {
        let cfg = CacheConfig {
            page_size: 4096,
            cache_size_bytes: 1 << 20,
            eviction_policy: EvictionPolicy::Fifo,
            store: StoreConfig {
                backend: StoreBackend::Memory,
                overhead_ratio: 0.05,
            },
        };

        let json = serde_json::to_string(&cfg).unwrap();
        let parsed: CacheConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.page_size, 4096);
        assert_eq!(parsed.eviction_policy, EvictionPolicy::Fifo);
        assert!(matches!(parsed.store.backend, StoreBackend::Memory));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let cfg = CacheConfig::load(Path::new("/nonexistent/paged-cache.json")).unwrap();
        assert_eq!(cfg.cache_size_bytes, 512 * 1024 * 1024);
    }
}
