//! Persistent cache for large assets
//!
//! [`IntegrityStore`] is the infallible facade used by the fetcher. Storage
//! errors raised by a [`CacheBackend`] are logged and degrade to a cache miss
//! (on read) or a no-op (on write), so the cache can never fail a packaging
//! run. Hash verification happens in the fetcher, after retrieval from either
//! the cache or the network.

use crate::catalog::{AssetCatalog, AssetDescriptor};
use crate::error::{PackError, PackResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Storage layer behind the [`IntegrityStore`]
pub trait CacheBackend: Send + Sync {
    /// Read the cached bytes for a descriptor
    fn load(&self, descriptor: &AssetDescriptor) -> PackResult<Option<Vec<u8>>>;

    /// Persist bytes for a descriptor, replacing any previous entry
    fn store(&self, descriptor: &AssetDescriptor, bytes: &[u8]) -> PackResult<()>;

    /// Backend name for logs
    fn kind(&self) -> &'static str;
}

/// Cache facade keyed by asset identity
#[derive(Clone)]
pub struct IntegrityStore {
    backend: Arc<dyn CacheBackend>,
    cache_buster: String,
}

impl std::fmt::Debug for IntegrityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityStore")
            .field("backend", &self.backend.kind())
            .field("cache_buster", &self.cache_buster)
            .finish()
    }
}

impl IntegrityStore {
    /// Create a store over a backend for the active catalog
    pub fn new(backend: Arc<dyn CacheBackend>, catalog: &AssetCatalog) -> Self {
        Self {
            backend,
            cache_buster: catalog.fingerprint(),
        }
    }

    /// In-memory store
    pub fn memory(catalog: &AssetCatalog) -> Self {
        Self::new(Arc::new(MemoryCache::new()), catalog)
    }

    /// Store that never caches anything
    pub fn disabled(catalog: &AssetCatalog) -> Self {
        Self::new(Arc::new(NoCache), catalog)
    }

    /// Disk store in the platform cache directory
    pub fn on_disk(catalog: &AssetCatalog) -> Self {
        Self::new(Arc::new(DiskCache::new(DiskCache::default_dir())), catalog)
    }

    /// Cached bytes for a descriptor, `None` on miss or storage failure
    pub fn get(&self, descriptor: &AssetDescriptor) -> Option<Vec<u8>> {
        match self.backend.load(descriptor) {
            Ok(Some(bytes)) => {
                debug!(
                    target: "stagepack::cache",
                    asset = %descriptor.name,
                    bytes = bytes.len(),
                    "Cache hit"
                );
                Some(bytes)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(
                    target: "stagepack::cache",
                    asset = %descriptor.name,
                    backend = self.backend.kind(),
                    error = %e,
                    "Cache read failed, treating as miss"
                );
                None
            }
        }
    }

    /// Best-effort persistence, returns whether the write succeeded
    pub fn set(&self, descriptor: &AssetDescriptor, bytes: &[u8]) -> bool {
        match self.backend.store(descriptor, bytes) {
            Ok(()) => {
                debug!(
                    target: "stagepack::cache",
                    asset = %descriptor.name,
                    bytes = bytes.len(),
                    "Cached asset"
                );
                true
            }
            Err(e) => {
                warn!(
                    target: "stagepack::cache",
                    asset = %descriptor.name,
                    backend = self.backend.kind(),
                    error = %e,
                    "Cache write failed"
                );
                false
            }
        }
    }

    /// Token appended to cache-busted URLs
    pub fn cache_buster_token(&self) -> &str {
        &self.cache_buster
    }
}

// ============================================================================
// Backends
// ============================================================================

/// Backend that stores nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl CacheBackend for NoCache {
    fn load(&self, _descriptor: &AssetDescriptor) -> PackResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn store(&self, _descriptor: &AssetDescriptor, _bytes: &[u8]) -> PackResult<()> {
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "none"
    }
}

/// Process-wide in-memory backend
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, Arc<Vec<u8>>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheBackend for MemoryCache {
    fn load(&self, descriptor: &AssetDescriptor) -> PackResult<Option<Vec<u8>>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| PackError::CacheFailure(e.to_string()))?;
        Ok(entries
            .get(&descriptor.name)
            .filter(|(src, _)| *src == descriptor.src)
            .map(|(_, bytes)| bytes.as_ref().clone()))
    }

    fn store(&self, descriptor: &AssetDescriptor, bytes: &[u8]) -> PackResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| PackError::CacheFailure(e.to_string()))?;
        entries.insert(
            descriptor.name.clone(),
            (descriptor.src.clone(), Arc::new(bytes.to_vec())),
        );
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

/// Sidecar written next to each cached blob
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryMeta {
    src: String,
    size: u64,
    /// BLAKE3 of the blob, detects torn or foreign files
    content_hash: String,
}

/// Directory-backed cache, one blob and one JSON sidecar per asset
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// `<platform cache dir>/stagepack/assets`
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stagepack")
            .join("assets")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.bin", file_stem(name)))
    }

    fn meta_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(name)))
    }

    /// Write through a temp file in the same directory, then rename
    fn write_atomic(&self, path: &Path, content: &[u8]) -> PackResult<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| PackError::CacheFailure(format!("temp file: {}", e)))?;
        tmp.write_all(content)
            .map_err(|e| PackError::CacheFailure(format!("write: {}", e)))?;
        tmp.persist(path)
            .map_err(|e| PackError::CacheFailure(format!("persist {}: {}", path.display(), e)))?;
        Ok(())
    }
}

impl CacheBackend for DiskCache {
    fn load(&self, descriptor: &AssetDescriptor) -> PackResult<Option<Vec<u8>>> {
        let meta_path = self.meta_path(&descriptor.name);
        if !meta_path.exists() {
            return Ok(None);
        }

        let meta: EntryMeta = serde_json::from_slice(&fs::read(&meta_path)?)?;
        if meta.src != descriptor.src {
            debug!(
                target: "stagepack::cache",
                asset = %descriptor.name,
                cached_src = %meta.src,
                "Cached entry belongs to another source"
            );
            return Ok(None);
        }

        let bytes = match fs::read(self.blob_path(&descriptor.name)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if bytes.len() as u64 != meta.size
            || blake3::hash(&bytes).to_hex().as_str() != meta.content_hash
        {
            return Err(PackError::CacheFailure(format!(
                "Corrupted cache entry for {}",
                descriptor.name
            )));
        }

        Ok(Some(bytes))
    }

    fn store(&self, descriptor: &AssetDescriptor, bytes: &[u8]) -> PackResult<()> {
        fs::create_dir_all(&self.dir)?;

        let meta = EntryMeta {
            src: descriptor.src.clone(),
            size: bytes.len() as u64,
            content_hash: blake3::hash(bytes).to_hex().to_string(),
        };

        // Blob first: a sidecar never points at a missing or older blob
        self.write_atomic(&self.blob_path(&descriptor.name), bytes)?;
        self.write_atomic(
            &self.meta_path(&descriptor.name),
            &serde_json::to_vec_pretty(&meta)?,
        )?;

        info!(
            target: "stagepack::cache",
            asset = %descriptor.name,
            dir = %self.dir.display(),
            "Saved to cache ({} bytes)",
            bytes.len()
        );
        Ok(())
    }

    fn kind(&self) -> &'static str {
        "disk"
    }
}

/// Map a logical name to a safe file stem
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
