//! Large asset retrieval
//!
//! This module provides:
//! - [`Transport`]: the network seam, with an HTTP implementation on ureq
//! - [`AssetFetcher`]: cache lookup, download with progress, cache-busting,
//!   SHA-256 verification and best-effort cache persistence
//!
//! Fetch progress for an asset goes 0 → (0.5 on cache hit | fractional
//! network progress below 1) → verification progress below 1 → 1, never
//! decreasing.

use crate::cache::IntegrityStore;
use crate::catalog::{AssetCatalog, AssetDescriptor};
use crate::checksum::{digests_match, sha256_offloaded};
use crate::error::{PackError, PackResult};
use crate::progress::{MonotonicProgress, ProgressEvent, ProgressHub};
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Progress credited for a cache hit
pub const CACHE_HIT_PROGRESS: f64 = 0.5;

/// Ceiling for network progress before verification completes
const NETWORK_PROGRESS_CEILING: f64 = 0.99;

/// Read buffer size for streamed downloads
const CHUNK_SIZE: usize = 64 * 1024;

/// Callback receiving `(bytes_received, content_length)`
pub type ChunkCallback<'a> = dyn FnMut(u64, Option<u64>) + 'a;

/// Network access used by the fetcher
pub trait Transport: Send + Sync {
    /// Retrieve the full body at `url`, reporting received bytes as they arrive
    fn get(&self, url: &str, on_chunk: &mut ChunkCallback<'_>) -> PackResult<Vec<u8>>;
}

/// HTTP(S) transport backed by ureq
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Allow plain HTTP
    allow_insecure: bool,
    /// Allowed hosts (empty = any)
    allowed_domains: Vec<String>,
    /// Refuse all network access
    offline: bool,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            allow_insecure: false,
            allowed_domains: vec![],
            offline: std::env::var("STAGEPACK_OFFLINE")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(false),
        }
    }

    /// Set insecure mode
    pub fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    /// Restrict downloads to these hosts
    pub fn allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = domains;
        self
    }

    /// Force offline mode
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Validate URL against security rules
    fn validate_url(&self, url: &str) -> PackResult<()> {
        let parsed =
            url::Url::parse(url).map_err(|e| PackError::InvalidUrl(format!("{}: {}", url, e)))?;

        if !self.allow_insecure && parsed.scheme() != "https" {
            warn!(
                target: "stagepack::fetch",
                url = %url,
                scheme = %parsed.scheme(),
                "Insecure protocol blocked"
            );
            return Err(PackError::InvalidUrl(format!(
                "Insecure URL scheme ({}), HTTPS required",
                parsed.scheme()
            )));
        }

        if !self.allowed_domains.is_empty() {
            let host = parsed.host_str().unwrap_or("");
            let allowed = self
                .allowed_domains
                .iter()
                .any(|d| host == d.as_str() || host.ends_with(&format!(".{}", d)));
            if !allowed {
                return Err(PackError::InvalidUrl(format!(
                    "Domain {} not in allowed list: {:?}",
                    host, self.allowed_domains
                )));
            }
        }

        Ok(())
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str, on_chunk: &mut ChunkCallback<'_>) -> PackResult<Vec<u8>> {
        if self.offline {
            return Err(PackError::Config(format!(
                "Offline mode: refusing to download {}",
                url
            )));
        }
        self.validate_url(url)?;

        let response = ureq::get(url)
            .call()
            .map_err(|e| PackError::Config(format!("Failed to download {}: {}", url, e)))?;

        let total = response
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok());

        let mut reader = response.into_reader();
        let mut buffer = Vec::with_capacity(total.unwrap_or(0).min(1 << 30) as usize);
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);
            on_chunk(buffer.len() as u64, total);
        }

        debug!(target: "stagepack::fetch", "Downloaded {} bytes from {}", buffer.len(), url);
        Ok(buffer)
    }
}

/// Per-fetch progress publisher
struct FetchProgress<'a> {
    hub: &'a ProgressHub,
    asset: &'a str,
    tracker: MonotonicProgress,
}

impl FetchProgress<'_> {
    fn report(&mut self, value: f64) {
        if let Some(progress) = self.tracker.advance(value) {
            self.hub.emit(ProgressEvent::AssetFetch {
                asset: self.asset.to_string(),
                progress,
            });
        }
    }
}

/// Fetches catalog assets through the cache and the network
#[derive(Clone)]
pub struct AssetFetcher {
    catalog: Arc<AssetCatalog>,
    store: IntegrityStore,
    transport: Arc<dyn Transport>,
    progress: ProgressHub,
}

impl AssetFetcher {
    /// Create a fetcher
    pub fn new(catalog: AssetCatalog, store: IntegrityStore, transport: Arc<dyn Transport>) -> Self {
        Self {
            catalog: Arc::new(catalog),
            store,
            transport,
            progress: ProgressHub::new(),
        }
    }

    /// Publish fetch progress to `hub`
    pub fn with_progress(mut self, hub: ProgressHub) -> Self {
        self.progress = hub;
        self
    }

    /// The active catalog
    pub fn catalog(&self) -> &AssetCatalog {
        &self.catalog
    }

    /// The cache facade
    pub fn store(&self) -> &IntegrityStore {
        &self.store
    }

    /// Fetch one asset by logical name
    pub fn fetch(&self, name: &str) -> PackResult<Vec<u8>> {
        let descriptor = self.catalog.resolve(name)?;
        let mut progress = FetchProgress {
            hub: &self.progress,
            asset: name,
            tracker: MonotonicProgress::new(),
        };
        progress.report(0.0);

        let (bytes, from_cache) = match self.store.get(descriptor) {
            Some(cached) => {
                info!(
                    target: "stagepack::fetch",
                    asset = %name,
                    bytes = cached.len(),
                    "Using cached asset"
                );
                progress.report(CACHE_HIT_PROGRESS);
                (cached, true)
            }
            None => (self.download(descriptor, &mut progress)?, false),
        };

        if let Some(ref expected) = descriptor.sha256 {
            // Verification fills the gap between the current value and the ceiling
            let base = progress.tracker.current();
            let found = sha256_offloaded(&bytes, |hashed| {
                progress.report(base + (NETWORK_PROGRESS_CEILING - base).max(0.0) * hashed);
            })?;
            if !digests_match(&found, expected) {
                warn!(
                    target: "stagepack::fetch",
                    asset = %name,
                    found = %found,
                    expected = %expected,
                    from_cache,
                    "Checksum mismatch"
                );
                return Err(PackError::IntegrityMismatch {
                    asset: name.to_string(),
                    found,
                    expected: expected.clone(),
                });
            }
            debug!(target: "stagepack::fetch", asset = %name, "Checksum verification passed");
        } else {
            debug!(target: "stagepack::fetch", asset = %name, "No checksum, skipping verification");
        }

        if !from_cache {
            self.store.set(descriptor, &bytes);
        }

        progress.report(1.0);
        Ok(bytes)
    }

    /// Fetch several assets concurrently and wait for all of them
    ///
    /// Duplicate names are fetched once. When several fetches fail, the
    /// error of the earliest requested name is returned.
    pub fn fetch_all(&self, names: &[&str]) -> PackResult<HashMap<String, Vec<u8>>> {
        let mut unique: Vec<&str> = Vec::with_capacity(names.len());
        for name in names {
            if !unique.contains(name) {
                unique.push(name);
            }
        }

        let results: Vec<(String, PackResult<Vec<u8>>)> = unique
            .par_iter()
            .map(|name| (name.to_string(), self.fetch(name)))
            .collect();

        results
            .into_iter()
            .map(|(name, result)| result.map(|bytes| (name, bytes)))
            .collect()
    }

    fn download(
        &self,
        descriptor: &AssetDescriptor,
        progress: &mut FetchProgress<'_>,
    ) -> PackResult<Vec<u8>> {
        let url = if descriptor.cache_buster {
            with_cache_buster(&descriptor.src, self.store.cache_buster_token())?
        } else {
            descriptor.src.clone()
        };

        info!(
            target: "stagepack::fetch",
            asset = %descriptor.name,
            url = %url,
            has_checksum = descriptor.sha256.is_some(),
            "Downloading from remote"
        );

        let estimate = descriptor.estimated_size;
        let mut on_chunk = |received: u64, total: Option<u64>| {
            let denominator = total.filter(|t| *t > 0).unwrap_or(estimate);
            if denominator > 0 {
                let fraction = received as f64 / denominator as f64;
                progress.report(fraction.min(NETWORK_PROGRESS_CEILING));
            }
        };

        self.transport
            .get(&url, &mut on_chunk)
            .map_err(|e| PackError::RetrievalFailure {
                asset: descriptor.name.clone(),
                reason: e.to_string(),
            })
    }
}

/// Append the cache-buster token as the URL query
fn with_cache_buster(src: &str, token: &str) -> PackResult<String> {
    let mut url =
        url::Url::parse(src).map_err(|e| PackError::InvalidUrl(format!("{}: {}", src, e)))?;
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{}&{}", existing, token),
        _ => token.to_string(),
    };
    url.set_query(Some(&query));
    Ok(url.to_string())
}
