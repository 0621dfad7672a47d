//! Tests for asset fetching, caching and verification

use stagepack::checksum::sha256_hex;
use stagepack::fetcher::ChunkCallback;
use stagepack::{
    AssetCatalog, AssetDescriptor, AssetFetcher, CacheBackend, DiskCache, IntegrityStore,
    MemoryCache, PackError, PackResult, ProgressHub, ProgressRecorder, Transport,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Serves fixed bodies by URL path, can be switched off
#[derive(Default)]
struct StubTransport {
    bodies: HashMap<String, Vec<u8>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    content_length: bool,
}

impl StubTransport {
    fn with(mut self, url: &str, body: &[u8]) -> Self {
        self.bodies.insert(url.to_string(), body.to_vec());
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transport for StubTransport {
    fn get(&self, url: &str, on_chunk: &mut ChunkCallback<'_>) -> PackResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(PackError::Config("network disabled".to_string()));
        }
        let key = url.split('?').next().unwrap_or(url);
        let body = self
            .bodies
            .get(key)
            .cloned()
            .ok_or_else(|| PackError::Config(format!("404 {}", url)))?;
        let total = self.content_length.then_some(body.len() as u64);
        for end in (1..=body.len()).step_by(4) {
            on_chunk(end as u64, total);
        }
        on_chunk(body.len() as u64, total);
        Ok(body)
    }
}

fn scaffolding_catalog() -> AssetCatalog {
    AssetCatalog::new("test").with_asset(AssetDescriptor::new("scaffolding", "https://x/y.js"))
}

#[test]
fn test_second_fetch_served_from_cache() {
    let catalog = scaffolding_catalog();
    let store = IntegrityStore::memory(&catalog);
    let transport = Arc::new(StubTransport::default().with("https://x/y.js", b"console.log(1)"));
    let fetcher = AssetFetcher::new(catalog, store, transport.clone());

    let first = fetcher.fetch("scaffolding").unwrap();
    assert_eq!(first, b"console.log(1)");

    transport.offline.store(true, Ordering::SeqCst);
    let second = fetcher.fetch("scaffolding").unwrap();
    assert_eq!(second, b"console.log(1)");
    assert_eq!(transport.calls(), 1);
}

#[test]
fn test_hash_mismatch_is_not_cached() {
    let catalog = AssetCatalog::new("test")
        .with_asset(AssetDescriptor::new("runtime", "https://x/r.zip").with_sha256("abc123"));
    let backend = Arc::new(MemoryCache::new());
    let store = IntegrityStore::new(backend.clone(), &catalog);
    let transport = Arc::new(StubTransport::default().with("https://x/r.zip", b"payload"));
    let fetcher = AssetFetcher::new(catalog, store, transport);

    let err = fetcher.fetch("runtime").unwrap_err();
    match err {
        PackError::IntegrityMismatch {
            asset,
            found,
            expected,
        } => {
            assert_eq!(asset, "runtime");
            assert_eq!(found, sha256_hex(b"payload"));
            assert_eq!(expected, "abc123");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(backend.is_empty());
}

#[test]
fn test_matching_hash_accepted_case_insensitive() {
    let digest = sha256_hex(b"payload").to_uppercase();
    let catalog = AssetCatalog::new("test")
        .with_asset(AssetDescriptor::new("runtime", "https://x/r.zip").with_sha256(digest));
    let store = IntegrityStore::memory(&catalog);
    let transport = Arc::new(StubTransport::default().with("https://x/r.zip", b"payload"));
    let fetcher = AssetFetcher::new(catalog, store, transport);

    assert_eq!(fetcher.fetch("runtime").unwrap(), b"payload");
}

#[test]
fn test_unknown_asset_rejected() {
    let catalog = scaffolding_catalog();
    let store = IntegrityStore::disabled(&catalog);
    let fetcher = AssetFetcher::new(catalog, store, Arc::new(StubTransport::default()));

    assert!(matches!(
        fetcher.fetch("nwjs-linux"),
        Err(PackError::InvalidAssetRequest(_))
    ));
}

#[test]
fn test_transport_failure_is_retrieval_failure() {
    let catalog = scaffolding_catalog();
    let store = IntegrityStore::disabled(&catalog);
    let fetcher = AssetFetcher::new(catalog, store, Arc::new(StubTransport::default()));

    match fetcher.fetch("scaffolding") {
        Err(PackError::RetrievalFailure { asset, .. }) => assert_eq!(asset, "scaffolding"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_progress_is_monotonic_and_ends_at_one() {
    let catalog = AssetCatalog::new("test")
        .with_asset(AssetDescriptor::new("big", "https://x/big.bin").with_estimated_size(10));
    let store = IntegrityStore::disabled(&catalog);
    let transport = Arc::new(StubTransport {
        content_length: true,
        ..Default::default()
    }
    .with("https://x/big.bin", &[7u8; 40]));
    let recorder = Arc::new(ProgressRecorder::new());
    let mut hub = ProgressHub::new();
    hub.subscribe(recorder.clone());
    let fetcher = AssetFetcher::new(catalog, store, transport).with_progress(hub);

    fetcher.fetch("big").unwrap();

    let values = recorder.asset_progress("big");
    assert_eq!(values.first(), Some(&0.0));
    assert_eq!(values.last(), Some(&1.0));
    assert!(values.windows(2).all(|w| w[0] < w[1]));
    // Content length wins over the (wrong) estimate
    assert!(values[..values.len() - 1].iter().all(|v| *v < 1.0));
}

#[test]
fn test_cache_hit_reports_half() {
    let catalog = scaffolding_catalog();
    let store = IntegrityStore::memory(&catalog);
    let transport = Arc::new(StubTransport::default().with("https://x/y.js", b"x"));
    let fetcher = AssetFetcher::new(catalog.clone(), store.clone(), transport.clone());
    fetcher.fetch("scaffolding").unwrap();

    let recorder = Arc::new(ProgressRecorder::new());
    let mut hub = ProgressHub::new();
    hub.subscribe(recorder.clone());
    let cached = AssetFetcher::new(catalog, store, transport).with_progress(hub);
    cached.fetch("scaffolding").unwrap();

    assert_eq!(recorder.asset_progress("scaffolding"), vec![0.0, 0.5, 1.0]);
}

#[test]
fn test_fetch_all_waits_for_every_asset() {
    let catalog = AssetCatalog::new("test")
        .with_asset(AssetDescriptor::new("a", "https://x/a"))
        .with_asset(AssetDescriptor::new("b", "https://x/b"))
        .with_asset(AssetDescriptor::new("c", "https://x/c"));
    let store = IntegrityStore::disabled(&catalog);
    let transport = Arc::new(
        StubTransport::default()
            .with("https://x/a", b"A")
            .with("https://x/b", b"B")
            .with("https://x/c", b"C"),
    );
    let fetcher = AssetFetcher::new(catalog, store, transport.clone());

    let assets = fetcher.fetch_all(&["a", "b", "c", "a"]).unwrap();
    assert_eq!(assets.len(), 3);
    assert_eq!(assets["b"], b"B");
    assert_eq!(transport.calls(), 3);
}

#[test]
fn test_fetch_all_reports_first_error_in_request_order() {
    let catalog = AssetCatalog::new("test")
        .with_asset(AssetDescriptor::new("a", "https://x/a"))
        .with_asset(AssetDescriptor::new("b", "https://x/b").with_sha256("00"));
    let store = IntegrityStore::disabled(&catalog);
    let transport = Arc::new(StubTransport::default().with("https://x/b", b"B"));
    let fetcher = AssetFetcher::new(catalog, store, transport);

    match fetcher.fetch_all(&["a", "b"]) {
        Err(PackError::RetrievalFailure { asset, .. }) => assert_eq!(asset, "a"),
        other => panic!("unexpected result: {:?}", other.map(|m| m.len())),
    }
}

#[test]
fn test_disk_cache_survives_new_store() {
    let temp = TempDir::new().unwrap();
    let catalog = scaffolding_catalog();
    let transport = Arc::new(StubTransport::default().with("https://x/y.js", b"console.log(1)"));

    let store = IntegrityStore::new(Arc::new(DiskCache::new(temp.path())), &catalog);
    AssetFetcher::new(catalog.clone(), store, transport.clone())
        .fetch("scaffolding")
        .unwrap();

    transport.offline.store(true, Ordering::SeqCst);
    let reopened = IntegrityStore::new(Arc::new(DiskCache::new(temp.path())), &catalog);
    let bytes = AssetFetcher::new(catalog, reopened, transport)
        .fetch("scaffolding")
        .unwrap();
    assert_eq!(bytes, b"console.log(1)");
}

/// Backend whose every operation fails
struct FailingBackend {
    attempts: Mutex<usize>,
}

impl CacheBackend for FailingBackend {
    fn load(&self, _: &AssetDescriptor) -> PackResult<Option<Vec<u8>>> {
        *self.attempts.lock().unwrap() += 1;
        Err(PackError::CacheFailure("load".to_string()))
    }

    fn store(&self, _: &AssetDescriptor, _: &[u8]) -> PackResult<()> {
        *self.attempts.lock().unwrap() += 1;
        Err(PackError::CacheFailure("store".to_string()))
    }

    fn kind(&self) -> &'static str {
        "failing"
    }
}

#[test]
fn test_cache_failures_do_not_fail_fetch() {
    let catalog = scaffolding_catalog();
    let backend = Arc::new(FailingBackend {
        attempts: Mutex::new(0),
    });
    let store = IntegrityStore::new(backend.clone(), &catalog);
    let transport = Arc::new(StubTransport::default().with("https://x/y.js", b"ok"));
    let fetcher = AssetFetcher::new(catalog, store, transport);

    assert_eq!(fetcher.fetch("scaffolding").unwrap(), b"ok");
    assert_eq!(*backend.attempts.lock().unwrap(), 2);
}

#[test]
fn test_corrupted_cache_entry_is_rejected() {
    let descriptor =
        AssetDescriptor::new("runtime", "https://x/r.zip").with_sha256(sha256_hex(b"good"));
    let catalog = AssetCatalog::new("test").with_asset(descriptor.clone());
    let backend = Arc::new(MemoryCache::new());
    backend.store(&descriptor, b"bad").unwrap();
    let store = IntegrityStore::new(backend, &catalog);
    let transport = Arc::new(StubTransport::default().with("https://x/r.zip", b"good"));
    let fetcher = AssetFetcher::new(catalog, store, transport.clone());

    match fetcher.fetch("runtime") {
        Err(PackError::IntegrityMismatch {
            asset,
            found,
            expected,
        }) => {
            assert_eq!(asset, "runtime");
            assert_eq!(found, sha256_hex(b"bad"));
            assert_eq!(expected, sha256_hex(b"good"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(transport.calls(), 0);
}
