//! SHA-256 verification of fetched assets
//!
//! Digests of large buffers are computed on a scoped worker thread. The
//! coordinating thread polls the worker and hands the hashed fraction to a
//! callback, so progress keeps flowing while the digest is computed. The
//! scope joins the worker before returning, on success, error and panic alike.

use crate::error::{PackError, PackResult};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// Bytes hashed between two progress updates of the worker
const HASH_BLOCK: usize = 1 << 20;

/// How often the coordinating thread polls the worker
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Lowercase hex SHA-256 of `content`
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// [`sha256_hex`] computed on a dedicated worker thread
///
/// `on_progress` runs on the calling thread with the hashed fraction in
/// `[0, 1]` until the worker is done.
pub fn sha256_offloaded(content: &[u8], mut on_progress: impl FnMut(f64)) -> PackResult<String> {
    let hashed = AtomicUsize::new(0);
    let total = content.len().max(1);

    thread::scope(|scope| {
        let worker = thread::Builder::new()
            .name("stagepack-checksum".to_string())
            .spawn_scoped(scope, || {
                let mut hasher = Sha256::new();
                for block in content.chunks(HASH_BLOCK) {
                    hasher.update(block);
                    hashed.fetch_add(block.len(), Ordering::Relaxed);
                }
                format!("{:x}", hasher.finalize())
            })?;

        while !worker.is_finished() {
            on_progress(hashed.load(Ordering::Relaxed) as f64 / total as f64);
            thread::park_timeout(POLL_INTERVAL);
        }
        on_progress(1.0);

        worker
            .join()
            .map_err(|_| PackError::Io(std::io::Error::other("checksum worker panicked")))
    })
}

/// Compare two hex digests, ignoring case
pub fn digests_match(found: &str, expected: &str) -> bool {
    found.eq_ignore_ascii_case(expected.trim())
}
