//! Content-addressed function upload cache.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::Digest;
use sha2::Sha256;
use tokio::sync::OnceCell;

use crate::call::Function;
use crate::error::TransportError;

/// 256-bit content hash of a function's serialized body.
pub type Fingerprint = [u8; 32];

/// The fabric-assigned identifier for a previously-uploaded function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteFunctionId(pub u64);

/// Computes the fingerprint of a function for cache-keying purposes.
///
/// Keyed by the hash of the serialized payload rather than any
/// language-level identity of the function object, for round-trip
/// determinism.
pub fn fingerprint(function: &Function) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(function.blob.as_bytes());
    hasher.finalize().into()
}

/// Maps a function fingerprint to its fabric-assigned id, guaranteeing
/// at-most-one upload per fingerprint.
///
/// Coalesces concurrent lookups for the same fingerprint onto a single
/// in-flight upload via `Arc<OnceCell<_>>`, so a burst of calls against the
/// same not-yet-uploaded function triggers exactly one HTTP request.
/// Entries are never evicted during a process lifetime.
#[derive(Default)]
pub struct UploadCache {
    /// One `OnceCell` per fingerprint seen so far.
    entries: Mutex<HashMap<Fingerprint, Arc<OnceCell<RemoteFunctionId>>>>,
}

impl UploadCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached id for `function`, uploading it exactly once (per
    /// fingerprint, process-wide) via `upload` if it isn't cached yet.
    ///
    /// If `upload` fails, nothing is inserted and the next caller for the
    /// same fingerprint will retry the upload.
    pub async fn lookup_or_upload<F, Fut>(
        &self,
        function: &Function,
        upload: F,
    ) -> Result<RemoteFunctionId, TransportError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<RemoteFunctionId, TransportError>>,
    {
        let key = fingerprint(function);
        let cell = {
            let mut entries = self.entries.lock();
            entries.entry(key).or_default().clone()
        };

        match cell.get_or_try_init(upload).await {
            Ok(id) => Ok(*id),
            Err(err) => {
                // Allow a future call to retry: drop the failed cell so the
                // next lookup starts a fresh upload attempt instead of
                // re-awaiting a cell that can never succeed (`OnceCell`
                // has no reset once a try_init has failed and the cell is
                // shared, so we replace the map entry instead).
                let mut entries = self.entries.lock();
                if let Some(existing) = entries.get(&key) {
                    if Arc::ptr_eq(existing, &cell) {
                        entries.remove(&key);
                    }
                }
                Err(err)
            }
        }
    }

    /// Number of distinct fingerprints currently tracked (successful or
    /// in-flight).
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
