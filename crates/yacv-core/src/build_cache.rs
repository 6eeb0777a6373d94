//! Per-name build cache with request coalescing.
//!
//! Building an artifact is expensive, so each name has at most one cache
//! entry, and each entry runs its build at most once. Concurrent exports of
//! the same name all wait on the same entry.
//!
//! # Architecture
//!
//! ```text
//! export(A) ─┐
//!            │                  ┌────────────────────┐
//! export(A) ─┼──► entries map ──► CacheEntry { hash, │──► spawn_blocking
//!            │     (mutex)      │   results: Topic } │     Tessellator
//! export(A) ─┘                  └─────────▲──────────┘          │
//!                                         └──── one result ─────┘
//! ```
//!
//! Each entry owns a [`Topic`] that receives exactly one terminal result.
//! Waiters subscribe from the beginning, so joining before or after the
//! build finishes makes no difference. The build runs in a detached task:
//! cancelling a waiting export never cancels the build.
//!
//! A failed build removes its entry before publishing the failure, so every
//! waiter of that attempt sees the error and the next export starts over.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, info, warn};
use yacv_pubsub::{StartAt, Topic};
use yacv_types::{ShowEvent, ShowPayload};

use crate::error::BuildFailure;
use crate::tessellate::Tessellator;

type BuildResult = Result<Bytes, BuildFailure>;

struct CacheEntry {
    /// Content hash of the event this entry was built from.
    hash: String,
    /// Receives exactly one result.
    results: Topic<BuildResult>,
}

struct CacheInner {
    entries: Mutex<HashMap<String, Arc<CacheEntry>>>,
    tessellator: Arc<dyn Tessellator>,
    requests: AtomicU64,
    builds_started: AtomicU64,
    builds_failed: AtomicU64,
    coalesced: AtomicU64,
}

impl CacheInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<CacheEntry>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove `entry` from the map if it is still the one stored for `name`.
    fn discard(&self, name: &str, entry: &Arc<CacheEntry>) {
        let mut entries = self.lock();
        if entries
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            entries.remove(name);
        }
    }
}

/// Snapshot of cache activity counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Export requests received.
    pub requests: u64,
    /// Tessellator invocations started.
    pub builds_started: u64,
    /// Tessellator invocations that failed or panicked.
    pub builds_failed: u64,
    /// Requests served by an existing entry.
    pub coalesced: u64,
}

/// Publishes a result when the build task ends, even if it never got to.
struct Completion {
    name: String,
    entry: Arc<CacheEntry>,
    inner: Arc<CacheInner>,
    done: bool,
}

impl Completion {
    fn finish(mut self, result: BuildResult) {
        if result.is_err() {
            self.inner.discard(&self.name, &self.entry);
        }
        self.entry.results.publish(result);
        self.done = true;
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.done {
            warn!(name = %self.name, "build task ended without a result");
            self.inner.discard(&self.name, &self.entry);
            self.entry.results.publish(Err(BuildFailure::Abandoned));
        }
    }
}

/// Memoizes built artifacts by name.
///
/// Cheap to clone; clones share the same entries.
#[derive(Clone)]
pub struct BuildCache {
    inner: Arc<CacheInner>,
}

impl BuildCache {
    /// A cache that builds geometry with `tessellator`.
    pub fn new(tessellator: impl Tessellator) -> Self {
        Self::with_shared(Arc::new(tessellator))
    }

    /// A cache around an already shared tessellator.
    pub fn with_shared(tessellator: Arc<dyn Tessellator>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(HashMap::new()),
                tessellator,
                requests: AtomicU64::new(0),
                builds_started: AtomicU64::new(0),
                builds_failed: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
            }),
        }
    }

    /// Return the artifact for `event`, building it at most once.
    ///
    /// An entry built from a different hash is replaced. The returned
    /// future may be dropped at any point without affecting the build or
    /// other waiters. Must be called within a Tokio runtime.
    pub async fn export(&self, event: &Arc<ShowEvent>) -> BuildResult {
        self.export_current(event, |_| true).await
    }

    /// Like [`export`](Self::export), but only stores a new entry while
    /// `is_current(event)` holds.
    ///
    /// `is_current` is checked under the entries lock, right before a new
    /// entry would be stored. An event that has been superseded is still
    /// built for this caller, but its entry is never stored, so it cannot
    /// displace the entry of a newer event with the same name.
    pub async fn export_current(
        &self,
        event: &Arc<ShowEvent>,
        is_current: impl FnOnce(&ShowEvent) -> bool,
    ) -> BuildResult {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);
        let (entry, created) = {
            let mut entries = self.inner.lock();
            match entries.get(&event.name) {
                Some(entry) if entry.hash == event.hash => {
                    self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!(name = %event.name, hash = %event.hash, "export served by existing entry");
                    (Arc::clone(entry), false)
                }
                _ => {
                    let entry = Arc::new(CacheEntry {
                        hash: event.hash.clone(),
                        results: Topic::new(),
                    });
                    if is_current(event) {
                        entries.insert(event.name.clone(), Arc::clone(&entry));
                    } else {
                        debug!(name = %event.name, hash = %event.hash, "building superseded event without caching");
                    }
                    (entry, true)
                }
            }
        };
        // Only the caller that created the entry starts its build, so the
        // build runs once even though it starts outside the lock.
        let mut results = entry.results.subscribe(StartAt::Beginning);
        if created {
            self.start_build(entry, Arc::clone(event));
        }
        results
            .next()
            .await
            .unwrap_or(Err(BuildFailure::Abandoned))
    }

    /// Start the one build of `entry`.
    fn start_build(&self, entry: Arc<CacheEntry>, event: Arc<ShowEvent>) {
        let completion = Completion {
            name: event.name.clone(),
            entry,
            inner: Arc::clone(&self.inner),
            done: false,
        };
        let geometry = match &event.payload {
            ShowPayload::Glb(bytes) => {
                debug!(name = %event.name, bytes = bytes.len(), "serving prebuilt GLB");
                completion.finish(Ok(bytes.clone()));
                return;
            }
            ShowPayload::Geometry(geometry) => Arc::clone(geometry),
        };

        self.inner.builds_started.fetch_add(1, Ordering::Relaxed);
        let tessellator = Arc::clone(&self.inner.tessellator);
        tokio::spawn(async move {
            let started = Instant::now();
            let options = event.options.clone();
            let outcome =
                tokio::task::spawn_blocking(move || tessellator.tessellate(&geometry, &options))
                    .await;
            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            let result = match outcome {
                Ok(Ok(bytes)) => {
                    info!(
                        name = %event.name,
                        hash = %event.hash,
                        bytes = bytes.len(),
                        elapsed_ms,
                        "build finished"
                    );
                    Ok(bytes)
                }
                Ok(Err(err)) => Err(BuildFailure::Tessellate(err.to_string())),
                Err(join_err) => Err(BuildFailure::Panicked(join_err.to_string())),
            };
            if let Err(err) = &result {
                completion.inner.builds_failed.fetch_add(1, Ordering::Relaxed);
                warn!(name = %event.name, hash = %event.hash, elapsed_ms, error = %err, "build failed");
            }
            completion.finish(result);
        });
    }

    /// Drop the entry for `name`.
    ///
    /// Exports already waiting on it still receive its result.
    pub fn invalidate(&self, name: &str) -> bool {
        let removed = self.inner.lock().remove(name).is_some();
        if removed {
            debug!(name, "cache entry invalidated");
        }
        removed
    }

    /// Drop the entry for `name` unless it was built from `hash`.
    pub fn invalidate_stale(&self, name: &str, hash: &str) -> bool {
        let mut entries = self.inner.lock();
        let stale = entries.get(name).is_some_and(|entry| entry.hash != hash);
        if stale {
            entries.remove(name);
            debug!(name, "stale cache entry invalidated");
        }
        stale
    }

    /// Whether an entry exists for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().contains_key(name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache has no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Current activity counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            requests: self.inner.requests.load(Ordering::Relaxed),
            builds_started: self.inner.builds_started.load(Ordering::Relaxed),
            builds_failed: self.inner.builds_failed.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for BuildCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildCache")
            .field("entries", &self.len())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
