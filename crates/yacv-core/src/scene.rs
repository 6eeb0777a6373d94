//! The producer-facing scene.
//!
//! [`Scene`] ties the show event log, the shape adapters and the build cache
//! together. It is an explicit instance shared by reference between the
//! producer and the transport; nothing here is global.
//!
//! Producer operations (`show*`, `remove`, `clear`) are serialized behind
//! one lock, so the delete-then-publish steps for a name never interleave
//! with another producer call. Exports and subscriptions never take it.

use std::any::Any;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use futures::future::try_join_all;
use tracing::{debug, info};
use yacv_pubsub::{StartAt, Subscription};
use yacv_types::{BuildOptions, ShowEvent, ShowPayload};

use crate::adapter::AdapterRegistry;
use crate::build_cache::{BuildCache, CacheStats};
use crate::error::SceneError;
use crate::glbs::encode_glbs;
use crate::hash::content_hash;
use crate::show_log::ShowLog;
use crate::tessellate::{MeshTessellator, Tessellator};

/// What a [`ShowItem`] shows.
enum Source<'a> {
    Object {
        object: &'a dyn Any,
        type_name: &'static str,
    },
    Glb(Bytes),
}

/// One object in a [`Scene::show_all`] batch.
pub struct ShowItem<'a> {
    source: Source<'a>,
    name: Option<String>,
}

impl<'a> ShowItem<'a> {
    /// A producer object, normalized through the scene's adapters.
    pub fn object<T: Any>(object: &'a T) -> Self {
        Self {
            source: Source::Object {
                object,
                type_name: std::any::type_name::<T>(),
            },
            name: None,
        }
    }

    /// An already-built GLB container.
    pub fn glb(bytes: impl Into<Bytes>) -> Self {
        Self {
            source: Source::Glb(bytes.into()),
            name: None,
        }
    }

    /// Give the item an explicit name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// The shown objects of one server instance.
pub struct Scene {
    log: ShowLog,
    cache: BuildCache,
    adapters: AdapterRegistry,
    placeholders: AtomicU64,
    producer: Mutex<()>,
}

impl Scene {
    /// A scene with the default adapters and the [`MeshTessellator`].
    pub fn new() -> Self {
        Self::with_parts(AdapterRegistry::with_defaults(), MeshTessellator)
    }

    /// A scene with custom adapters and tessellator.
    pub fn with_parts(adapters: AdapterRegistry, tessellator: impl Tessellator) -> Self {
        Self {
            log: ShowLog::new(),
            cache: BuildCache::new(tessellator),
            adapters,
            placeholders: AtomicU64::new(0),
            producer: Mutex::new(()),
        }
    }

    fn producer_lock(&self) -> MutexGuard<'_, ()> {
        self.producer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn placeholder_name(&self) -> String {
        let n = self.placeholders.fetch_add(1, Ordering::Relaxed);
        format!("object_{n}")
    }

    /// Normalize and hash one item. Touches no shared state but the
    /// placeholder counter.
    fn prepare(
        &self,
        item: ShowItem<'_>,
        options: &BuildOptions,
    ) -> Result<Arc<ShowEvent>, SceneError> {
        let payload = match item.source {
            Source::Object { object, type_name } => {
                let geometry = self.adapters.normalize(object, type_name)?.into_y_up();
                ShowPayload::Geometry(Arc::new(geometry))
            }
            Source::Glb(bytes) => ShowPayload::Glb(bytes),
        };
        let name = item
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.placeholder_name());
        let hash = content_hash(&payload, options);
        Ok(Arc::new(ShowEvent::new(name, hash, payload, options.clone())))
    }

    /// Publish prepared events, clearing other names first when asked.
    fn commit(&self, events: &[Arc<ShowEvent>], auto_clear: bool) {
        let _producer = self.producer_lock();
        if auto_clear {
            let keep: HashSet<&str> = events.iter().map(|event| event.name.as_str()).collect();
            self.clear_locked(|name| keep.contains(name));
        }
        // Publish before invalidating so an export racing this commit either
        // sees the new event as current or has its entry dropped here.
        for event in events {
            self.log.publish(Arc::clone(event));
            self.cache.invalidate_stale(&event.name, &event.hash);
        }
    }

    /// Show several objects at once.
    ///
    /// Every item is normalized before anything is published, so an
    /// unsupported object leaves the scene untouched. Items without a name
    /// get `object_<n>` placeholders. With `auto_clear`, every current name
    /// outside the batch is removed first.
    pub fn show_all(
        &self,
        items: Vec<ShowItem<'_>>,
        options: &BuildOptions,
    ) -> Result<Vec<Arc<ShowEvent>>, SceneError> {
        let started = Instant::now();
        let events = items
            .into_iter()
            .map(|item| self.prepare(item, options))
            .collect::<Result<Vec<_>, _>>()?;
        self.commit(&events, options.auto_clear);
        let names: Vec<&str> = events.iter().map(|event| event.name.as_str()).collect();
        info!(
            names = ?names,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "shown"
        );
        Ok(events)
    }

    /// Show one producer object under `name` (or a placeholder).
    pub fn show<T: Any>(
        &self,
        object: &T,
        name: Option<&str>,
        options: &BuildOptions,
    ) -> Result<Arc<ShowEvent>, SceneError> {
        let mut item = ShowItem::object(object);
        item.name = name.map(str::to_owned);
        self.show_one(item, options)
    }

    /// Show an already-built GLB container under `name`.
    pub fn show_glb(
        &self,
        bytes: impl Into<Bytes>,
        name: &str,
        options: &BuildOptions,
    ) -> Result<Arc<ShowEvent>, SceneError> {
        self.show_one(ShowItem::glb(bytes).named(name), options)
    }

    fn show_one(
        &self,
        item: ShowItem<'_>,
        options: &BuildOptions,
    ) -> Result<Arc<ShowEvent>, SceneError> {
        let started = Instant::now();
        let event = self.prepare(item, options)?;
        self.commit(std::slice::from_ref(&event), options.auto_clear);
        info!(
            name = %event.name,
            hash = %event.hash,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "shown"
        );
        Ok(event)
    }

    /// Remove `name` from the scene.
    ///
    /// Publishes a tombstone carrying the last hash and drops the cached
    /// build. Fails with [`SceneError::NotFound`] if `name` is not current.
    pub fn remove(&self, name: &str) -> Result<Arc<ShowEvent>, SceneError> {
        let _producer = self.producer_lock();
        let tombstone = self.log.remove(name).ok_or_else(|| SceneError::NotFound {
            name: name.to_owned(),
        })?;
        self.cache.invalidate(name);
        info!(name, "removed");
        Ok(tombstone)
    }

    fn clear_locked(&self, keep: impl FnMut(&str) -> bool) -> Vec<String> {
        let removed = self.log.clear(keep);
        for name in &removed {
            self.cache.invalidate(name);
        }
        if !removed.is_empty() {
            debug!(removed = ?removed, "cleared");
        }
        removed
    }

    /// Remove every current name not in `except`. Returns the removed names.
    pub fn clear(&self, except: &[&str]) -> Vec<String> {
        let _producer = self.producer_lock();
        self.clear_locked(|name| except.contains(&name))
    }

    /// Names currently in the log, in order of their latest event.
    ///
    /// With `apply_removes`, removed names are left out.
    pub fn current_names(&self, apply_removes: bool) -> Vec<String> {
        self.log.current_names(apply_removes)
    }

    /// The current event for `name`.
    pub fn current_event(&self, name: &str) -> Option<Arc<ShowEvent>> {
        self.log.current_event(name)
    }

    /// Subscribe to show events.
    pub fn subscribe(&self, start: StartAt) -> Subscription<Arc<ShowEvent>> {
        self.log.subscribe(start)
    }

    /// Number of open show event subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.log.subscriber_count()
    }

    /// Build activity counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The built artifact for `name`.
    pub async fn export(&self, name: &str) -> Result<Bytes, SceneError> {
        let event = self.current_event(name).ok_or_else(|| SceneError::NotFound {
            name: name.to_owned(),
        })?;
        self.export_event(&event).await
    }

    async fn export_event(&self, event: &Arc<ShowEvent>) -> Result<Bytes, SceneError> {
        self.cache
            .export_current(event, |shown| {
                self.log
                    .current_event(&shown.name)
                    .is_some_and(|current| current.hash == shown.hash)
            })
            .await
            .map_err(|source| SceneError::Build {
                name: event.name.clone(),
                source,
            })
    }

    /// Build every current object, concurrently, and pack the results as a
    /// GLBS stream in log order.
    pub async fn export_all_glbs(&self) -> Result<Bytes, SceneError> {
        let events = self.log.current_events();
        let glbs = try_join_all(events.iter().map(|event| self.export_event(event))).await?;
        Ok(encode_glbs(&glbs)?)
    }

    /// Write `<name>.glb` into `dir` for every current object accepted by
    /// `filter`, creating `dir` if needed. Returns the written paths.
    pub async fn export_all(
        &self,
        dir: impl AsRef<Path>,
        mut filter: impl FnMut(&str, &ShowPayload) -> bool,
    ) -> Result<Vec<PathBuf>, SceneError> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let mut written = Vec::new();
        for event in self.log.current_events() {
            if !filter(&event.name, &event.payload) {
                continue;
            }
            let bytes = self.export_event(&event).await?;
            let path = dir.join(format!("{}.glb", file_stem(&event.name)));
            tokio::fs::write(&path, &bytes).await?;
            debug!(name = %event.name, path = %path.display(), "exported");
            written.push(path);
        }
        Ok(written)
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("log", &self.log)
            .field("cache", &self.cache)
            .field("adapters", &self.adapters)
            .finish_non_exhaustive()
    }
}

/// A file name stem for `name` that cannot leave the export directory.
fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.starts_with('.') {
        format!("_{stem}")
    } else {
        stem
    }
}
