//! Producer-side engine of the yacv live-preview server.
//!
//! A producer shows named objects into a [`Scene`]. Viewers subscribe to the
//! scene's show event log for update notifications and fetch built artifacts
//! by name through the build cache.
//!
//! # Architecture
//!
//! ```text
//! producer ── show/remove/clear ──► Scene ──► ShowLog (Topic<ShowEvent>) ──► viewers
//!                                     │
//!                                     │ export(name)
//!                                     ▼
//!                                BuildCache ──► Tessellator ──► GLB bytes
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`adapter`] | Ordered shape adapter probes normalizing producer objects |
//! | [`build_cache`] | At-most-once builds per name with request coalescing |
//! | [`error`] | [`SceneError`] and [`BuildFailure`] |
//! | [`glb`] | Binary glTF container writer |
//! | [`glbs`] | GLBS multi-container stream |
//! | [`hash`] | Content hashing of payloads and build options |
//! | [`scene`] | The producer-facing facade |
//! | [`show_log`] | Name-keyed show event log |
//! | [`tessellate`] | Tessellator seam and the default mesh tessellator |

pub mod adapter;
pub mod build_cache;
pub mod error;
pub mod glb;
pub mod glbs;
pub mod hash;
pub mod scene;
pub mod show_log;
pub mod tessellate;

pub use adapter::{AdapterRegistry, Probe, ShapeAdapter};
pub use build_cache::{BuildCache, CacheStats};
pub use error::{BuildFailure, SceneError};
pub use glbs::{GlbsError, encode_glbs};
pub use hash::content_hash;
pub use scene::{Scene, ShowItem};
pub use show_log::ShowLog;
pub use tessellate::{MeshTessellator, TessellateError, Tessellator};
pub use yacv_pubsub::StartAt;
