//! Error types for the producer-side engine.
//!
//! [`SceneError`] is what producer and transport callers see.
//! [`BuildFailure`] is cloneable because one failed build attempt is
//! reported to every request waiting on it.

use crate::glbs::GlbsError;

/// Errors surfaced by [`Scene`](crate::Scene) operations.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// No current (non-removed) object has this name.
    #[error("no object named {name} was previously shown")]
    NotFound {
        /// The requested name.
        name: String,
    },

    /// No shape adapter recognised the producer object.
    #[error("cannot show object of type {type_name}")]
    UnsupportedObject {
        /// Rust type name of the rejected object.
        type_name: &'static str,
    },

    /// Building the artifact failed.
    #[error("failed to build {name}: {source}")]
    Build {
        /// Name of the object being built.
        name: String,
        /// The underlying build failure.
        source: BuildFailure,
    },

    /// Packing several artifacts into a GLBS bundle failed.
    #[error("bundle error: {0}")]
    Glbs(#[from] GlbsError),

    /// Writing exported artifacts to disk failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single build attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildFailure {
    /// The tessellator returned an error.
    #[error("tessellation failed: {0}")]
    Tessellate(String),

    /// The build task panicked or was cancelled by the runtime.
    #[error("build task aborted: {0}")]
    Panicked(String),

    /// The cache entry went away before delivering a result.
    #[error("build result was abandoned")]
    Abandoned,
}
