//! Show events and the notification viewers receive for each one.
//!
//! A [`ShowEvent`] is what the producer publishes into the show event log.
//! It carries the full payload needed to build the artifact later. Viewers
//! never see the payload: they receive an [`UpdateNotification`] and fetch
//! the built bytes separately by name.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::geometry::Geometry;
use crate::options::BuildOptions;

/// What a show event publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum ShowPayload {
    /// Normalized geometry that must be tessellated before export.
    Geometry(Arc<Geometry>),
    /// An already-built binary glTF container, exported as-is.
    Glb(Bytes),
}

impl ShowPayload {
    /// Short label used in logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Geometry(_) => "geometry",
            Self::Glb(_) => "glb",
        }
    }
}

/// A named artifact being published to, or removed from, the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowEvent {
    /// Name of the object. Showing the same name again replaces it.
    pub name: String,
    /// Content hash of the payload plus build options.
    pub hash: String,
    /// The object to build.
    pub payload: ShowPayload,
    /// Whether this event removes `name` from the scene.
    pub is_remove: bool,
    /// Options used when building the artifact.
    pub options: BuildOptions,
}

impl ShowEvent {
    /// Create a (non-remove) show event.
    pub fn new(
        name: impl Into<String>,
        hash: impl Into<String>,
        payload: ShowPayload,
        options: BuildOptions,
    ) -> Self {
        Self {
            name: name.into(),
            hash: hash.into(),
            payload,
            is_remove: false,
            options,
        }
    }

    /// A tombstone for this event: same name, hash and payload, marked removed.
    #[must_use]
    pub fn tombstone(&self) -> Self {
        Self {
            is_remove: true,
            ..self.clone()
        }
    }

    /// The notification pushed to viewers for this event.
    pub fn notification(&self) -> UpdateNotification {
        UpdateNotification {
            name: self.name.clone(),
            hash: self.hash.clone(),
            is_remove: self.is_remove,
        }
    }
}

/// JSON message pushed to viewers for every delivered show event.
///
/// No binary payload is inlined; viewers compare `hash` against what they
/// already have and fetch the artifact by `name` when it changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UpdateNotification {
    /// Name of the object.
    pub name: String,
    /// Content hash of the object.
    pub hash: String,
    /// Whether the object was removed from the scene.
    pub is_remove: bool,
}
