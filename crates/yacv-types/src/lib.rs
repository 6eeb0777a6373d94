//! Shared type definitions for the yacv live-preview server.
//!
//! This crate is the single source of truth for the data that flows between
//! the producer API, the show event log, the build cache and the viewer
//! transport. The notification type sent to viewers is exported to
//! `TypeScript` via `ts-rs` for the frontend.
//!
//! # Modules
//!
//! - [`events`] -- Show events, their payloads and the viewer notification
//! - [`geometry`] -- Canonical geometric representation of shown objects
//! - [`options`] -- Per-object build options

pub mod events;
pub mod geometry;
pub mod options;

// Re-export all public types at crate root for convenience.
pub use events::{ShowEvent, ShowPayload, UpdateNotification};
pub use geometry::{Edge, Face, Geometry, Placement, Shape};
pub use options::BuildOptions;

#[cfg(test)]
mod tests {
    //! Type export checks and `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // Writes `bindings/UpdateNotification.ts` relative to the crate root.
        use ts_rs::TS;

        let _ = crate::events::UpdateNotification::export_all();
    }
}
