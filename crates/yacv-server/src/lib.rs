//! Live-preview server: HTTP and `WebSocket` transport plus lifecycle
//! control around a [`yacv_core::Scene`].
//!
//! Viewers subscribe to `GET /api/updates` for show event notifications
//! and fetch built objects from `GET /api/object/{name}`. The [`Server`]
//! owns the serve loop and runs the draining stop sequence; see
//! [`lifecycle`] for its phases.
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`activity`] | Client and in-flight request tracking middleware |
//! | [`config`] | Environment configuration |
//! | [`error`] | [`ApiError`], [`ServerError`], [`LifecycleError`] |
//! | [`handlers`] | REST handlers |
//! | [`lifecycle`] | [`Server`] start/stop state machine |
//! | [`router`] | Route table and middleware stack |
//! | [`server`] | Binding and the serve loop |
//! | [`signals`] | OS termination signals |
//! | [`state`] | Per-run handler state |
//! | [`ws`] | Update stream socket |

pub mod activity;
pub mod config;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod router;
pub mod server;
pub mod signals;
pub mod state;
pub mod ws;

pub use config::{ConfigError, ServerConfig};
pub use error::{ApiError, LifecycleError, ServerError};
pub use lifecycle::{LifecycleState, Server};
pub use router::build_router;
pub use state::AppState;
