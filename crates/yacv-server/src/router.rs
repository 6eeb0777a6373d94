//! Axum router construction for the viewer API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS enabled for viewers served from other origins, request
//! tracing, and the activity middleware the stop sequence relies on.

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::activity::track_requests;
use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /` -- status page, update socket on upgrade, object on `?api_object=`
/// - `GET /api/updates` -- `WebSocket` update stream
/// - `GET /api/object/{name}` -- one built object
/// - `GET /api/objects.glbs` -- every current object as a GLBS stream
/// - `GET /api/names` -- current names
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let activity = Arc::clone(&state.activity);

    Router::new()
        .route("/", get(handlers::index))
        .route("/api/updates", get(ws::updates))
        .route("/api/object/{name}", get(handlers::get_object))
        .route("/api/objects.glbs", get(handlers::get_all_objects))
        .route("/api/names", get(handlers::list_names))
        .layer(middleware::from_fn_with_state(activity, track_requests))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
