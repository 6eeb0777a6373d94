//! HTTP handlers for the viewer API.
//!
//! Built artifacts are served as binary glTF; everything else is JSON,
//! except the status page. Handler errors go through
//! [`ApiError`](crate::error::ApiError).

use std::sync::Arc;

use axum::Json;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::{HeaderValue, header};
use axum::response::{Html, IntoResponse, Response};
use bytes::Bytes;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::AppState;
use crate::ws;

/// Content type of a single built artifact.
pub const GLB_CONTENT_TYPE: &str = "model/gltf-binary";
/// Content type of a GLBS bundle.
pub const GLBS_CONTENT_TYPE: &str = "application/octet-stream";

/// Query parameters accepted by `GET /`.
#[derive(Debug, Default, Deserialize)]
pub struct IndexQuery {
    /// Fetch this object instead of the status page.
    pub api_object: Option<String>,
}

/// The root route doubles as the update socket and the object fetch for
/// viewers that only know the server's base URL.
///
/// # Route
///
/// `GET /`, `GET /?api_object={name}`
pub async fn index(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    Query(query): Query<IndexQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    if let Ok(ws) = ws {
        return Ok(ws::upgrade(ws, state));
    }
    if let Some(name) = query.api_object {
        return object_response(&state, &name).await;
    }

    let names = state.scene.current_names(true);
    let stats = state.scene.cache_stats();
    let rows: String = names
        .iter()
        .map(|name| {
            let name = escape_html(name);
            format!("<li><a href=\"/api/object/{name}\">{name}</a></li>")
        })
        .collect();

    Ok(Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>yacv</title>
    <style>
        body {{ font-family: monospace; padding: 2rem; max-width: 800px; margin: 0 auto; }}
        .muted {{ color: #777; }}
    </style>
</head>
<body>
    <h1>yacv</h1>
    <p class="muted">Live preview server. Connect a viewer to this address.</p>
    <h2>Objects ({count})</h2>
    <ul>{rows}</ul>
    <p class="muted">builds: {started} started, {failed} failed, {coalesced} coalesced &middot; viewers: {viewers}</p>
</body>
</html>"#,
        count = names.len(),
        started = stats.builds_started,
        failed = stats.builds_failed,
        coalesced = stats.coalesced,
        viewers = state.scene.subscriber_count(),
    ))
    .into_response())
}

/// Built artifact for one object.
///
/// # Route
///
/// `GET /api/object/{name}`
pub async fn get_object(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    object_response(&state, &name).await
}

/// Every current object packed as a GLBS stream.
///
/// # Route
///
/// `GET /api/objects.glbs`
pub async fn get_all_objects(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let bundle = state.scene.export_all_glbs().await?;
    Ok((
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static(GLBS_CONTENT_TYPE),
        )],
        bundle,
    )
        .into_response())
}

/// Names of the current objects, in log order.
///
/// # Route
///
/// `GET /api/names`
pub async fn list_names(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.scene.current_names(true))
}

async fn object_response(state: &AppState, name: &str) -> Result<Response, ApiError> {
    let bytes = state.scene.export(name).await?;
    Ok(glb_response(name, bytes))
}

fn glb_response(name: &str, bytes: Bytes) -> Response {
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}.glb\"",
        name.replace(['"', '\\'], "_")
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(GLB_CONTENT_TYPE),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
