//! Binding and running the HTTP serve loop.
//!
//! [`bind`] opens the listener and [`serve`] runs the router on it until the
//! run's shutdown token is cancelled. The [`Server`](crate::Server)
//! lifecycle controller drives both from a background task.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::router::build_router;
use crate::state::AppState;

/// Bind a listener on the configured address.
pub async fn bind(config: &ServerConfig) -> Result<(TcpListener, SocketAddr), ServerError> {
    let requested = config.bind_address();
    let listener = TcpListener::bind(&requested)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {requested}: {e}")))?;
    let addr = listener
        .local_addr()
        .map_err(|e| ServerError::Bind(format!("no local address for {requested}: {e}")))?;
    Ok((listener, addr))
}

/// Serve the viewer API on `listener` until `state.shutdown` is cancelled.
///
/// Returns once every in-progress HTTP connection has finished.
/// Upgraded update sockets close on their own when the token fires.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<(), ServerError> {
    let shutdown = state.shutdown.clone();
    let router = build_router(state);

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "serving viewer API");
    }

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| ServerError::Serve(e.to_string()))?;

    debug!("serve loop exited");
    Ok(())
}
