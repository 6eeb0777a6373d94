//! Shared application state for the HTTP and `WebSocket` handlers.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use yacv_core::Scene;

use crate::activity::Activity;

/// State handed to every handler through Axum's `State` extractor.
///
/// One `AppState` is built per server run. The scene outlives runs; the
/// activity counters and the shutdown token do not.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The scene whose objects are served.
    pub scene: Arc<Scene>,
    /// Request counters read by the stop sequence.
    pub activity: Arc<Activity>,
    /// Cancelled when the serve loop is told to shut down. Open update
    /// sockets close when it fires.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// State for a new run over `scene`.
    pub fn new(scene: Arc<Scene>) -> Self {
        Self {
            scene,
            activity: Arc::new(Activity::new()),
            shutdown: CancellationToken::new(),
        }
    }
}
