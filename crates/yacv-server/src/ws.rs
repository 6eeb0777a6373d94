//! `WebSocket` handler streaming show events to viewers.
//!
//! Clients connect to `GET /api/updates` (or `GET /` with an upgrade) and
//! first receive the whole show event log, then every live event, each as
//! a JSON-encoded [`UpdateNotification`](yacv_types::UpdateNotification)
//! text frame. The socket closes when the client closes it, on a socket
//! error, or when the server shuts down.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use yacv_core::StartAt;
use yacv_pubsub::Subscription;
use yacv_types::ShowEvent;

use crate::state::AppState;

/// Upgrade an HTTP request to an update stream.
///
/// # Route
///
/// `GET /api/updates`
pub async fn updates(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    upgrade(ws, state)
}

pub(crate) fn upgrade(ws: WebSocketUpgrade, state: Arc<AppState>) -> Response {
    ws.on_upgrade(|socket| stream_updates(socket, state))
}

/// The next notification frame, or `None` once the server is shutting down
/// or the subscription was closed.
pub(crate) async fn next_notification(
    updates: &mut Subscription<Arc<ShowEvent>>,
    shutdown: &CancellationToken,
) -> Option<String> {
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => return None,
            event = updates.next() => event?,
        };
        match serde_json::to_string(&event.notification()) {
            Ok(json) => return Some(json),
            Err(e) => warn!(name = %event.name, "Failed to serialize update: {e}"),
        }
    }
}

async fn stream_updates(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("update socket connected");

    let mut updates = state.scene.subscribe(StartAt::Beginning);

    loop {
        tokio::select! {
            json = next_notification(&mut updates, &state.shutdown) => {
                let Some(json) = json else {
                    debug!("server shutting down, closing update socket");
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    debug!("update socket disconnected (send failed)");
                    return;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("update socket disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("update socket disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("update socket error: {e}");
                        return;
                    }
                    // Viewers have nothing to say on this channel.
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use yacv_core::Scene;
    use yacv_types::{BuildOptions, UpdateNotification};

    use super::*;

    const GLB: &[u8] = b"glTF\x02\x00\x00\x00\x0c\x00\x00\x00";

    fn decode(json: &str) -> UpdateNotification {
        serde_json::from_str(json).unwrap()
    }

    #[tokio::test]
    async fn replays_history_then_streams_live_events() {
        let scene = Scene::new();
        let opts = BuildOptions::default().with_auto_clear(false);
        scene.show_glb(GLB.to_vec(), "a", &opts).unwrap();

        let token = CancellationToken::new();
        let mut updates = scene.subscribe(StartAt::Beginning);

        let first = decode(&next_notification(&mut updates, &token).await.unwrap());
        assert_eq!(first.name, "a");
        assert!(!first.is_remove);

        scene.remove("a").unwrap();
        let second = decode(&next_notification(&mut updates, &token).await.unwrap());
        assert_eq!(second.name, "a");
        assert!(second.is_remove);
        assert_eq!(second.hash, first.hash);
    }

    #[tokio::test]
    async fn shutdown_ends_a_pending_read() {
        let scene = Scene::new();
        let token = CancellationToken::new();
        let mut updates = scene.subscribe(StartAt::End);

        let pending = {
            let token = token.clone();
            tokio::spawn(async move { next_notification(&mut updates, &token).await })
        };
        tokio::task::yield_now().await;
        token.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
    }
}
