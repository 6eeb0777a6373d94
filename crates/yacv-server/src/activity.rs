//! Request activity tracking for the stop sequence.
//!
//! Every HTTP request passes through [`track_requests`], which marks that a
//! client has been observed and counts the request as in flight until its
//! response is produced. The lifecycle controller reads both signals while
//! draining. A `WebSocket` upgrade counts only until the upgrade response is
//! sent; the long-lived socket afterwards does not hold the drain open.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tokio::sync::watch;

/// Client and request counters for one server run.
#[derive(Debug)]
pub struct Activity {
    client_seen: watch::Sender<bool>,
    in_flight: AtomicUsize,
    started: AtomicU64,
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}

impl Activity {
    /// Fresh counters: no client seen, nothing in flight.
    pub fn new() -> Self {
        Self {
            client_seen: watch::Sender::new(false),
            in_flight: AtomicUsize::new(0),
            started: AtomicU64::new(0),
        }
    }

    /// Record the start of a request. The request stays in flight until the
    /// returned guard is dropped.
    pub fn begin(self: &Arc<Self>) -> RequestGuard {
        self.client_seen.send_replace(true);
        self.started.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        RequestGuard {
            activity: Arc::clone(self),
        }
    }

    /// Whether any request has been observed.
    pub fn client_seen(&self) -> bool {
        *self.client_seen.borrow()
    }

    /// Resolve once at least one request has been observed.
    pub async fn wait_for_client(&self) {
        let mut rx = self.client_seen.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|seen| *seen).await;
    }

    /// Number of requests currently being handled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Total number of requests started so far.
    pub fn requests_started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }
}

/// Keeps one request counted as in flight.
#[derive(Debug)]
pub struct RequestGuard {
    activity: Arc<Activity>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.activity.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Axum middleware counting every request passing through the router.
pub async fn track_requests(
    State(activity): State<Arc<Activity>>,
    request: Request,
    next: Next,
) -> Response {
    let _guard = activity.begin();
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn guard_tracks_in_flight_requests() {
        let activity = Arc::new(Activity::new());
        assert!(!activity.client_seen());

        let first = activity.begin();
        let second = activity.begin();
        assert_eq!(activity.in_flight(), 2);
        assert_eq!(activity.requests_started(), 2);

        drop(first);
        assert_eq!(activity.in_flight(), 1);
        drop(second);
        assert_eq!(activity.in_flight(), 0);
        assert_eq!(activity.requests_started(), 2);
        assert!(activity.client_seen());
    }

    #[tokio::test]
    async fn wait_for_client_resolves_on_first_request() {
        let activity = Arc::new(Activity::new());

        let waiter = {
            let activity = Arc::clone(&activity);
            tokio::spawn(async move { activity.wait_for_client().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(activity.begin());
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();

        // Already seen: resolves immediately.
        activity.wait_for_client().await;
    }
}
