//! Start/stop state machine around the serve loop.
//!
//! ```text
//! Stopped ──start()──► Starting ──ready──► Running ──stop()──► Draining ──► Stopped
//! ```
//!
//! Stopping is deliberately patient so a short-lived producer script still
//! gets its objects to a viewer:
//!
//! 1. Wait until at least one client has made a request, at most
//!    `grace_connect`.
//! 2. Wait until no request is in flight, at most `grace_request` measured
//!    from the most recent request start.
//! 3. Cancel the run's shutdown token and join the serve loop, at most
//!    `shutdown_timeout`. Past that the loop is aborted.
//!
//! [`Server::interrupt`] cuts steps 1 and 2 short. Step 3 cannot be
//! interrupted.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use yacv_core::Scene;

use crate::activity::Activity;
use crate::config::ServerConfig;
use crate::error::{LifecycleError, ServerError};
use crate::server;
use crate::state::AppState;

/// How often the drain step re-checks the in-flight count.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not serving.
    Stopped,
    /// The serve loop is starting.
    Starting,
    /// Serving requests.
    Running,
    /// A stop sequence is in progress.
    Draining,
}

struct Run {
    addr: SocketAddr,
    state: Arc<AppState>,
    task: JoinHandle<Result<(), ServerError>>,
}

enum Phase {
    Stopped,
    Starting,
    Running(Run),
    Draining(SocketAddr),
}

/// Returns the server to `Stopped` when a `start` or `stop` future is
/// dropped midway, shutting down the serve loop it leaves behind.
struct Teardown<'a> {
    phase: &'a Mutex<Phase>,
    shutdown: CancellationToken,
    abort: AbortHandle,
    armed: bool,
}

impl<'a> Teardown<'a> {
    fn new(phase: &'a Mutex<Phase>, run_state: &AppState, abort: AbortHandle) -> Self {
        Self {
            phase,
            shutdown: run_state.shutdown.clone(),
            abort,
            armed: true,
        }
    }

    /// The operation completed; leave the serve loop alone.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("lifecycle operation cancelled, tearing down the serve loop");
            self.shutdown.cancel();
            self.abort.abort();
            *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = Phase::Stopped;
        }
    }
}

/// The live-preview server: a [`Scene`] plus the serve loop exposing it.
///
/// The scene outlives start/stop cycles, so objects shown while stopped are
/// served by the next run.
pub struct Server {
    config: ServerConfig,
    scene: Arc<Scene>,
    phase: Mutex<Phase>,
    interrupt: Mutex<CancellationToken>,
}

impl Server {
    /// A stopped server over `scene`.
    pub fn new(config: ServerConfig, scene: Arc<Scene>) -> Self {
        Self {
            config,
            scene,
            phase: Mutex::new(Phase::Stopped),
            interrupt: Mutex::new(CancellationToken::new()),
        }
    }

    /// The scene this server exposes.
    pub const fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    /// The configuration this server was built with.
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn lock_phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn interrupt_token(&self) -> CancellationToken {
        self.interrupt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        match *self.lock_phase() {
            Phase::Stopped => LifecycleState::Stopped,
            Phase::Starting => LifecycleState::Starting,
            Phase::Running(_) => LifecycleState::Running,
            Phase::Draining(_) => LifecycleState::Draining,
        }
    }

    /// The bound address while running or draining.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.lock_phase() {
            Phase::Running(run) => Some(run.addr),
            Phase::Draining(addr) => Some(*addr),
            Phase::Stopped | Phase::Starting => None,
        }
    }

    /// Start serving and wait until the listener is bound.
    ///
    /// Fails with [`LifecycleError::AlreadyRunning`] unless stopped.
    pub async fn start(&self) -> Result<SocketAddr, LifecycleError> {
        {
            let mut phase = self.lock_phase();
            if !matches!(*phase, Phase::Stopped) {
                return Err(LifecycleError::AlreadyRunning);
            }
            *phase = Phase::Starting;
        }
        *self.interrupt.lock().unwrap_or_else(PoisonError::into_inner) = CancellationToken::new();

        let state = Arc::new(AppState::new(Arc::clone(&self.scene)));
        let (ready_tx, ready_rx) = oneshot::channel();
        let config = self.config.clone();
        let task_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            let (listener, addr) = match server::bind(&config).await {
                Ok(bound) => bound,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return Ok(());
                }
            };
            let _ = ready_tx.send(Ok(addr));
            server::serve(listener, task_state).await
        });
        let teardown = Teardown::new(&self.phase, &state, task.abort_handle());

        let ready = ready_rx.await;
        teardown.disarm();
        let addr = match ready {
            Ok(Ok(addr)) => addr,
            Ok(Err(e)) => {
                *self.lock_phase() = Phase::Stopped;
                return Err(LifecycleError::Startup(e));
            }
            Err(_) => {
                *self.lock_phase() = Phase::Stopped;
                return Err(LifecycleError::Startup(ServerError::StartupAborted));
            }
        };

        *self.lock_phase() = Phase::Running(Run { addr, state, task });
        info!(%addr, "server started");
        Ok(addr)
    }

    /// Drain and stop the serve loop.
    ///
    /// Fails with [`LifecycleError::NotRunning`] when there is nothing to
    /// stop and [`LifecycleError::StopInProgress`] when another stop is
    /// already draining. Returns [`LifecycleError::ShutdownTimeout`] if the
    /// serve loop had to be aborted; the server is stopped either way,
    /// including when this future is dropped before it completes.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        let mut run = {
            let mut phase = self.lock_phase();
            match std::mem::replace(&mut *phase, Phase::Stopped) {
                Phase::Running(run) => {
                    *phase = Phase::Draining(run.addr);
                    run
                }
                Phase::Draining(addr) => {
                    *phase = Phase::Draining(addr);
                    return Err(LifecycleError::StopInProgress);
                }
                other => {
                    *phase = other;
                    return Err(LifecycleError::NotRunning);
                }
            }
        };
        let teardown = Teardown::new(&self.phase, &run.state, run.task.abort_handle());
        let interrupt = self.interrupt_token();
        let activity = &run.state.activity;

        if !activity.client_seen() && !interrupt.is_cancelled() {
            info!(
                grace_secs = self.config.grace_connect.as_secs_f64(),
                "waiting for first client"
            );
            tokio::select! {
                () = activity.wait_for_client() => debug!("client observed"),
                () = tokio::time::sleep(self.config.grace_connect) => {
                    warn!("no client connected within the grace window");
                }
                () = interrupt.cancelled() => debug!("wait for first client interrupted"),
            }
        }

        self.drain(activity, &interrupt).await;

        run.state.shutdown.cancel();
        info!("shutdown sent");

        let ceiling = self.config.shutdown_timeout;
        let result = match tokio::time::timeout(ceiling, &mut run.task).await {
            Ok(Ok(Ok(()))) => {
                info!("shutdown confirmed");
                Ok(())
            }
            Ok(Ok(Err(e))) => {
                warn!("serve loop ended with an error: {e}");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!("serve loop task failed: {e}");
                Ok(())
            }
            Err(_) => {
                run.task.abort();
                error!(
                    timeout_secs = ceiling.as_secs_f64(),
                    "serve loop did not exit in time, aborted"
                );
                Err(LifecycleError::ShutdownTimeout { after: ceiling })
            }
        };

        teardown.disarm();
        *self.lock_phase() = Phase::Stopped;
        result
    }

    /// Wait for in-flight requests to finish. Every new request restarts
    /// the grace window.
    async fn drain(&self, activity: &Activity, interrupt: &CancellationToken) {
        if activity.in_flight() == 0 || interrupt.is_cancelled() {
            return;
        }
        info!(
            in_flight = activity.in_flight(),
            grace_secs = self.config.grace_request.as_secs_f64(),
            "waiting for in-flight requests"
        );

        let mut window_start = Instant::now();
        let mut seen = activity.requests_started();
        loop {
            if activity.in_flight() == 0 {
                debug!("requests drained");
                return;
            }
            let started = activity.requests_started();
            if started != seen {
                seen = started;
                window_start = Instant::now();
            }
            if window_start.elapsed() >= self.config.grace_request {
                warn!(
                    in_flight = activity.in_flight(),
                    "requests still in flight after the grace window"
                );
                return;
            }
            tokio::select! {
                () = tokio::time::sleep(DRAIN_POLL) => {}
                () = interrupt.cancelled() => {
                    debug!("request drain interrupted");
                    return;
                }
            }
        }
    }

    /// Cut the grace windows of the current or next stop sequence short.
    ///
    /// Has no effect on the final join. Reset by every `start`.
    pub fn interrupt(&self) {
        self.interrupt_token().cancel();
        debug!("stop sequence interrupted");
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_owned(),
            port: 0,
            ..ServerConfig::default()
        }
    }

    #[tokio::test]
    async fn start_reports_bind_failures_and_stays_stopped() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let server = Server::new(local_config().with_port(port), Arc::new(Scene::new()));
        let err = server.start().await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Startup(ServerError::Bind(_))
        ));
        assert_eq!(server.state(), LifecycleState::Stopped);
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn interrupt_before_stop_skips_the_grace_windows() {
        let server = Server::new(local_config(), Arc::new(Scene::new()));
        server.start().await.unwrap();
        server.interrupt();

        tokio::time::timeout(Duration::from_secs(5), server.stop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(server.state(), LifecycleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_in_flight_requests() {
        let server = Server::new(
            local_config().with_grace(Duration::ZERO, Duration::from_secs(5)),
            Arc::new(Scene::new()),
        );
        let activity = Arc::new(Activity::new());
        let guard = activity.begin();

        let started = Instant::now();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            drop(guard);
        });
        server.drain(&activity, &CancellationToken::new()).await;
        release.await.unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn drain_gives_up_after_the_grace_window() {
        let server = Server::new(
            local_config().with_grace(Duration::ZERO, Duration::from_secs(5)),
            Arc::new(Scene::new()),
        );
        let activity = Arc::new(Activity::new());
        let _stuck = activity.begin();

        let started = Instant::now();
        server.drain(&activity, &CancellationToken::new()).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn new_requests_restart_the_drain_window() {
        let server = Server::new(
            local_config().with_grace(Duration::ZERO, Duration::from_secs(5)),
            Arc::new(Scene::new()),
        );
        let activity = Arc::new(Activity::new());
        let _stuck = activity.begin();

        let late = {
            let activity = Arc::clone(&activity);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(3)).await;
                drop(activity.begin());
            })
        };

        let started = Instant::now();
        server.drain(&activity, &CancellationToken::new()).await;
        late.await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(8));
        assert!(elapsed < Duration::from_secs(9));
    }
}
