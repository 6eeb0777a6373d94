//! OS termination signal handling.
//!
//! [`wait_for_shutdown_signal`] completes on the first termination signal.
//! [`stop_on_signal`] runs the server's stop sequence after it and turns a
//! second signal, received while still draining, into
//! [`Server::interrupt`].
//!
//! ## Unix
//! SIGINT, SIGTERM and SIGQUIT are handled, with
//! [`tokio::signal::ctrl_c`] awaited as a fallback.
//!
//! ## Windows
//! Only [`tokio::signal::ctrl_c`] is awaited.

use tracing::{info, warn};

use crate::error::LifecycleError;
use crate::lifecycle::Server;

/// Complete when the process receives a termination signal.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Complete when the process receives a termination signal.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Wait for a termination signal, then stop `server`.
///
/// A further signal during the stop sequence interrupts its grace windows.
pub async fn stop_on_signal(server: &Server) -> Result<(), LifecycleError> {
    wait_for_shutdown_signal()
        .await
        .map_err(LifecycleError::Signal)?;
    info!("termination signal received, stopping");

    let stop = server.stop();
    tokio::pin!(stop);
    loop {
        tokio::select! {
            result = &mut stop => return result,
            signal = wait_for_shutdown_signal() => {
                if let Err(e) = signal {
                    warn!("cannot listen for further signals: {e}");
                    return stop.await;
                }
                info!("second termination signal, skipping grace windows");
                server.interrupt();
            }
        }
    }
}
