//! `yacv-server` binary.
//!
//! Serves a scene to viewers until a termination signal arrives, then runs
//! the draining stop sequence and exits successfully.
//!
//! ```text
//! yacv-server [FILE]...
//! ```
//!
//! Each `FILE` is shown before serving starts, named after its file stem:
//! `.glb` files as-is, `.json` files as serialized canonical geometry.
//! Configuration comes from the environment (see [`yacv_server::config`]).

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use yacv_core::Scene;
use yacv_server::{LifecycleError, Server, ServerConfig, signals};
use yacv_types::{BuildOptions, Geometry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = ServerConfig::from_env().context("loading configuration")?;
    info!(
        host = %config.host,
        port = config.port,
        grace_connect_secs = config.grace_connect.as_secs_f64(),
        grace_request_secs = config.grace_request.as_secs_f64(),
        "configuration loaded"
    );

    let scene = Arc::new(Scene::new());
    let options = BuildOptions::default().with_auto_clear(false);
    for path in std::env::args_os().skip(1) {
        show_file(&scene, Path::new(&path), &options).await?;
    }

    let server = Server::new(config, scene);
    server.start().await.context("starting server")?;

    match signals::stop_on_signal(&server).await {
        Ok(()) => {}
        // The serve loop was aborted; the process still exits cleanly.
        Err(e @ LifecycleError::ShutdownTimeout { .. }) => error!("{e}"),
        Err(e) => return Err(e).context("stopping server"),
    }

    info!("yacv-server exited");
    Ok(())
}

async fn show_file(scene: &Scene, path: &Path, options: &BuildOptions) -> anyhow::Result<()> {
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .with_context(|| format!("no file name in {}", path.display()))?;
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("glb") => {
            scene.show_glb(bytes, &name, options)?;
        }
        Some("json") => {
            let geometry: Geometry = serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing geometry from {}", path.display()))?;
            scene.show(&geometry, Some(&name), options)?;
        }
        _ => bail!("unsupported file type: {}", path.display()),
    }
    Ok(())
}
