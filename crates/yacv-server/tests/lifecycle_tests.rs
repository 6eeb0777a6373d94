//! Lifecycle tests against real sockets on ephemeral ports.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use yacv_core::{AdapterRegistry, Scene, TessellateError};
use yacv_server::{LifecycleError, LifecycleState, Server, ServerConfig};
use yacv_types::{BuildOptions, Face, Geometry, Shape};

const GLB: &[u8] = b"glTF\x02\x00\x00\x00\x0c\x00\x00\x00";

fn local_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
        ..ServerConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn stop_without_clients_waits_out_the_connect_window() {
    let server = Server::new(local_config(), Arc::new(Scene::new()));
    server.start().await.unwrap();
    assert_eq!(server.state(), LifecycleState::Running);

    let started = Instant::now();
    server.stop().await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(12), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(13), "{elapsed:?}");
    assert_eq!(server.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn lifecycle_misuse_is_reported() {
    let server = Server::new(local_config(), Arc::new(Scene::new()));
    assert!(matches!(
        server.stop().await,
        Err(LifecycleError::NotRunning)
    ));

    server.start().await.unwrap();
    assert!(matches!(
        server.start().await,
        Err(LifecycleError::AlreadyRunning)
    ));

    server.interrupt();
    server.stop().await.unwrap();
    assert!(matches!(
        server.stop().await,
        Err(LifecycleError::NotRunning)
    ));
}

#[tokio::test]
async fn stop_returns_promptly_once_a_client_was_served() {
    let scene = Arc::new(Scene::new());
    scene
        .show_glb(GLB.to_vec(), "box", &BuildOptions::default())
        .unwrap();
    let server = Server::new(local_config(), scene);
    let addr = server.start().await.unwrap();

    let bytes = reqwest::get(format!("http://{addr}/api/object/box"))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(&bytes[..], GLB);

    tokio::time::timeout(Duration::from_secs(5), server.stop())
        .await
        .unwrap()
        .unwrap();
    assert!(server.local_addr().is_none());
}

#[tokio::test]
async fn concurrent_stop_is_rejected_while_draining() {
    let config = local_config().with_grace(Duration::from_secs(30), Duration::from_secs(5));
    let server = Arc::new(Server::new(config, Arc::new(Scene::new())));
    server.start().await.unwrap();

    let draining = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.stop().await })
    };
    while server.state() != LifecycleState::Draining {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(server.local_addr().is_some());
    assert!(matches!(
        server.stop().await,
        Err(LifecycleError::StopInProgress)
    ));

    server.interrupt();
    tokio::time::timeout(Duration::from_secs(5), draining)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(server.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn restart_serves_objects_shown_while_stopped() {
    let server = Server::new(local_config(), Arc::new(Scene::new()));
    server.start().await.unwrap();
    server.interrupt();
    server.stop().await.unwrap();

    server
        .scene()
        .show_glb(GLB.to_vec(), "later", &BuildOptions::default())
        .unwrap();

    let addr = server.start().await.unwrap();
    let names: Vec<String> = reqwest::get(format!("http://{addr}/api/names"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(names, vec!["later".to_owned()]);

    tokio::time::timeout(Duration::from_secs(5), server.stop())
        .await
        .unwrap()
        .unwrap();
}

async fn assert_restartable(server: &Server) {
    let addr = server.start().await.unwrap();
    let response = reqwest::get(format!("http://{addr}/api/names"))
        .await
        .unwrap();
    assert!(response.status().is_success());
    server.interrupt();
    tokio::time::timeout(Duration::from_secs(5), server.stop())
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn dropped_stop_leaves_the_server_stopped() {
    let server = Server::new(local_config(), Arc::new(Scene::new()));
    let addr = server.start().await.unwrap();

    // Still waiting for a first client when the caller gives up.
    let cancelled = tokio::time::timeout(Duration::from_millis(100), server.stop()).await;
    assert!(cancelled.is_err());

    assert_eq!(server.state(), LifecycleState::Stopped);
    assert!(server.local_addr().is_none());
    assert!(matches!(
        server.stop().await,
        Err(LifecycleError::NotRunning)
    ));
    // The old listener is gone.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(reqwest::get(format!("http://{addr}/api/names")).await.is_err());

    assert_restartable(&server).await;
}

#[tokio::test]
async fn dropped_start_leaves_the_server_stopped() {
    let server = Server::new(local_config(), Arc::new(Scene::new()));

    // On a current-thread runtime the bind task has not run yet.
    let cancelled = tokio::time::timeout(Duration::ZERO, server.start()).await;
    assert!(cancelled.is_err());

    assert_eq!(server.state(), LifecycleState::Stopped);
    assert_restartable(&server).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stuck_request_hits_the_shutdown_ceiling() {
    let slow = |_: &Geometry, _: &BuildOptions| -> Result<Bytes, TessellateError> {
        std::thread::sleep(Duration::from_secs(2));
        Ok(Bytes::from_static(GLB))
    };
    let scene = Arc::new(Scene::with_parts(AdapterRegistry::with_defaults(), slow));
    let shape = Shape {
        faces: vec![Face {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            triangles: vec![[0, 1, 2]],
            uvs: Vec::new(),
        }],
        ..Shape::default()
    };
    scene
        .show(&shape, Some("slow"), &BuildOptions::default())
        .unwrap();

    let config = ServerConfig {
        shutdown_timeout: Duration::from_millis(200),
        ..local_config().with_grace(Duration::ZERO, Duration::ZERO)
    };
    let server = Server::new(config, Arc::clone(&scene));
    let addr = server.start().await.unwrap();

    let request = tokio::spawn(reqwest::get(format!("http://{addr}/api/object/slow")));
    while scene.cache_stats().builds_started == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let result = server.stop().await;
    assert!(
        matches!(
            result,
            Err(LifecycleError::ShutdownTimeout { after }) if after == Duration::from_millis(200)
        ),
        "{result:?}"
    );
    assert_eq!(server.state(), LifecycleState::Stopped);
    assert!(server.local_addr().is_none());

    // The connection was cut when the serve loop was aborted.
    let _ = request.await;
}
