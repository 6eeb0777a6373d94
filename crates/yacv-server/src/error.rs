//! Error types for the server.
//!
//! [`ApiError`] is what HTTP handlers return; it converts into an Axum
//! response via its [`IntoResponse`] implementation. [`ServerError`] covers
//! binding and serving, [`LifecycleError`] misuse of the start/stop state
//! machine.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use yacv_core::SceneError;

/// Errors returned by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A scene operation failed.
    #[error(transparent)]
    Scene(#[from] SceneError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Scene(SceneError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Scene(SceneError::UnsupportedObject { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Scene(
                SceneError::Build { .. } | SceneError::Glbs(_) | SceneError::Io(_),
            ) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Errors that can occur when binding or running the serve loop.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),

    /// The serve loop ended before it reported being ready.
    #[error("serve loop exited during startup")]
    StartupAborted,
}

/// Misuse of the server lifecycle, or a forced shutdown.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// `start` was called while the server was not stopped.
    #[error("server is already running")]
    AlreadyRunning,

    /// `stop` was called while the server was not running.
    #[error("server is not running")]
    NotRunning,

    /// `stop` was called while another stop sequence was in progress.
    #[error("a stop sequence is already in progress")]
    StopInProgress,

    /// The serve loop could not be started.
    #[error("startup failed: {0}")]
    Startup(#[from] ServerError),

    /// Termination signals could not be registered.
    #[error("cannot listen for termination signals: {0}")]
    Signal(std::io::Error),

    /// The serve loop did not exit within the hard ceiling and was aborted.
    #[error("serve loop did not exit within {after:?}; aborted")]
    ShutdownTimeout {
        /// The ceiling that was exceeded.
        after: Duration,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_errors_map_to_status_codes() {
        let cases = [
            (
                SceneError::NotFound {
                    name: "box".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                SceneError::UnsupportedObject { type_name: "u8" },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                SceneError::Build {
                    name: "box".into(),
                    source: yacv_core::BuildFailure::Abandoned,
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
