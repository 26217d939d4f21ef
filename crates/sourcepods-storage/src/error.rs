//! HTTP-facing error type.
//!
//! Internal failures are answered with a fixed body; paths and subprocess
//! diagnostics only ever reach the log, which handlers write before
//! returning the error.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use thiserror::Error;

use crate::process::ProcessError;
use crate::repo::PathError;
use crate::rpc::RelayStage;

/// Body of every 500 response.
pub const INTERNAL_ERROR_BODY: &str = "internal server error";

/// Errors returned by gateway handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Service outside the whitelist.
    #[error("invalid service {0:?}")]
    InvalidService(String),

    /// Request that does not name a servable artifact.
    #[error("not found")]
    NotFound,

    /// Repository path could not be resolved.
    #[error(transparent)]
    Path(#[from] PathError),

    /// Artifact could not be stat'ed or opened.
    #[error("cannot read {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Refs advertisement failed.
    #[error("failed to get refs: {0}")]
    Advertise(#[source] ProcessError),

    /// Stateless-RPC exchange failed.
    #[error("{stage}: {source}")]
    Relay {
        stage: RelayStage,
        #[source]
        source: ProcessError,
    },

    /// Announcement could not be framed.
    #[error("framing error: {0}")]
    Framing(#[from] sourcepods_git::GitError),

    /// Response could not be assembled.
    #[error("response error: {0}")]
    Response(#[from] axum::http::Error),
}

impl ApiError {
    /// Status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidService(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound
            | ApiError::Path(PathError::InvalidSegment(_))
            | ApiError::Path(PathError::OutsideRoot(_)) => StatusCode::NOT_FOUND,
            ApiError::Path(PathError::Resolve { .. })
            | ApiError::Stat { .. }
            | ApiError::Advertise(_)
            | ApiError::Relay { .. }
            | ApiError::Framing(_)
            | ApiError::Response(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Logs the error against `context`, at warn level for internal errors.
    pub fn log(&self, context: &str) {
        if self.status().is_server_error() {
            tracing::warn!(context = %context, error = %self, "Request failed");
        } else {
            tracing::debug!(context = %context, error = %self, "Request rejected");
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match status {
            StatusCode::BAD_REQUEST => (status, self.to_string()).into_response(),
            StatusCode::NOT_FOUND => status.into_response(),
            _ => (status, INTERNAL_ERROR_BODY).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    async fn body_of(error: ApiError) -> (StatusCode, String) {
        let response = error.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_invalid_service_names_value() {
        let (status, body) = body_of(ApiError::InvalidService("upload-archive".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "invalid service \"upload-archive\"");
    }

    #[tokio::test]
    async fn test_not_found_has_empty_body() {
        let (status, body) =
            body_of(ApiError::Path(PathError::InvalidSegment("..".into()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_internal_errors_hide_detail() {
        let err = ApiError::Stat {
            path: PathBuf::from("/srv/repos/alice/secret/HEAD"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.to_string().contains("/srv/repos/alice/secret/HEAD"));

        let (status, body) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, INTERNAL_ERROR_BODY);
    }

    #[tokio::test]
    async fn test_relay_error_names_stage() {
        let err = ApiError::Relay {
            stage: RelayStage::Wait,
            source: ProcessError::Exit { code: Some(128) },
        };
        assert_eq!(
            err.to_string(),
            "failed to wait for git: process exited with code 128"
        );
        let (status, _) = body_of(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
