//! HTTP routing for the git gateway.
//!
//! Routes are grouped by cache policy; each group gets its policy as a route
//! layer so that only matched requests carry cache headers.

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::cache::{cache_policy, CachePolicy};
use crate::config::Config;
use crate::observability::request_context;
use crate::process::{GitInvoker, ProcessInvoker};
use crate::repo::RepoRoot;
use crate::validation::{not_found, service_allowed};
use crate::{files, refs, rpc};

/// Subprocess deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Refs advertisement.
    pub advertise: Duration,
    /// One RPC exchange; unbounded when `None`.
    pub rpc: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            advertise: Duration::from_secs(1),
            rpc: None,
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Repository root.
    pub repos: Arc<RepoRoot>,
    /// Starts git.
    pub invoker: Arc<dyn ProcessInvoker>,
    /// Subprocess deadlines.
    pub timeouts: Timeouts,
}

impl AppState {
    /// Creates state with default deadlines.
    pub fn new(repos: RepoRoot, invoker: Arc<dyn ProcessInvoker>) -> Self {
        Self {
            repos: Arc::new(repos),
            invoker,
            timeouts: Timeouts::default(),
        }
    }

    /// Replaces the deadlines.
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Builds state from a validated configuration.
    ///
    /// The repository root must already exist.
    pub fn from_config(config: &Config) -> std::io::Result<Self> {
        let repos = RepoRoot::open(&config.root)?;
        let invoker = Arc::new(GitInvoker::new(&config.git_bin));

        Ok(Self::new(repos, invoker).with_timeouts(Timeouts {
            advertise: config.advertise_timeout(),
            rpc: config.rpc_timeout(),
        }))
    }
}

/// Creates the gateway router.
pub fn create_router(state: AppState) -> Router {
    let volatile = Router::new()
        .route("/{owner}/{name}/HEAD", get(files::head))
        .route("/{owner}/{name}/objects/info/{file}", get(files::info_file))
        .route(
            "/{owner}/{name}/objects/info/alternates",
            get(files::alternates),
        )
        .route(
            "/{owner}/{name}/objects/info/http-alternates",
            get(files::http_alternates),
        )
        .route_layer(from_fn_with_state(CachePolicy::Volatile, cache_policy));

    let advertisement = Router::new()
        .route("/{owner}/{name}/info/refs", get(refs::info_refs))
        .route_layer(from_fn(service_allowed))
        .route_layer(from_fn_with_state(CachePolicy::Volatile, cache_policy));

    let immutable = Router::new()
        .route(
            "/{owner}/{name}/objects/{folder}/{file}",
            get(files::loose_object),
        )
        .route("/{owner}/{name}/objects/info/packs", get(files::info_packs))
        .route("/{owner}/{name}/objects/pack/{pack}", get(files::pack_file))
        .route_layer(from_fn_with_state(CachePolicy::Immutable, cache_policy));

    let exchange = Router::new()
        .route("/{owner}/{name}/{rpc}", post(rpc::service_rpc))
        .route_layer(from_fn(service_allowed));

    Router::new()
        .merge(volatile)
        .merge(advertisement)
        .merge(immutable)
        .merge(exchange)
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(request_context))
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn state(dir: &TempDir) -> AppState {
        let repos = RepoRoot::open(dir.path()).unwrap();
        AppState::new(repos, Arc::new(GitInvoker::new("/nonexistent/git")))
    }

    async fn status_of(app: Router, method: &str, uri: &str) -> StatusCode {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_unknown_routes_are_not_found() {
        let dir = TempDir::new().unwrap();
        let app = create_router(state(&dir));

        assert_eq!(status_of(app.clone(), "GET", "/").await, StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(app.clone(), "GET", "/alice/project/objects/zz/nothex").await,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(app, "POST", "/alice/project/upload-pack").await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_wrong_method_is_not_found() {
        let dir = TempDir::new().unwrap();
        let app = create_router(state(&dir));

        assert_eq!(
            status_of(app, "POST", "/alice/project/HEAD").await,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_missing_repository_is_internal_error() {
        let dir = TempDir::new().unwrap();
        let app = create_router(state(&dir));

        assert_eq!(
            status_of(app, "GET", "/alice/missing/HEAD").await,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_from_config() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            root: dir.path().to_path_buf(),
            rpc_timeout_secs: Some(30),
            ..Config::default()
        };

        let state = AppState::from_config(&config).unwrap();
        assert_eq!(state.timeouts.advertise, Duration::from_secs(1));
        assert_eq!(state.timeouts.rpc, Some(Duration::from_secs(30)));
        assert_eq!(state.repos.path(), dir.path().canonicalize().unwrap());
    }
}
