//! # SourcePods Storage
//!
//! Serves git repositories stored on disk over HTTP.
//!
//! Two protocols share one router:
//!
//! - **Dumb HTTP**: `HEAD`, loose objects, packs and the files under
//!   `objects/info` are streamed as static files.
//! - **Smart HTTP (stateless RPC)**: `info/refs` and `git-<service>` are
//!   delegated to the `git` executable, with the request and response bodies
//!   relayed through its stdin and stdout.
//!
//! ## Quick Start
//!
//! ```bash
//! cargo run --bin sourcepods-storage -- --root ./data/repositories
//! git clone http://127.0.0.1:3030/alice/project
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Router and shared state
//! - [`files`] - Static artifact handlers
//! - [`refs`] - Refs advertisement
//! - [`rpc`] - Stateless-RPC relay
//! - [`validation`] - Route extractors and the service whitelist
//! - [`cache`] - Cache-policy middleware
//! - [`repo`] - Repository path resolution
//! - [`process`] - Subprocess abstraction over `git`
//! - [`config`] - Configuration file and defaults
//! - [`observability`] - Logging and request tracing

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod files;
pub mod observability;
pub mod process;
pub mod refs;
pub mod repo;
pub mod rpc;
pub mod validation;

pub use api::{create_router, AppState, Timeouts};
pub use config::{Config, ConfigError};
pub use error::ApiError;
pub use process::{GitInvoker, ProcessError, ProcessInvoker, Subprocess};
pub use repo::{PathError, RepoRoot};
