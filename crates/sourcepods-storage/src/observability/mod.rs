//! # Observability
//!
//! Structured logging and per-request tracing for the gateway:
//!
//! - **Logging**: pretty or JSON output, filtered by `RUST_LOG` or the
//!   configured level
//! - **Request context**: every request runs in a span carrying its request
//!   id, which is echoed back in `x-request-id`
//!
//! ```rust,ignore
//! use axum::middleware::from_fn;
//! use sourcepods_storage::observability::{init_logging, request_context, LogFormat};
//!
//! init_logging("info", LogFormat::Json);
//! let app = axum::Router::new().layer(from_fn(request_context));
//! ```

mod logging;
pub mod middleware;

pub use logging::{init_logging, LogFormat};
pub use middleware::{request_context, RequestId, REQUEST_ID_HEADER};
