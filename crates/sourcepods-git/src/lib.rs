//! Git smart HTTP framing for SourcePods.
//!
//! The storage gateway does not speak the git wire protocol itself; the
//! `git` executable does. This crate holds the small pieces the gateway
//! still has to produce on its own: pkt-line frames for the service
//! announcement and the closed set of services it is willing to run.

mod error;
mod pktline;
mod service;

pub use error::GitError;
pub use pktline::{flush, frame, PktLine, PktLineWriter, FLUSH, MAX_PKT_LEN};
pub use service::Service;

/// Result type for git framing operations.
pub type Result<T> = std::result::Result<T, GitError>;
