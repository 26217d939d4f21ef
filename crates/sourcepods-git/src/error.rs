//! Git framing error types.

use thiserror::Error;

/// Errors that can occur while framing git protocol data.
#[derive(Debug, Error)]
pub enum GitError {
    /// Service name outside the allowed set.
    #[error("invalid service {0:?}")]
    InvalidService(String),

    /// Payload does not fit in a single pkt-line.
    #[error("pkt-line payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
