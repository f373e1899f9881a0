use thiserror::Error;

use crate::types::DialogId;

/// Errors surfaced to callers of the public query surface.
///
/// Reconciliation problems (version gaps, corrupted records, rejected
/// speculative changes) are repaired inside the engine and never show up
/// here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("{0} not found")]
    NotFound(DialogId),

    #[error("No access to {0}")]
    NoAccess(DialogId),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CacheError {
    /// Whether retrying the same request later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::Transient(_))
    }
}
