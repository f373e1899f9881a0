use thiserror::Error;

use parlor_shared::{CacheError, DialogId};

/// Failure of a single backend call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Not found")]
    NotFound,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Transient network failure: {0}")]
    Transient(String),
}

impl NetworkError {
    /// Translate into the public taxonomy for a request about `dialog_id`.
    pub fn into_cache_error(self, dialog_id: DialogId) -> CacheError {
        match self {
            NetworkError::NotFound => CacheError::NotFound(dialog_id),
            NetworkError::Forbidden(_) => CacheError::NoAccess(dialog_id),
            NetworkError::Transient(reason) => CacheError::Transient(reason),
        }
    }
}
