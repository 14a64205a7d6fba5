use thiserror::Error;

use super::WorkerState;
use crate::cache::CacheError;
use crate::models::CacheVersion;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Invalid scope {0}: must be an absolute http(s) URL")]
    InvalidScope(String),

    #[error("Invalid asset path {path}: {source}")]
    InvalidAsset {
        path: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Worker {version} cannot move from {from} to {to}")]
    InvalidTransition {
        version: CacheVersion,
        from: WorkerState,
        to: WorkerState,
    },

    #[error("Worker scope {worker} does not match registration scope {registration}")]
    ScopeMismatch { worker: String, registration: String },

    #[error(transparent)]
    Cache(#[from] CacheError),
}
