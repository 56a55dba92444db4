//! Shared error type used across all contextd crates.

/// Error kinds surfaced by the Store, Watcher, FoldEngine, MemoryIndex and
/// EventBus. Each variant maps to one of the kinds in the error handling
/// design: `NotFound`, `InvalidTransition`, `ValidationError`, `IOError`,
/// `ExternalUnavailable`, `StoreConflict`, `Internal`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("external service unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("store conflict: {0}")]
    StoreConflict(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
