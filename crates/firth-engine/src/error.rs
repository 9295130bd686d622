//! Error types for the engine.

use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur driving a feed column.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Selection criteria cannot produce a feed (caller bug, not transient)
    #[error("invalid feed config: {0}")]
    InvalidConfig(String),

    /// Local store failure
    #[error(transparent)]
    Store(#[from] firth_store::StoreError),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] firth_transport::TransportError),

    /// The column's worker task has stopped
    #[error("column worker is gone")]
    WorkerGone,
}
