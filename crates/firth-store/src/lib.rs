//! Firth Local Store
//!
//! The engine's view of the persistent event store: point and range queries,
//! ancestor walks, idempotent inserts, and the per-feed watermark that
//! survives restarts. The store behind [`EventStore`] is a collaborator —
//! the engine treats it as a black box and never assumes anything about its
//! schema or query execution.
//!
//! [`MemoryStore`] is the bundled backend: a HashMap-by-id plus a
//! time-ordered index, good enough for tests and single-process use. A
//! disk-backed store plugs in behind the same trait.

mod memory;
mod query;
mod state;
mod store;

pub use memory::MemoryStore;
pub use query::{AuthorQuery, RelayQuery, TimeWindow};
pub use state::{FeedStateStore, MemoryFeedState};
pub use store::EventStore;

use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by a store backend.
///
/// The engine treats every one of these as "no data this cycle" and retries
/// on the next tick; none of them are fatal to a feed.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend-specific failure
    #[error("store backend: {0}")]
    Backend(String),

    /// Query exceeded the backend's deadline
    #[error("store query timed out")]
    Timeout,
}
