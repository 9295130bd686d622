//! Firth Feed Reconciliation Engine
//!
//! Turns a continuous, unordered, duplicated stream of signed events —
//! arriving from any number of relays plus the local store — into a stable,
//! deduplicated, thread-reconstructed list suitable for display, while
//! preserving the consumer's viewport and bounding memory.
//!
//! # Architecture
//!
//! ```text
//!  relays ──► transport stream ─┐
//!                               ▼            ┌─► RefResolver ──► (refetch)
//!  local store ──► transform ──► reconstruct ┤
//!                               ▲            └─► ScreenState ──► ViewState
//!  GapFiller ◄── watermark ─────┘                 (watch channel)
//! ```
//!
//! One [`ColumnController`] per visible feed. The worker task is the single
//! processing context: store queries, transformation and reconciliation all
//! run there, serialized, and hand fully formed [`ViewState`] snapshots to
//! the rendering side over a watch channel. Alongside the pipeline run the
//! [`GapFiller`] (time-windowed catch-up after a pause) and the
//! [`RefResolver`] (bounded fetch of missing thread parents).
//!
//! Nothing in this crate verifies signatures, frames wire messages or lays
//! out UI; those live behind the store/transport collaborator traits and
//! the rendering layer respectively.

mod column;
mod config;
mod error;
mod gapfill;
mod reconcile;
mod resolver;
mod seen;
mod thread;
mod transform;

pub use column::{ColumnController, ColumnDeps};
pub use config::{FeedConfig, FeedSource, Tuning};
pub use error::{EngineError, Result};
pub use gapfill::{GapFiller, GapState, GapStep, GapWindow};
pub use reconcile::{InsertEdge, ScreenState, SpliceOutcome, UnreadMap, ViewState};
pub use resolver::RefResolver;
pub use seen::{shared_seen, SeenSet, SeenTracker, SharedSeen};
pub use thread::{reconstruct, split_danglers};
pub use transform::{prepare_batch, transform_batch, BatchContext, BatchWindow, RenderItem};
