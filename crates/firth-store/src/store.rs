//! The store collaborator interface.

use firth_event::{EventId, RawItem};

use crate::query::{AuthorQuery, RelayQuery};
use crate::Result;

/// Point and range access to locally persisted events.
///
/// Calls are synchronous from the processing context's point of view; a
/// backend that is internally async must block with its own deadline and
/// surface overruns as [`crate::StoreError::Timeout`].
pub trait EventStore: Send + Sync {
    /// Events from an author set (or matching its hashtags), newest first.
    fn query_authors(&self, query: &AuthorQuery) -> Result<Vec<RawItem>>;

    /// Events delivered by a relay set, newest first.
    fn query_relays(&self, query: &RelayQuery) -> Result<Vec<RawItem>>;

    /// Single event by id.
    fn by_id(&self, id: &EventId) -> Result<Option<RawItem>>;

    /// Batch lookup; missing ids are simply absent from the result.
    fn by_ids(&self, ids: &[EventId]) -> Result<Vec<RawItem>>;

    /// Reply ancestors of the given event, ordered root first, immediate
    /// parent last. Stops at `max_depth` or at the first reference that is
    /// not locally resolvable.
    fn ancestors(&self, id: &EventId, max_depth: usize) -> Result<Vec<RawItem>>;

    /// Idempotent insert. Returns `true` when the item was not yet present.
    fn insert(&self, item: RawItem) -> Result<bool>;
}
