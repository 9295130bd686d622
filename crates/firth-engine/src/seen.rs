//! Already-rendered tracking.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use firth_event::{EventId, RawItem};

/// Ids that must never be rendered again once scrolled past. Append-only
/// for the lifetime of a session; for reposts both the repost id and its
/// target are recorded so neither surfaces twice.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    ids: HashSet<EventId>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, id: EventId) {
        self.ids.insert(id);
    }

    /// Mark an item and, for reposts, its target.
    pub fn mark_item(&mut self, item: &RawItem) {
        self.ids.insert(item.id);
        if let Some(target) = item.repost_target() {
            self.ids.insert(target);
        }
    }

    pub fn contains(&self, id: &EventId) -> bool {
        self.ids.contains(id)
    }

    pub fn snapshot(&self) -> HashSet<EventId> {
        self.ids.clone()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Handle to a seen set shared by every column in the process.
pub type SharedSeen = Arc<RwLock<SeenSet>>;

/// Create a process-wide seen set.
pub fn shared_seen() -> SharedSeen {
    Arc::new(RwLock::new(SeenSet::new()))
}

/// A column's view of its seen set: private to the column, or the
/// process-wide one.
///
/// All writes happen from the column's processing context (single-writer);
/// anything else only ever takes a [`snapshot`]. Clearing on reload affects
/// scoped sets only — a shared set outlives any single column's reload.
///
/// [`snapshot`]: SeenTracker::snapshot
#[derive(Debug, Clone)]
pub enum SeenTracker {
    Scoped(SeenSet),
    Shared(SharedSeen),
}

impl SeenTracker {
    /// A set private to one column.
    pub fn scoped() -> Self {
        Self::Scoped(SeenSet::new())
    }

    /// A column view of the process-wide set.
    pub fn shared(handle: SharedSeen) -> Self {
        Self::Shared(handle)
    }

    pub fn mark(&mut self, id: EventId) {
        match self {
            Self::Scoped(set) => set.mark(id),
            Self::Shared(handle) => write_lock(handle).mark(id),
        }
    }

    pub fn mark_item(&mut self, item: &RawItem) {
        match self {
            Self::Scoped(set) => set.mark_item(item),
            Self::Shared(handle) => write_lock(handle).mark_item(item),
        }
    }

    pub fn snapshot(&self) -> HashSet<EventId> {
        match self {
            Self::Scoped(set) => set.snapshot(),
            Self::Shared(handle) => match handle.read() {
                Ok(guard) => guard.snapshot(),
                Err(poisoned) => poisoned.into_inner().snapshot(),
            },
        }
    }

    /// Reset a scoped set; a shared set is left alone.
    pub fn clear_scoped(&mut self) {
        if let Self::Scoped(set) = self {
            *set = SeenSet::new();
        }
    }
}

fn write_lock(handle: &SharedSeen) -> std::sync::RwLockWriteGuard<'_, SeenSet> {
    match handle.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firth_event::{kind, AuthorId, RefKind};

    fn author(seed: u8) -> AuthorId {
        let mut id = [0u8; 32];
        id[0] = seed;
        AuthorId(id)
    }

    #[test]
    fn repost_marks_both_ids() {
        let target = RawItem::new(author(1), 100, kind::NOTE, "original");
        let repost =
            RawItem::new(author(2), 200, kind::REPOST, "").with_ref(RefKind::Quote, target.id);

        let mut seen = SeenSet::new();
        seen.mark_item(&repost);
        assert!(seen.contains(&repost.id));
        assert!(seen.contains(&target.id));
    }

    #[test]
    fn shared_tracker_is_visible_across_columns() {
        let handle = shared_seen();
        let mut a = SeenTracker::shared(handle.clone());
        let b = SeenTracker::shared(handle);

        let id = RawItem::new(author(1), 100, kind::NOTE, "x").id;
        a.mark(id);
        assert!(b.snapshot().contains(&id));
    }

    #[test]
    fn clear_only_resets_scoped() {
        let handle = shared_seen();
        let id = RawItem::new(author(1), 100, kind::NOTE, "x").id;

        let mut shared = SeenTracker::shared(handle);
        shared.mark(id);
        shared.clear_scoped();
        assert!(shared.snapshot().contains(&id));

        let mut scoped = SeenTracker::scoped();
        scoped.mark(id);
        scoped.clear_scoped();
        assert!(scoped.snapshot().is_empty());
    }
}
