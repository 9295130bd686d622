//! In-memory store backend.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use firth_event::{EventId, RawItem, Timestamp};
use tracing::trace;

use crate::query::{AuthorQuery, RelayQuery};
use crate::store::EventStore;
use crate::Result;

#[derive(Default)]
struct Inner {
    by_id: HashMap<EventId, RawItem>,
    /// Time-ordered index; the id in the key keeps entries with equal
    /// timestamps distinct.
    by_time: BTreeMap<(Timestamp, EventId), EventId>,
}

/// HashMap-backed [`EventStore`].
///
/// Single writer, many readers; all mutation goes through [`insert`], which
/// is idempotent so the same event arriving from several relays collapses
/// to one row.
///
/// [`insert`]: EventStore::insert
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn scan<F>(&self, query_window: (Option<Timestamp>, Option<Timestamp>), limit: usize, keep: F) -> Vec<RawItem>
    where
        F: Fn(&RawItem) -> bool,
    {
        let inner = self.read();
        let lo = (query_window.0.unwrap_or(0), EventId([0u8; 32]));
        let hi = (
            query_window.1.unwrap_or(Timestamp::MAX),
            EventId([0xff; 32]),
        );
        let mut out = Vec::new();
        for (_, id) in inner.by_time.range(lo..=hi).rev() {
            if let Some(item) = inner.by_id.get(id) {
                if keep(item) {
                    out.push(item.clone());
                    if out.len() >= limit {
                        break;
                    }
                }
            }
        }
        out
    }
}

impl EventStore for MemoryStore {
    fn query_authors(&self, query: &AuthorQuery) -> Result<Vec<RawItem>> {
        let rows = self.scan(
            (query.window.since, query.window.until),
            query.limit,
            |item| {
                query.kinds.contains(&item.kind)
                    && (query.include_replies || !item.is_reply())
                    && (query.authors.contains(&item.author)
                        || item.hashtags.iter().any(|t| query.hashtags.contains(t)))
            },
        );
        trace!(rows = rows.len(), authors = query.authors.len(), "author query");
        Ok(rows)
    }

    fn query_relays(&self, query: &RelayQuery) -> Result<Vec<RawItem>> {
        let rows = self.scan(
            (query.window.since, query.window.until),
            query.limit,
            |item| {
                query.kinds.contains(&item.kind)
                    && (query.include_replies || !item.is_reply())
                    && item.relays.iter().any(|r| query.relays.contains(r))
            },
        );
        trace!(rows = rows.len(), relays = query.relays.len(), "relay query");
        Ok(rows)
    }

    fn by_id(&self, id: &EventId) -> Result<Option<RawItem>> {
        Ok(self.read().by_id.get(id).cloned())
    }

    fn by_ids(&self, ids: &[EventId]) -> Result<Vec<RawItem>> {
        let inner = self.read();
        Ok(ids.iter().filter_map(|id| inner.by_id.get(id).cloned()).collect())
    }

    fn ancestors(&self, id: &EventId, max_depth: usize) -> Result<Vec<RawItem>> {
        let inner = self.read();
        let mut chain = Vec::new();
        let mut visited: HashSet<EventId> = HashSet::new();
        visited.insert(*id);

        let mut cursor = inner.by_id.get(id).and_then(|item| item.reply_to());
        while let Some(parent_id) = cursor {
            if chain.len() >= max_depth || !visited.insert(parent_id) {
                break;
            }
            match inner.by_id.get(&parent_id) {
                Some(parent) => {
                    cursor = parent.reply_to();
                    chain.push(parent.clone());
                }
                None => break,
            }
        }
        chain.reverse();
        Ok(chain)
    }

    fn insert(&self, item: RawItem) -> Result<bool> {
        let mut inner = self.write();
        if let Some(existing) = inner.by_id.get_mut(&item.id) {
            // Same event from another relay: remember the extra delivery
            // path, everything else is identical by construction.
            for relay in item.relays {
                if !existing.relays.contains(&relay) {
                    existing.relays.push(relay);
                }
            }
            return Ok(false);
        }
        inner.by_time.insert((item.created_at, item.id), item.id);
        inner.by_id.insert(item.id, item);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::TimeWindow;
    use firth_event::{kind, AuthorId, RefKind};

    fn author(seed: u8) -> AuthorId {
        let mut id = [0u8; 32];
        id[0] = seed;
        AuthorId(id)
    }

    fn note(seed: u8, ts: Timestamp, text: &str) -> RawItem {
        RawItem::new(author(seed), ts, kind::NOTE, text)
    }

    fn feed_kinds() -> HashSet<u16> {
        kind::FEED_KINDS.iter().copied().collect()
    }

    #[test]
    fn insert_is_idempotent() {
        let store = MemoryStore::new();
        let item = note(1, 100, "a");
        assert!(store.insert(item.clone()).unwrap());
        assert!(!store.insert(item).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn duplicate_insert_merges_relays() {
        let store = MemoryStore::new();
        let mut item = note(1, 100, "a");
        item.relays = vec!["wss://one".into()];
        store.insert(item.clone()).unwrap();
        item.relays = vec!["wss://two".into()];
        store.insert(item.clone()).unwrap();
        let stored = store.by_id(&item.id).unwrap().unwrap();
        assert_eq!(stored.relays.len(), 2);
    }

    #[test]
    fn author_query_is_newest_first_and_windowed() {
        let store = MemoryStore::new();
        for ts in [100u64, 300, 200] {
            store.insert(note(1, ts, &ts.to_string())).unwrap();
        }
        store.insert(note(2, 250, "other author")).unwrap();

        let query = AuthorQuery::new([author(1)].into(), feed_kinds(), 50)
            .with_window(TimeWindow::between(150, 400));
        let rows = store.query_authors(&query).unwrap();
        let stamps: Vec<_> = rows.iter().map(|r| r.created_at).collect();
        assert_eq!(stamps, vec![300, 200]);
    }

    #[test]
    fn hashtag_widens_author_query() {
        let store = MemoryStore::new();
        let mut tagged = note(9, 100, "tagged");
        tagged.hashtags = vec!["rust".into()];
        store.insert(tagged).unwrap();

        let query = AuthorQuery::new([author(1)].into(), feed_kinds(), 50)
            .with_hashtags(["rust".to_string()].into());
        assert_eq!(store.query_authors(&query).unwrap().len(), 1);
    }

    #[test]
    fn replies_can_be_hidden() {
        let store = MemoryStore::new();
        let root = note(1, 100, "root");
        let reply = note(1, 200, "reply").with_ref(RefKind::ReplyTo, root.id);
        store.insert(root).unwrap();
        store.insert(reply).unwrap();

        let query = AuthorQuery::new([author(1)].into(), feed_kinds(), 50).replies(false);
        assert_eq!(store.query_authors(&query).unwrap().len(), 1);
    }

    #[test]
    fn ancestor_walk_is_root_first_and_bounded() {
        let store = MemoryStore::new();
        let a = note(1, 100, "a");
        let b = note(2, 200, "b").with_ref(RefKind::ReplyTo, a.id);
        let c = note(3, 300, "c").with_ref(RefKind::ReplyTo, b.id);
        for item in [&a, &b, &c] {
            store.insert(item.clone()).unwrap();
        }

        let chain = store.ancestors(&c.id, 10).unwrap();
        assert_eq!(chain.iter().map(|i| i.id).collect::<Vec<_>>(), vec![a.id, b.id]);

        let bounded = store.ancestors(&c.id, 1).unwrap();
        assert_eq!(bounded.iter().map(|i| i.id).collect::<Vec<_>>(), vec![b.id]);
    }

    #[test]
    fn ancestor_walk_stops_at_missing_parent() {
        let store = MemoryStore::new();
        let ghost = note(1, 50, "never stored");
        let b = note(2, 200, "b").with_ref(RefKind::ReplyTo, ghost.id);
        let c = note(3, 300, "c").with_ref(RefKind::ReplyTo, b.id);
        store.insert(b.clone()).unwrap();
        store.insert(c.clone()).unwrap();

        let chain = store.ancestors(&c.id, 10).unwrap();
        assert_eq!(chain.iter().map(|i| i.id).collect::<Vec<_>>(), vec![b.id]);
    }
}
