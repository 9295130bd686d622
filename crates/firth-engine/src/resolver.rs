//! Dangling-reference resolution.
//!
//! Replies whose parent is not locally available cannot be threaded yet.
//! The resolver batches their missing parent ids, fetches them in one
//! deduplicated request after a short debounce, and hands the original
//! batch back for a second transform pass when the response (or its
//! timeout) arrives. A dangler gets exactly one fetch cycle; after that it
//! renders as a best-effort partial thread or not at all.

use std::collections::HashSet;

use firth_event::{EventId, FeedId, RawItem};
use firth_transport::{subid, ClientRequest, Filter, SubscriptionId};
use tracing::debug;

use crate::transform::RenderItem;

struct InFlight {
    sub: SubscriptionId,
    batch: Vec<RawItem>,
}

/// Tracks danglers across reconciliation passes.
pub struct RefResolver {
    /// Leaf ids ever queued; bounds every dangler to one fetch cycle.
    attempted: HashSet<EventId>,
    /// Danglers waiting for the next flush.
    pending: Vec<RawItem>,
    in_flight: Option<InFlight>,
    seq: u64,
}

impl RefResolver {
    pub fn new() -> Self {
        Self {
            attempted: HashSet::new(),
            pending: Vec::new(),
            in_flight: None,
            seq: 0,
        }
    }

    /// Queue newly seen danglers. Returns `true` when anything was added,
    /// i.e. the caller should arm the flush debounce.
    pub fn enqueue(&mut self, danglers: &[RenderItem]) -> bool {
        let mut queued = false;
        for dangler in danglers {
            if self.attempted.insert(dangler.id()) {
                self.pending.push(dangler.item.clone());
                queued = true;
            }
        }
        if queued {
            debug!(pending = self.pending.len(), "queued danglers");
        }
        queued
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Build the deduplicated fetch for everything pending. `None` when
    /// there is nothing to fetch or a fetch is already in flight — the
    /// pending queue survives until that one completes.
    pub fn flush(&mut self, feed: &FeedId) -> Option<ClientRequest> {
        if self.pending.is_empty() || self.in_flight.is_some() {
            return None;
        }
        let batch = std::mem::take(&mut self.pending);
        let missing: HashSet<EventId> = batch
            .iter()
            .filter_map(|item| item.reply_to().or_else(|| item.root_ref()))
            .collect();
        if missing.is_empty() {
            return None;
        }

        self.seq += 1;
        let sub = subid::refs(feed, self.seq);
        debug!(sub = %sub, ids = missing.len(), "fetching missing references");
        let request = ClientRequest::subscribe(sub.clone(), vec![Filter::by_ids(missing)]);
        self.in_flight = Some(InFlight { sub, batch });
        Some(request)
    }

    /// Subscription id of the fetch in flight, if any.
    pub fn in_flight_sub(&self) -> Option<&SubscriptionId> {
        self.in_flight.as_ref().map(|f| &f.sub)
    }

    /// Response arrived for `sub`: hand back the batch for its second pass.
    pub fn complete(&mut self, sub: &SubscriptionId) -> Option<Vec<RawItem>> {
        if self.in_flight.as_ref().is_some_and(|f| &f.sub == sub) {
            self.in_flight.take().map(|f| f.batch)
        } else {
            None
        }
    }

    /// The fetch timed out: hand back the batch anyway so it renders with
    /// whatever local context exists.
    pub fn take_timed_out(&mut self) -> Option<Vec<RawItem>> {
        self.in_flight.take().map(|f| f.batch)
    }
}

impl Default for RefResolver {
    fn default() -> Self {
        Self::new()
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

    fn dangler(seed: u8, ts: u64, parent: EventId) -> RenderItem {
        let item = RawItem::new(author(seed), ts, kind::NOTE, "orphan")
            .with_ref(RefKind::ReplyTo, parent);
        RenderItem::new(item, vec![])
    }

    fn ghost(seed: u8) -> EventId {
        RawItem::new(author(seed), 1, kind::NOTE, "ghost").id
    }

    #[test]
    fn each_dangler_is_fetched_once() {
        let feed: FeedId = "home".into();
        let mut resolver = RefResolver::new();
        let d = dangler(1, 100, ghost(9));

        assert!(resolver.enqueue(std::slice::from_ref(&d)));
        // Same dangler surfacing again in a later pass is not re-queued.
        assert!(!resolver.enqueue(std::slice::from_ref(&d)));

        let request = resolver.flush(&feed).unwrap();
        match request {
            ClientRequest::Subscribe { filters, .. } => {
                assert_eq!(filters[0].ids.as_ref().unwrap().len(), 1);
            }
            other => panic!("unexpected request: {other:?}"),
        }

        let sub = resolver.in_flight_sub().unwrap().clone();
        let batch = resolver.complete(&sub).unwrap();
        assert_eq!(batch.len(), 1);

        // One cycle only: nothing left to flush.
        assert!(!resolver.enqueue(std::slice::from_ref(&d)));
        assert!(resolver.flush(&feed).is_none());
    }

    #[test]
    fn missing_ids_are_deduplicated() {
        let feed: FeedId = "home".into();
        let shared_parent = ghost(9);
        let mut resolver = RefResolver::new();
        resolver.enqueue(&[dangler(1, 100, shared_parent), dangler(2, 200, shared_parent)]);

        match resolver.flush(&feed).unwrap() {
            ClientRequest::Subscribe { filters, .. } => {
                assert_eq!(filters[0].ids.as_ref().unwrap().len(), 1);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn second_flush_waits_for_first_to_complete() {
        let feed: FeedId = "home".into();
        let mut resolver = RefResolver::new();
        resolver.enqueue(&[dangler(1, 100, ghost(8))]);
        let first = resolver.flush(&feed).unwrap();

        resolver.enqueue(&[dangler(2, 200, ghost(9))]);
        assert!(resolver.flush(&feed).is_none());
        assert!(resolver.has_pending());

        let sub = first.subscription_id().clone();
        resolver.complete(&sub).unwrap();
        assert!(resolver.flush(&feed).is_some());
    }

    #[test]
    fn timeout_hands_back_the_batch() {
        let feed: FeedId = "home".into();
        let mut resolver = RefResolver::new();
        resolver.enqueue(&[dangler(1, 100, ghost(8))]);
        resolver.flush(&feed).unwrap();

        let batch = resolver.take_timed_out().unwrap();
        assert_eq!(batch.len(), 1);
        assert!(resolver.in_flight_sub().is_none());
    }

    #[test]
    fn completion_ignores_unrelated_subscriptions() {
        let feed: FeedId = "home".into();
        let mut resolver = RefResolver::new();
        resolver.enqueue(&[dangler(1, 100, ghost(8))]);
        resolver.flush(&feed).unwrap();

        assert!(resolver.complete(&"REFS-other-1".to_string()).is_none());
        assert!(resolver.in_flight_sub().is_some());
    }
}
