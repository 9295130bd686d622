//! Thread reconstruction.
//!
//! Folds a flat batch of reply-linked items into compact partial threads:
//! each leaf keeps a gap-free prefix of its ancestor chain, long chains are
//! truncated from the oldest end, and nothing already claimed by a longer
//! thread (or already on screen) is rendered twice. The result reads like a
//! call stack per thread instead of an unordered dump of every reply.

use std::collections::HashSet;

use firth_event::EventId;

use crate::transform::RenderItem;

/// Reconstruct partial threads out of a transformed batch.
///
/// Items are considered longest-chain first so the longest thread claims
/// its ancestors before shorter duplicates are treated as already placed.
/// Output is newest-leaf first, the feed's display order.
pub fn reconstruct(mut items: Vec<RenderItem>, on_screen: &HashSet<EventId>) -> Vec<RenderItem> {
    items.sort_by(|a, b| b.ancestors.len().cmp(&a.ancestors.len()));

    let mut rendered: HashSet<EventId> = HashSet::new();
    let mut out: Vec<RenderItem> = Vec::with_capacity(items.len());

    for mut item in items {
        // A repost whose target is already placed adds nothing.
        if let Some(target) = item.repost_target() {
            if rendered.contains(&target) {
                continue;
            }
        }
        if rendered.contains(&item.id()) {
            continue;
        }

        if item.item.is_repost() {
            // A repost renders as a row for its target.
            if let Some(target) = item.repost_target() {
                rendered.insert(target);
                rendered.insert(item.id());
                out.push(item);
            }
            continue;
        }

        if item.ancestors.is_empty() {
            rendered.insert(item.id());
            out.push(item);
            continue;
        }

        // Reply: walk ancestors newest-to-oldest, keeping them until one is
        // already placed, but always retain the immediate parent.
        let full = std::mem::take(&mut item.ancestors);
        let full_len = full.len();
        let parent = full[full_len - 1].clone();

        let mut kept = Vec::new();
        for ancestor in full.into_iter().rev().skip(1) {
            if rendered.contains(&ancestor.id) || on_screen.contains(&ancestor.id) {
                break;
            }
            kept.push(ancestor);
        }
        kept.reverse();
        kept.push(parent);

        item.truncated = full_len > kept.len();
        item.thread_len = 1 + kept.len();
        rendered.insert(item.id());
        rendered.extend(kept.iter().map(|a| a.id));
        item.ancestors = kept;
        out.push(item);
    }

    out.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    out
}

/// Separate replies whose parent could not be resolved locally from
/// renderable threads. Danglers go to the reference resolver for a bounded
/// second pass instead of onto the screen.
pub fn split_danglers(items: Vec<RenderItem>) -> (Vec<RenderItem>, Vec<RenderItem>) {
    let mut danglers = Vec::new();
    let mut threads = Vec::new();
    for item in items {
        if item.item.is_reply() && item.ancestors.is_empty() && !item.item.is_repost() {
            danglers.push(item);
        } else {
            threads.push(item);
        }
    }
    (danglers, threads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use firth_event::{kind, AuthorId, RawItem, RefKind, Timestamp};
    use proptest::prelude::*;

    fn author(seed: u8) -> AuthorId {
        let mut id = [0u8; 32];
        id[0] = seed;
        AuthorId(id)
    }

    fn note(seed: u8, ts: Timestamp, text: &str) -> RawItem {
        RawItem::new(author(seed), ts, kind::NOTE, text)
    }

    fn chain(len: usize, base_ts: Timestamp) -> Vec<RawItem> {
        let mut items: Vec<RawItem> = Vec::new();
        for i in 0..len {
            let mut item = note(1, base_ts + i as u64, &format!("n{i}"));
            if let Some(prev) = items.last() {
                item = item.with_ref(RefKind::ReplyTo, prev.id);
            }
            items.push(item);
        }
        items
    }

    #[test]
    fn roots_and_replies_sort_newest_first() {
        // Store holds A(100) <- B(200), plus root C(300).
        let items = chain(2, 100);
        let (a, b) = (items[0].clone(), items[1].clone());
        let c = note(2, 300, "c");

        let leaves = reconstruct(
            vec![
                RenderItem::new(c.clone(), vec![]),
                RenderItem::new(b.clone(), vec![a.clone()]),
                RenderItem::new(a.clone(), vec![]),
            ],
            &HashSet::new(),
        );

        // Two rows: C at top, then B carrying A as its ancestor. A itself is
        // already claimed by B's thread.
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].id(), c.id);
        assert_eq!(leaves[1].id(), b.id);
        assert_eq!(leaves[1].ancestors.len(), 1);
        assert_eq!(leaves[1].ancestors[0].id, a.id);
        assert!(!leaves[1].truncated);
    }

    #[test]
    fn truncation_keeps_immediate_parent() {
        let items = chain(5, 100);
        let leaf = items[4].clone();
        let ancestors = items[..4].to_vec();

        // Everything up the chain except the parent is already on screen.
        let on_screen: HashSet<EventId> = items[..3].iter().map(|i| i.id).collect();

        let leaves = reconstruct(vec![RenderItem::new(leaf, ancestors)], &on_screen);
        assert_eq!(leaves.len(), 1);
        assert!(leaves[0].truncated);
        assert_eq!(leaves[0].ancestors.len(), 1);
        assert_eq!(leaves[0].ancestors[0].id, items[3].id);
        assert_eq!(leaves[0].thread_len, 2);
    }

    #[test]
    fn chain_stops_at_first_placed_ancestor_without_gaps() {
        let items = chain(5, 100);
        let leaf = items[4].clone();
        let ancestors = items[..4].to_vec();

        // Only the root is on screen: keep 1..=3, drop the root.
        let on_screen: HashSet<EventId> = [items[0].id].into();

        let leaves = reconstruct(vec![RenderItem::new(leaf, ancestors)], &on_screen);
        let kept: Vec<EventId> = leaves[0].ancestors.iter().map(|a| a.id).collect();
        assert_eq!(kept, vec![items[1].id, items[2].id, items[3].id]);
        assert!(leaves[0].truncated);
    }

    #[test]
    fn repost_renders_once_per_target() {
        let target = note(1, 100, "original");
        let repost_a =
            RawItem::new(author(2), 200, kind::REPOST, "").with_ref(RefKind::Quote, target.id);
        let repost_b =
            RawItem::new(author(3), 300, kind::REPOST, "").with_ref(RefKind::Quote, target.id);

        let leaves = reconstruct(
            vec![
                RenderItem::new(repost_a.clone(), vec![]),
                RenderItem::new(repost_b.clone(), vec![]),
            ],
            &HashSet::new(),
        );
        assert_eq!(leaves.len(), 1);
    }

    #[test]
    fn longer_thread_claims_shared_ancestors() {
        let items = chain(3, 100);
        let mid = RenderItem::new(items[1].clone(), vec![items[0].clone()]);
        let deep = RenderItem::new(items[2].clone(), items[..2].to_vec());

        let leaves = reconstruct(vec![mid, deep], &HashSet::new());
        // The deep leaf wins the whole chain; the mid leaf is one of its
        // ancestors and is dropped as a separate row.
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].id(), items[2].id);
        assert_eq!(leaves[0].ancestors.len(), 2);
    }

    #[test]
    fn unresolved_replies_split_out_as_danglers() {
        let ghost = note(9, 50, "missing parent");
        let dangler = note(1, 200, "orphan").with_ref(RefKind::ReplyTo, ghost.id);
        let root = note(2, 300, "fine");

        let (danglers, threads) = split_danglers(vec![
            RenderItem::new(dangler.clone(), vec![]),
            RenderItem::new(root.clone(), vec![]),
        ]);
        assert_eq!(danglers.len(), 1);
        assert_eq!(danglers[0].id(), dangler.id);
        assert_eq!(threads.len(), 1);
        assert_eq!(threads[0].id(), root.id);
    }

    proptest! {
        // Any reply that survives reconstruction with a non-empty input
        // chain still carries at least its immediate parent.
        #[test]
        fn truncated_chains_never_lose_the_parent(
            chain_len in 2usize..8,
            screened in proptest::collection::vec(any::<bool>(), 0..8),
        ) {
            let items = chain(chain_len, 100);
            let leaf = items[chain_len - 1].clone();
            let ancestors = items[..chain_len - 1].to_vec();
            let parent_id = ancestors[ancestors.len() - 1].id;

            let on_screen: HashSet<EventId> = ancestors
                .iter()
                .zip(screened.iter())
                .filter(|(_, s)| **s)
                .map(|(a, _)| a.id)
                .collect();

            let leaves = reconstruct(vec![RenderItem::new(leaf, ancestors)], &on_screen);
            prop_assert_eq!(leaves.len(), 1);
            prop_assert!(!leaves[0].ancestors.is_empty());
            prop_assert_eq!(leaves[0].ancestors.last().map(|a| a.id), Some(parent_id));
        }
    }
}
