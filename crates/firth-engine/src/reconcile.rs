//! Screen-state reconciliation.
//!
//! Splices freshly materialized items into the visible list without
//! disturbing the consumer's viewport: new arrivals go on top, pagination
//! goes on the bottom, the list is bounded, and whenever the splice would
//! move the row the consumer is anchored on, a scroll-restoration index is
//! emitted for the rendering layer to apply. Every published [`ViewState`]
//! value is fully formed; there is no partially applied intermediate.

use std::collections::{HashMap, HashSet};

use firth_event::EventId;
use tracing::debug;

use crate::config::Tuning;
use crate::transform::RenderItem;

/// Per-item unread weight: the row itself plus the ancestor rows it brought
/// with it.
pub type UnreadMap = HashMap<EventId, usize>;

/// What a feed column shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ViewState {
    /// Nothing materialized yet.
    #[default]
    Loading,
    /// The visible list, newest leaf first.
    Items(Vec<RenderItem>),
    /// Unrecoverable for this load cycle; a fresh `load()` starts over.
    Error(String),
}

impl ViewState {
    pub fn items(&self) -> &[RenderItem] {
        match self {
            Self::Items(items) => items,
            _ => &[],
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// Which edge a batch lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertEdge {
    /// New arrivals.
    Top,
    /// Older pagination.
    Bottom,
}

/// Result of one splice.
#[derive(Debug, Clone, Default)]
pub struct SpliceOutcome {
    /// Rows actually inserted after deduplication.
    pub added: usize,
    /// Ids dropped off the bottom by truncation (they were scrolled past;
    /// the caller marks them seen).
    pub dropped_ids: Vec<EventId>,
    /// Index the rendering layer should restore the viewport to, if the
    /// splice moved the anchor row.
    pub scroll_to: Option<usize>,
    /// Whether the view changed at all.
    pub changed: bool,
}

/// The reconciler's whole world: the visible list, the unread counters and
/// the consumer's top-of-feed flag. Owned by the processing context; the
/// rendering context only ever receives cloned snapshots.
#[derive(Debug)]
pub struct ScreenState {
    pub view: ViewState,
    pub unread: UnreadMap,
    at_top: bool,
}

impl ScreenState {
    pub fn new() -> Self {
        Self {
            view: ViewState::Loading,
            unread: UnreadMap::new(),
            at_top: true,
        }
    }

    pub fn at_top(&self) -> bool {
        self.at_top
    }

    /// The rendering layer reports where the consumer is.
    pub fn set_at_top(&mut self, at_top: bool) {
        self.at_top = at_top;
    }

    /// Reset to a fresh load cycle.
    pub fn reset(&mut self) {
        self.view = ViewState::Loading;
        self.unread.clear();
        self.at_top = true;
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.view = ViewState::Error(message.into());
        self.unread.clear();
    }

    /// Every id currently occupying the screen, including thread ancestors,
    /// repost targets and rows still counted unread.
    pub fn on_screen_ids(&self) -> HashSet<EventId> {
        let mut ids: HashSet<EventId> = HashSet::new();
        for item in self.view.items() {
            ids.extend(item.screen_ids());
        }
        ids.extend(self.unread.keys().copied());
        ids
    }

    /// Newest leaf timestamp on screen.
    pub fn most_recent_created_at(&self) -> Option<u64> {
        self.view.items().iter().map(|i| i.created_at()).max()
    }

    /// Oldest leaf timestamp on screen.
    pub fn oldest_created_at(&self) -> Option<u64> {
        self.view.items().iter().map(|i| i.created_at()).min()
    }

    /// The consumer scrolled past these rows.
    pub fn mark_read(&mut self, ids: &[EventId]) {
        for id in ids {
            self.unread.remove(id);
        }
    }

    /// Splice a reconstructed batch into the view. See [`SpliceOutcome`]
    /// for what the caller still has to apply.
    pub fn splice(
        &mut self,
        new_items: Vec<RenderItem>,
        edge: InsertEdge,
        tuning: &Tuning,
    ) -> SpliceOutcome {
        if new_items.is_empty() {
            return SpliceOutcome::default();
        }

        // First materialization: replace the spinner outright.
        if !matches!(self.view, ViewState::Items(_)) {
            let unique = dedup_by_id(new_items);
            let added = unique.len();
            debug!(added, "first fill");
            self.at_top = true;
            self.view = ViewState::Items(unique);
            return SpliceOutcome {
                added,
                changed: true,
                ..SpliceOutcome::default()
            };
        }

        let current = self.on_screen_ids();
        let only_new: Vec<RenderItem> = dedup_by_id(
            new_items
                .into_iter()
                .filter(|item| {
                    if let Some(target) = item.repost_target() {
                        if current.contains(&target) {
                            return false;
                        }
                    }
                    !current.contains(&item.id())
                })
                .collect(),
        );
        if only_new.is_empty() {
            return SpliceOutcome::default();
        }
        let added = only_new.len();

        let ViewState::Items(existing) = &mut self.view else {
            unreachable!("checked above");
        };

        match edge {
            InsertEdge::Bottom => {
                debug!(added, "appended older page");
                existing.extend(only_new);
                SpliceOutcome {
                    added,
                    changed: true,
                    ..SpliceOutcome::default()
                }
            }
            InsertEdge::Top => {
                let prev_first = existing.first().map(|i| i.id());
                let unread_adds: Vec<(EventId, usize)> = only_new
                    .iter()
                    .map(|i| (i.id(), 1 + i.ancestors.len()))
                    .collect();

                let mut combined = only_new;
                combined.append(existing);

                // Truncate from the bottom, but only when it pays off and
                // the consumer's anchor row keeps enough headroom below the
                // fresh rows to stay put.
                let mut dropped_ids = Vec::new();
                let drop_count = combined.len().saturating_sub(tuning.max_visible);
                let not_too_little = drop_count > tuning.min_truncate;
                let not_too_much = combined.len() - drop_count > added + tuning.anchor_headroom;
                if self.at_top && not_too_little && not_too_much {
                    for item in combined.drain(combined.len() - drop_count..) {
                        dropped_ids.extend(item.screen_ids());
                    }
                }

                for (id, weight) in unread_adds {
                    self.unread.entry(id).or_insert(weight);
                }
                for id in &dropped_ids {
                    self.unread.remove(id);
                }

                let scroll_to = if self.at_top && tuning.auto_scroll {
                    None
                } else {
                    prev_first.and_then(|anchor| combined.iter().position(|i| i.id() == anchor))
                };
                if self.at_top && !tuning.auto_scroll && scroll_to.is_some() {
                    // The viewport is being pushed down to the restored
                    // anchor; the consumer is no longer at the top.
                    self.at_top = false;
                }

                debug!(added, dropped = dropped_ids.len(), "spliced new arrivals");
                self.view = ViewState::Items(combined);
                SpliceOutcome {
                    added,
                    dropped_ids,
                    scroll_to,
                    changed: true,
                }
            }
        }
    }
}

fn dedup_by_id(items: Vec<RenderItem>) -> Vec<RenderItem> {
    let mut seen: HashSet<EventId> = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.id()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use firth_event::{kind, AuthorId, RawItem, RefKind, Timestamp};

    fn author(seed: u8) -> AuthorId {
        let mut id = [0u8; 32];
        id[0] = seed;
        AuthorId(id)
    }

    fn row(seed: u8, ts: Timestamp) -> RenderItem {
        RenderItem::new(RawItem::new(author(seed), ts, kind::NOTE, &ts.to_string()), vec![])
    }

    fn rows(range: std::ops::Range<u64>) -> Vec<RenderItem> {
        range.rev().map(|ts| row(1, ts)).collect()
    }

    fn tuning() -> Tuning {
        Tuning::default()
    }

    #[test]
    fn first_fill_replaces_loading() {
        let mut screen = ScreenState::new();
        assert!(screen.view.is_loading());

        let outcome = screen.splice(rows(0..3), InsertEdge::Top, &tuning());
        assert_eq!(outcome.added, 3);
        assert_eq!(screen.view.items().len(), 3);
        assert!(screen.at_top());
    }

    #[test]
    fn first_fill_dedups_by_id() {
        let mut screen = ScreenState::new();
        let a = row(1, 100);
        let outcome = screen.splice(vec![a.clone(), a], InsertEdge::Top, &tuning());
        assert_eq!(outcome.added, 1);
    }

    #[test]
    fn top_insert_prepends_and_counts_unread() {
        let mut screen = ScreenState::new();
        screen.splice(rows(0..3), InsertEdge::Top, &tuning());

        let fresh = row(2, 50);
        let outcome = screen.splice(vec![fresh.clone()], InsertEdge::Top, &tuning());
        assert_eq!(outcome.added, 1);
        assert_eq!(screen.view.items()[0].id(), fresh.id());
        assert_eq!(screen.unread.get(&fresh.id()), Some(&1));
    }

    #[test]
    fn unread_weight_includes_ancestors() {
        let mut screen = ScreenState::new();
        screen.splice(rows(0..2), InsertEdge::Top, &tuning());

        let parent = RawItem::new(author(3), 10, kind::NOTE, "p");
        let leaf = RawItem::new(author(2), 90, kind::NOTE, "l")
            .with_ref(RefKind::ReplyTo, parent.id);
        let item = RenderItem::new(leaf, vec![parent]);
        let id = item.id();
        screen.splice(vec![item], InsertEdge::Top, &tuning());
        assert_eq!(screen.unread.get(&id), Some(&2));
    }

    #[test]
    fn duplicate_top_insert_is_dropped() {
        let mut screen = ScreenState::new();
        let a = row(1, 100);
        screen.splice(vec![a.clone()], InsertEdge::Top, &tuning());
        let outcome = screen.splice(vec![a], InsertEdge::Top, &tuning());
        assert_eq!(outcome.added, 0);
        assert!(!outcome.changed);
        assert_eq!(screen.view.items().len(), 1);
    }

    #[test]
    fn repost_of_on_screen_item_is_dropped() {
        let mut screen = ScreenState::new();
        let target = row(1, 100);
        screen.splice(vec![target.clone()], InsertEdge::Top, &tuning());

        let repost = RenderItem::new(
            RawItem::new(author(2), 200, kind::REPOST, "")
                .with_ref(RefKind::Quote, target.id()),
            vec![],
        );
        let outcome = screen.splice(vec![repost], InsertEdge::Top, &tuning());
        assert_eq!(outcome.added, 0);
        assert_eq!(screen.view.items().len(), 1);
    }

    #[test]
    fn bottom_insert_appends_without_truncation() {
        let mut screen = ScreenState::new();
        screen.splice(rows(50..80), InsertEdge::Top, &tuning());
        let before = screen.view.items().len();

        let outcome = screen.splice(rows(0..30), InsertEdge::Bottom, &tuning());
        assert_eq!(outcome.added, 30);
        assert_eq!(screen.view.items().len(), before + 30);
        assert!(outcome.dropped_ids.is_empty());
        // Pagination never counts as unread.
        assert!(screen.unread.is_empty());
    }

    #[test]
    fn truncation_respects_headroom_and_minimum_drop() {
        let t = tuning();
        let mut screen = ScreenState::new();
        screen.splice(rows(0..t.max_visible as u64), InsertEdge::Top, &tuning());

        // 10 fresh rows over a full screen: dropping to max_visible would
        // leave exactly added + headroom, not more, so the anchor guard
        // refuses and the list stays at 30 transiently.
        let outcome = screen.splice(rows(100..110), InsertEdge::Top, &t);
        assert_eq!(outcome.added, 10);
        assert_eq!(screen.view.items().len(), 30);

        // Back at the top, a 5-row batch passes both guards: 35 rows, drop
        // 15 (> min_truncate), remaining 20 > 5 + 10.
        screen.set_at_top(true);
        let outcome = screen.splice(rows(200..205), InsertEdge::Top, &t);
        assert_eq!(outcome.added, 5);
        assert_eq!(screen.view.items().len(), t.max_visible);
        assert_eq!(outcome.dropped_ids.len(), 15);
    }

    #[test]
    fn bounded_visible_size_after_truncating_splice() {
        let t = tuning();
        let mut screen = ScreenState::new();
        screen.splice(rows(0..40), InsertEdge::Top, &t);
        screen.splice(rows(100..105), InsertEdge::Top, &t);
        assert_eq!(screen.view.items().len(), t.max_visible);
    }

    #[test]
    fn away_from_top_skips_truncation_and_restores_anchor() {
        let t = tuning();
        let mut screen = ScreenState::new();
        screen.splice(rows(0..30), InsertEdge::Top, &t);
        let anchor = screen.view.items()[0].id();

        screen.set_at_top(false);
        let outcome = screen.splice(rows(100..105), InsertEdge::Top, &t);
        // No truncation while scrolled away.
        assert_eq!(screen.view.items().len(), 35);
        // The anchor row moved down by the inserted count; the restore
        // index points at it.
        assert_eq!(outcome.scroll_to, Some(5));
        assert_eq!(screen.view.items()[5].id(), anchor);
    }

    #[test]
    fn at_top_insert_emits_restore_and_clears_at_top() {
        let t = tuning();
        let mut screen = ScreenState::new();
        screen.splice(rows(0..3), InsertEdge::Top, &t);
        assert!(screen.at_top());

        let outcome = screen.splice(rows(10..12), InsertEdge::Top, &t);
        assert_eq!(outcome.scroll_to, Some(2));
        assert!(!screen.at_top());
    }

    #[test]
    fn auto_scroll_skips_restore() {
        let mut t = tuning();
        t.auto_scroll = true;
        let mut screen = ScreenState::new();
        screen.splice(rows(0..3), InsertEdge::Top, &t);
        let outcome = screen.splice(rows(10..12), InsertEdge::Top, &t);
        assert_eq!(outcome.scroll_to, None);
        assert!(screen.at_top());
    }

    #[test]
    fn truncation_reports_dropped_ids_and_clears_their_unread() {
        let t = tuning();
        let mut screen = ScreenState::new();
        screen.splice(rows(0..30), InsertEdge::Top, &t);

        let outcome = screen.splice(rows(200..205), InsertEdge::Top, &t);
        assert!(!outcome.dropped_ids.is_empty());
        for id in &outcome.dropped_ids {
            assert!(!screen.unread.contains_key(id));
        }
    }

    #[test]
    fn mark_read_clears_unread() {
        let t = tuning();
        let mut screen = ScreenState::new();
        screen.splice(rows(0..2), InsertEdge::Top, &t);
        let fresh = row(2, 50);
        screen.splice(vec![fresh.clone()], InsertEdge::Top, &t);
        assert_eq!(screen.unread.len(), 1);

        screen.mark_read(&[fresh.id()]);
        assert!(screen.unread.is_empty());
    }

    #[test]
    fn error_is_terminal_until_reset() {
        let mut screen = ScreenState::new();
        screen.set_error("no relays selected for this feed");
        assert!(matches!(screen.view, ViewState::Error(_)));

        screen.reset();
        assert!(screen.view.is_loading());
        assert!(screen.at_top());
    }
}
