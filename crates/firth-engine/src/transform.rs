//! Event-to-item transformation.
//!
//! Turns raw store rows into renderable items: filters out what the column
//! must not show again (seen, already on screen, outside the load window,
//! untrusted) and attaches each survivor's locally resolvable ancestor
//! chain. Pure with respect to shared state — the only side channel is the
//! store read for ancestors.

use std::collections::HashSet;

use firth_event::{AuthorId, EventId, RawItem, Timestamp};
use firth_store::EventStore;
use tracing::{debug, warn};

/// A renderable projection of one event: the leaf plus the part of its
/// reply chain the column will show above it.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    /// The leaf event
    pub item: RawItem,
    /// Resolved ancestors, root first, immediate parent last
    pub ancestors: Vec<RawItem>,
    /// Rows this thread occupies on screen (leaf + ancestors)
    pub thread_len: usize,
    /// Whether older ancestors were cut off
    pub truncated: bool,
}

impl RenderItem {
    pub fn new(item: RawItem, ancestors: Vec<RawItem>) -> Self {
        let thread_len = 1 + ancestors.len();
        Self {
            item,
            ancestors,
            thread_len,
            truncated: false,
        }
    }

    pub fn id(&self) -> EventId {
        self.item.id
    }

    pub fn created_at(&self) -> Timestamp {
        self.item.created_at
    }

    pub fn repost_target(&self) -> Option<EventId> {
        self.item.repost_target()
    }

    /// Every id this row puts on screen: the leaf, its ancestors, and for
    /// reposts the reposted event.
    pub fn screen_ids(&self) -> Vec<EventId> {
        if let Some(target) = self.repost_target() {
            return vec![self.id(), target];
        }
        let mut ids = Vec::with_capacity(1 + self.ancestors.len());
        ids.push(self.id());
        ids.extend(self.ancestors.iter().map(|a| a.id));
        ids
    }
}

/// Which edge of the screen a batch is headed for, with the leaf-timestamp
/// cutoff that implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchWindow {
    /// New arrivals: keep leaves strictly newer than the newest on screen.
    Newer { since: Timestamp },
    /// Pagination: keep leaves strictly older than the oldest on screen.
    Older { until: Timestamp },
}

/// Screen and session state a batch is filtered against.
pub struct BatchContext<'a> {
    /// Session-wide suppression set
    pub seen: &'a HashSet<EventId>,
    /// Everything currently on screen (leaves, ancestors, repost targets)
    pub on_screen: &'a HashSet<EventId>,
    /// Allow-listed authors; `None` when the filter is off or the feed
    /// bypasses it
    pub trusted: Option<&'a HashSet<AuthorId>>,
    pub window: BatchWindow,
    /// First materialization of this feed — an over-aggressive filter must
    /// not leave the column permanently blank
    pub first_load: bool,
    pub now: Timestamp,
    /// Tolerated clock skew before an item counts as fake-dated
    pub future_drift_max: u64,
}

/// Filter a raw batch down to what is actually new for this column.
///
/// On first load, if the seen/window filters leave nothing new, the
/// trust-filtered batch is returned instead — a feed coming back after a
/// long pause would otherwise show a spinner forever because everything in
/// the store was seen in some previous session.
pub fn prepare_batch(events: Vec<RawItem>, ctx: &BatchContext<'_>) -> Vec<RawItem> {
    let trusted: Vec<RawItem> = match ctx.trusted {
        Some(allow) => events
            .into_iter()
            .filter(|e| allow.contains(&e.author))
            .collect(),
        None => events,
    };

    let horizon = ctx.now.saturating_add(ctx.future_drift_max);
    let filtered: Vec<RawItem> = trusted
        .iter()
        .filter(|e| {
            if ctx.seen.contains(&e.id) {
                return false;
            }
            if let Some(target) = e.repost_target() {
                if ctx.seen.contains(&target) {
                    return false;
                }
            }
            if e.created_at > horizon {
                return false;
            }
            match ctx.window {
                BatchWindow::Newer { since } => e.created_at > since,
                BatchWindow::Older { until } => e.created_at < until,
            }
        })
        .cloned()
        .collect();

    let new_count = filtered
        .iter()
        .filter(|e| !ctx.on_screen.contains(&e.id))
        .count();

    if new_count == 0 {
        if ctx.first_load && !trusted.is_empty() {
            debug!(count = trusted.len(), "first load, keeping full batch");
            return trusted;
        }
        return Vec::new();
    }

    debug!(count = new_count, "prepared batch");
    filtered
}

/// Project prepared events into [`RenderItem`]s, attaching ancestor chains
/// from the local store. A failed ancestor lookup degrades to an empty
/// chain; the resolver gets a chance at it later.
pub fn transform_batch(
    events: Vec<RawItem>,
    store: &dyn EventStore,
    on_screen: &HashSet<EventId>,
    replies_enabled: bool,
    max_ancestors: usize,
) -> Vec<RenderItem> {
    events
        .into_iter()
        .filter(|e| !on_screen.contains(&e.id))
        .map(|e| {
            let ancestors = if replies_enabled && e.is_reply() {
                match store.ancestors(&e.id, max_ancestors) {
                    Ok(chain) => chain,
                    Err(err) => {
                        warn!(id = %e.id.short(), %err, "ancestor lookup failed");
                        Vec::new()
                    }
                }
            } else {
                Vec::new()
            };
            RenderItem::new(e, ancestors)
        })
        .collect()
}
