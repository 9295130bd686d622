//! Persisted per-feed state.

use std::collections::HashMap;
use std::sync::RwLock;

use firth_event::{FeedId, Timestamp};
use tracing::debug;

/// The watermark a feed reads at load and advances after remote
/// reconciliation. Backed by opaque key-value storage; only the timestamp
/// crosses this boundary.
pub trait FeedStateStore: Send + Sync {
    /// Newest point already reconciled for this feed, if any.
    fn refreshed_at(&self, feed: &FeedId) -> Option<Timestamp>;

    /// Move the watermark forward. A `ts` older than the stored value is
    /// ignored; returns what is stored afterwards.
    fn advance_refreshed_at(&self, feed: &FeedId, ts: Timestamp) -> Timestamp;
}

/// In-memory [`FeedStateStore`].
#[derive(Default)]
pub struct MemoryFeedState {
    map: RwLock<HashMap<FeedId, Timestamp>>,
}

impl MemoryFeedState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeedStateStore for MemoryFeedState {
    fn refreshed_at(&self, feed: &FeedId) -> Option<Timestamp> {
        let map = match self.map.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        map.get(feed).copied()
    }

    fn advance_refreshed_at(&self, feed: &FeedId, ts: Timestamp) -> Timestamp {
        let mut map = match self.map.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let slot = map.entry(feed.clone()).or_insert(ts);
        if ts > *slot {
            *slot = ts;
        }
        debug!(feed = %feed, watermark = *slot, "advanced watermark");
        *slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermark_only_moves_forward() {
        let state = MemoryFeedState::new();
        let feed: FeedId = "home".into();
        assert_eq!(state.refreshed_at(&feed), None);

        assert_eq!(state.advance_refreshed_at(&feed, 100), 100);
        assert_eq!(state.advance_refreshed_at(&feed, 50), 100);
        assert_eq!(state.advance_refreshed_at(&feed, 200), 200);
        assert_eq!(state.refreshed_at(&feed), Some(200));
    }
}
