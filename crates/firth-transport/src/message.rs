//! Requests and the typed relay message stream.

use std::collections::HashSet;

use firth_event::RawItem;
use serde::{Deserialize, Serialize};

use crate::filter::Filter;

/// Identifies a subscription on the wire. Namespaced per feed; see [`subid`].
pub type SubscriptionId = String;

/// Subscription-id conventions.
///
/// A feed's live subscription reuses the feed id itself. Catch-up windows,
/// pagination and reference fetches get a purpose prefix so concurrent
/// requests for the same feed stay distinguishable — backfill windows in
/// particular embed their `since` so two windows never share an id.
pub mod subid {
    use firth_event::{FeedId, Timestamp};

    use super::SubscriptionId;

    /// Live (realtime) subscription for a feed.
    pub fn live(feed: &FeedId) -> SubscriptionId {
        feed.clone()
    }

    /// One catch-up window of a resume run.
    pub fn resume(feed: &FeedId, since: Timestamp) -> SubscriptionId {
        format!("RESUME-{feed}-{since}")
    }

    /// Older-page request (bottom pagination).
    pub fn page(feed: &FeedId) -> SubscriptionId {
        format!("PAGE-{feed}")
    }

    /// Missing-reference fetch; `seq` distinguishes successive batches.
    pub fn refs(feed: &FeedId, seq: u64) -> SubscriptionId {
        format!("REFS-{feed}-{seq}")
    }

    /// Follow-list fetch for someone-else's feed.
    pub fn contacts(feed: &FeedId) -> SubscriptionId {
        format!("CONTACTS-{feed}")
    }

    /// Whether a subscription id belongs to the given feed.
    pub fn is_for_feed(sub: &SubscriptionId, feed: &FeedId) -> bool {
        sub == feed
            || sub
                .split_once('-')
                .is_some_and(|(_, rest)| rest == feed || rest.starts_with(&format!("{feed}-")))
    }
}

/// What the engine sends to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Open (or replace) a subscription.
    Subscribe {
        id: SubscriptionId,
        filters: Vec<Filter>,
        /// Restrict to specific relays; `None` means the transport's default
        /// set.
        relays: Option<HashSet<String>>,
    },
    /// Close a subscription by id.
    Close { id: SubscriptionId },
}

impl ClientRequest {
    pub fn subscribe(id: SubscriptionId, filters: Vec<Filter>) -> Self {
        Self::Subscribe {
            id,
            filters,
            relays: None,
        }
    }

    pub fn subscription_id(&self) -> &SubscriptionId {
        match self {
            Self::Subscribe { id, .. } | Self::Close { id } => id,
        }
    }
}

/// What the transport delivers to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    /// An event matched one of our subscriptions.
    Event {
        subscription: SubscriptionId,
        item: RawItem,
    },
    /// The relay finished replaying stored events for a subscription;
    /// anything after this is live.
    EndOfStored { subscription: SubscriptionId },
    /// At least one relay connection is up.
    Connected,
    /// The last relay connection dropped.
    Disconnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sub_ids_are_feed_scoped() {
        let feed = "home".to_string();
        assert!(subid::is_for_feed(&subid::live(&feed), &feed));
        assert!(subid::is_for_feed(&subid::resume(&feed, 12345), &feed));
        assert!(subid::is_for_feed(&subid::page(&feed), &feed));
        assert!(subid::is_for_feed(&subid::refs(&feed, 2), &feed));
        assert!(!subid::is_for_feed(&subid::live(&"other".to_string()), &feed));
        assert!(!subid::is_for_feed(&subid::resume(&"other".to_string(), 1), &feed));
    }

    #[test]
    fn resume_ids_differ_per_window() {
        let feed = "home".to_string();
        assert_ne!(subid::resume(&feed, 100), subid::resume(&feed, 200));
    }

    #[test]
    fn relay_messages_are_tagged_on_the_wire() {
        let json = serde_json::to_string(&RelayMessage::EndOfStored {
            subscription: "home".into(),
        })
        .unwrap();
        assert!(json.contains("\"type\":\"end_of_stored\""));

        let back: RelayMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, RelayMessage::EndOfStored { .. }));
    }
}
