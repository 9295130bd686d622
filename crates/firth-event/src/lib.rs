//! Firth Event Model
//!
//! Foundation types for the feed reconciliation engine: content-addressed
//! event identifiers, typed references between events, and the immutable
//! [`RawItem`] record that relays deliver and the local store persists.
//!
//! Events are addressed by a 32-byte content hash. The engine never verifies
//! signatures or parses wire framing; both happen upstream of this crate.

mod id;
mod item;

pub use id::{AuthorId, EventId, IdError};
pub use item::{ItemRef, Kind, RawItem, RefKind};

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Identifier of a feed instance. Kept short because it doubles as the
/// subscription-id prefix on the wire and relays reject long ids.
pub type FeedId = String;

/// Current wall-clock time as a unix timestamp.
pub fn now_ts() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Event kinds a feed column displays.
pub mod kind {
    use super::Kind;

    /// Short text note.
    pub const NOTE: Kind = 1;
    /// Follow list (author references only).
    pub const FOLLOW_LIST: Kind = 3;
    /// Repost of another event.
    pub const REPOST: Kind = 6;
    /// Picture-first post.
    pub const PICTURE: Kind = 20;
    /// Highlight of external content.
    pub const HIGHLIGHT: Kind = 9802;
    /// Long-form article.
    pub const LONGFORM: Kind = 30023;

    /// Kinds queried for a feed column.
    pub const FEED_KINDS: &[Kind] = &[NOTE, REPOST, PICTURE, HIGHLIGHT, LONGFORM];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_kinds_include_notes_and_reposts() {
        assert!(kind::FEED_KINDS.contains(&kind::NOTE));
        assert!(kind::FEED_KINDS.contains(&kind::REPOST));
        assert!(!kind::FEED_KINDS.contains(&kind::FOLLOW_LIST));
    }

    #[test]
    fn now_is_nonzero() {
        assert!(now_ts() > 0);
    }
}
