//! Query descriptions for range reads.

use std::collections::HashSet;

use firth_event::{AuthorId, Kind, Timestamp};

/// Half-open time range over `created_at`. `None` means unbounded on that
/// side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeWindow {
    pub since: Option<Timestamp>,
    pub until: Option<Timestamp>,
}

impl TimeWindow {
    /// Everything at or after `ts`.
    pub fn since(ts: Timestamp) -> Self {
        Self {
            since: Some(ts),
            until: None,
        }
    }

    /// Everything at or before `ts`.
    pub fn until(ts: Timestamp) -> Self {
        Self {
            since: None,
            until: Some(ts),
        }
    }

    /// Both bounds.
    pub fn between(since: Timestamp, until: Timestamp) -> Self {
        Self {
            since: Some(since),
            until: Some(until),
        }
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.since.map_or(true, |s| ts >= s) && self.until.map_or(true, |u| ts <= u)
    }
}

/// Range query over an author set, optionally widened by hashtags.
///
/// An item matches when its author is in `authors` or it carries one of the
/// `hashtags`; empty hashtags means author-only.
#[derive(Debug, Clone)]
pub struct AuthorQuery {
    pub authors: HashSet<AuthorId>,
    pub hashtags: HashSet<String>,
    pub kinds: HashSet<Kind>,
    pub window: TimeWindow,
    /// When false, replies are filtered out and only thread leaves/roots
    /// come back.
    pub include_replies: bool,
    /// Maximum rows, newest first.
    pub limit: usize,
}

impl AuthorQuery {
    pub fn new(authors: HashSet<AuthorId>, kinds: HashSet<Kind>, limit: usize) -> Self {
        Self {
            authors,
            hashtags: HashSet::new(),
            kinds,
            window: TimeWindow::default(),
            include_replies: true,
            limit,
        }
    }

    #[must_use]
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn with_hashtags(mut self, hashtags: HashSet<String>) -> Self {
        self.hashtags = hashtags;
        self
    }

    #[must_use]
    pub fn replies(mut self, include: bool) -> Self {
        self.include_replies = include;
        self
    }
}

/// Range query over everything a set of relays delivered.
#[derive(Debug, Clone)]
pub struct RelayQuery {
    pub relays: HashSet<String>,
    pub kinds: HashSet<Kind>,
    pub window: TimeWindow,
    pub include_replies: bool,
    pub limit: usize,
}

impl RelayQuery {
    pub fn new(relays: HashSet<String>, kinds: HashSet<Kind>, limit: usize) -> Self {
        Self {
            relays,
            kinds,
            window: TimeWindow::default(),
            include_replies: true,
            limit,
        }
    }

    #[must_use]
    pub fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn replies(mut self, include: bool) -> Self {
        self.include_replies = include;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_bounds() {
        let w = TimeWindow::between(100, 200);
        assert!(w.contains(100));
        assert!(w.contains(200));
        assert!(!w.contains(99));
        assert!(!w.contains(201));
        assert!(TimeWindow::default().contains(0));
    }
}
