//! Subscription filters.

use std::collections::HashSet;

use firth_event::{AuthorId, EventId, Kind, Timestamp};
use serde::{Deserialize, Serialize};

/// Relays reject filters with too many authors; anything above this is
/// truncated before sending.
pub const MAX_FILTER_AUTHORS: usize = 2000;

/// What a subscription asks a relay for. All populated fields must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<HashSet<EventId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<HashSet<AuthorId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashtags: Option<HashSet<String>>,
    #[serde(default)]
    pub kinds: HashSet<Kind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    /// Fetch specific events by id.
    pub fn by_ids(ids: HashSet<EventId>) -> Self {
        Self {
            ids: Some(ids),
            ..Self::default()
        }
    }

    /// Events of the given kinds from an author set.
    pub fn by_authors(authors: HashSet<AuthorId>, kinds: HashSet<Kind>) -> Self {
        Self {
            authors: Some(cap_authors(authors)),
            kinds,
            ..Self::default()
        }
    }

    /// Events of the given kinds carrying one of the hashtags.
    pub fn by_hashtags(hashtags: HashSet<String>, kinds: HashSet<Kind>) -> Self {
        Self {
            hashtags: Some(hashtags),
            kinds,
            ..Self::default()
        }
    }

    /// Everything of the given kinds (relay-scoped feeds).
    pub fn global(kinds: HashSet<Kind>) -> Self {
        Self {
            kinds,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn since(mut self, ts: Timestamp) -> Self {
        self.since = Some(ts);
        self
    }

    #[must_use]
    pub fn until(mut self, ts: Timestamp) -> Self {
        self.until = Some(ts);
        self
    }

    #[must_use]
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

/// Truncate oversized author sets deterministically (lowest ids win) so the
/// same config always produces the same filter.
fn cap_authors(authors: HashSet<AuthorId>) -> HashSet<AuthorId> {
    if authors.len() <= MAX_FILTER_AUTHORS {
        return authors;
    }
    let mut sorted: Vec<AuthorId> = authors.into_iter().collect();
    sorted.sort();
    sorted.truncate(MAX_FILTER_AUTHORS);
    sorted.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn author(n: u16) -> AuthorId {
        let mut id = [0u8; 32];
        id[0] = (n >> 8) as u8;
        id[1] = (n & 0xff) as u8;
        AuthorId(id)
    }

    #[test]
    fn oversized_author_set_is_capped() {
        let authors: HashSet<AuthorId> = (0..2500u16).map(author).collect();
        let filter = Filter::by_authors(authors, [1].into());
        assert_eq!(filter.authors.unwrap().len(), MAX_FILTER_AUTHORS);
    }

    #[test]
    fn builders_compose() {
        let f = Filter::global([1].into()).since(100).until(200).limit(50);
        assert_eq!(f.since, Some(100));
        assert_eq!(f.until, Some(200));
        assert_eq!(f.limit, Some(50));
    }
}
