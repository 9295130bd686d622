//! Feed configuration.

use std::collections::HashSet;
use std::time::Duration;

use firth_event::{kind, AuthorId, FeedId, Kind, Timestamp};
use firth_store::{AuthorQuery, EventStore, RelayQuery, TimeWindow};
use firth_transport::{Filter, MAX_FILTER_AUTHORS};

use crate::error::{EngineError, Result};

/// Engine timing and sizing knobs.
///
/// The defaults match observed-good values from production use; none of
/// them is derived from first principles, so treat them as a starting
/// point, not an invariant.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Visible rows kept after a truncating top-insert.
    pub max_visible: usize,
    /// Rows the anchor must keep below fresh inserts for truncation to be
    /// allowed.
    pub anchor_headroom: usize,
    /// Smallest drop worth truncating for.
    pub min_truncate: usize,
    /// Jump to the newest row on arrival instead of preserving the anchor.
    pub auto_scroll: bool,
    /// Live re-subscribe cadence.
    pub refresh_interval: Duration,
    /// Debounce for store-change signals before a reconcile pass.
    pub signal_debounce: Duration,
    /// Floor between consecutive reconcile passes under event storms.
    pub signal_throttle: Duration,
    /// Catch-up window width.
    pub gap_window_hours: u64,
    /// Deadline per catch-up window; longer than a live request because
    /// backfill replays can legitimately take a while.
    pub gap_timeout: Duration,
    /// Debounce batching rapid danglers into one reference fetch.
    pub resolver_debounce: Duration,
    /// Deadline for a reference fetch.
    pub resolver_timeout: Duration,
    /// Deadline for a follow-list fetch.
    pub contacts_timeout: Duration,
    /// How far before the watermark a resume starts, absorbing relay clock
    /// skew.
    pub watermark_slack: u64,
    /// A resume never reaches further back than this.
    pub max_resume_lookback: u64,
    /// Rows per local query.
    pub query_limit: usize,
    /// Rows requested per older-page.
    pub page_limit: usize,
    /// Ancestor chain depth attached per reply.
    pub max_ancestors: usize,
    /// Tolerated future-dating before an item is treated as fake.
    pub future_drift_max: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            max_visible: 20,
            anchor_headroom: 10,
            min_truncate: 5,
            auto_scroll: false,
            refresh_interval: Duration::from_secs(9),
            signal_debounce: Duration::from_millis(100),
            signal_throttle: Duration::from_secs(5),
            gap_window_hours: 4,
            gap_timeout: Duration::from_secs(15),
            resolver_debounce: Duration::from_secs(1),
            resolver_timeout: Duration::from_secs(6),
            contacts_timeout: Duration::from_secs(6),
            watermark_slack: 300,
            max_resume_lookback: 86_400,
            query_limit: 50,
            page_limit: 100,
            max_ancestors: 10,
            future_drift_max: 10_800,
        }
    }
}

impl Tuning {
    /// Millisecond-scale timings for tests.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            refresh_interval: Duration::from_millis(200),
            signal_debounce: Duration::from_millis(5),
            signal_throttle: Duration::from_millis(20),
            gap_timeout: Duration::from_millis(100),
            resolver_debounce: Duration::from_millis(10),
            resolver_timeout: Duration::from_millis(50),
            contacts_timeout: Duration::from_millis(50),
            ..Self::default()
        }
    }
}

/// What a feed shows. One variant per selection shape, each knowing how to
/// query the local store and build its subscription filters; adding a
/// variant means implementing those capabilities once instead of extending
/// a switch in every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    /// The account's follow list plus followed hashtags.
    Following {
        authors: HashSet<AuthorId>,
        hashtags: HashSet<String>,
    },
    /// An explicit author set.
    Authors { authors: HashSet<AuthorId> },
    /// Everything a relay set delivers.
    Relays { relays: HashSet<String> },
    /// Another user's feed; their follow list is resolved at load time.
    SomeoneElses {
        author: AuthorId,
        authors: HashSet<AuthorId>,
        hashtags: HashSet<String>,
    },
    /// Recognized but not implemented; loads straight into an error state.
    Unsupported(&'static str),
}

impl FeedSource {
    /// Author- and follow-scoped feeds skip the trust filter: their
    /// selection is already an allow list.
    pub fn bypasses_trust_filter(&self) -> bool {
        matches!(self, Self::Following { .. } | Self::Authors { .. })
    }

    /// How far back a first load reaches when no watermark exists.
    pub fn default_lookback(&self) -> u64 {
        match self {
            Self::Relays { .. } => 28_800,
            _ => 172_800,
        }
    }

    /// Relay scoping for subscriptions, where the source pins one.
    pub fn relay_scope(&self) -> Option<HashSet<String>> {
        match self {
            Self::Relays { relays } => Some(relays.clone()),
            _ => None,
        }
    }

    fn feed_kinds() -> HashSet<Kind> {
        kind::FEED_KINDS.iter().copied().collect()
    }

    /// Query the local store for this source.
    pub fn local_query(
        &self,
        store: &dyn EventStore,
        window: TimeWindow,
        include_replies: bool,
        limit: usize,
    ) -> firth_store::Result<Vec<firth_event::RawItem>> {
        match self {
            Self::Following { authors, hashtags }
            | Self::SomeoneElses {
                authors, hashtags, ..
            } => store.query_authors(
                &AuthorQuery::new(authors.clone(), Self::feed_kinds(), limit)
                    .with_hashtags(hashtags.clone())
                    .with_window(window)
                    .replies(include_replies),
            ),
            Self::Authors { authors } => store.query_authors(
                &AuthorQuery::new(authors.clone(), Self::feed_kinds(), limit)
                    .with_window(window)
                    .replies(include_replies),
            ),
            Self::Relays { relays } => store.query_relays(
                &RelayQuery::new(relays.clone(), Self::feed_kinds(), limit)
                    .with_window(window)
                    .replies(include_replies),
            ),
            Self::Unsupported(_) => Ok(Vec::new()),
        }
    }

    /// Filters for the live subscription, from `now` onward.
    pub fn live_filters(&self, now: Timestamp) -> Vec<Filter> {
        match self {
            Self::Relays { .. } => vec![Filter::global(Self::feed_kinds()).since(now).limit(100)],
            _ => self.range_filters(Some(now), None, None),
        }
    }

    /// Filters for a bounded time range (catch-up windows, pagination).
    pub fn range_filters(
        &self,
        since: Option<Timestamp>,
        until: Option<Timestamp>,
        limit: Option<usize>,
    ) -> Vec<Filter> {
        let base: Vec<Filter> = match self {
            Self::Following { authors, hashtags }
            | Self::SomeoneElses {
                authors, hashtags, ..
            } => author_hashtag_filters(authors, hashtags),
            Self::Authors { authors } => {
                if authors.is_empty() {
                    Vec::new()
                } else {
                    vec![Filter::by_authors(authors.clone(), Self::feed_kinds())]
                }
            }
            Self::Relays { .. } => vec![Filter::global(Self::feed_kinds())],
            Self::Unsupported(_) => Vec::new(),
        };
        base.into_iter()
            .map(|mut f| {
                f.since = since;
                f.until = until;
                f.limit = limit;
                f
            })
            .collect()
    }
}

/// One author/hashtag filter pair; hashtags are skipped when the combined
/// filter would exceed relay limits.
fn author_hashtag_filters(authors: &HashSet<AuthorId>, hashtags: &HashSet<String>) -> Vec<Filter> {
    let mut filters = Vec::new();
    if !authors.is_empty() {
        filters.push(Filter::by_authors(authors.clone(), FeedSource::feed_kinds()));
    }
    if !hashtags.is_empty() && authors.len() + hashtags.len() <= MAX_FILTER_AUTHORS {
        filters.push(Filter::by_hashtags(hashtags.clone(), FeedSource::feed_kinds()));
    }
    filters
}

/// Immutable-per-load description of one feed column.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub id: FeedId,
    pub name: String,
    pub source: FeedSource,
    /// Show replies threaded above their leaves, or leaves only.
    pub replies_enabled: bool,
    /// Apply the allow-list trust filter (where the source doesn't bypass
    /// it).
    pub trust_enabled: bool,
    pub tuning: Tuning,
}

impl FeedConfig {
    pub fn new(id: impl Into<FeedId>, name: impl Into<String>, source: FeedSource) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            source,
            replies_enabled: true,
            trust_enabled: false,
            tuning: Tuning::default(),
        }
    }

    #[must_use]
    pub fn with_replies(mut self, enabled: bool) -> Self {
        self.replies_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_trust(mut self, enabled: bool) -> Self {
        self.trust_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Reject configs that cannot produce a feed. These are caller bugs,
    /// surfaced immediately, unlike transient fetch failures which degrade
    /// to local data.
    pub fn validate(&self) -> Result<()> {
        match &self.source {
            FeedSource::Following { authors, hashtags } => {
                if authors.is_empty() && hashtags.is_empty() {
                    return Err(EngineError::InvalidConfig(
                        "follow list is empty".into(),
                    ));
                }
            }
            FeedSource::Authors { authors } => {
                if authors.is_empty() {
                    return Err(EngineError::InvalidConfig("feed has no authors".into()));
                }
            }
            FeedSource::Relays { relays } => {
                if relays.is_empty() {
                    return Err(EngineError::InvalidConfig(
                        "no relays selected for this feed".into(),
                    ));
                }
            }
            FeedSource::SomeoneElses { .. } => {}
            FeedSource::Unsupported(label) => {
                return Err(EngineError::InvalidConfig(format!(
                    "{label} feeds are not supported yet"
                )));
            }
        }
        Ok(())
    }
}
