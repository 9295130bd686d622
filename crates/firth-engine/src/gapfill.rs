//! Time-windowed catch-up after a pause.
//!
//! Resuming a feed that was offline means re-fetching coverage between the
//! persisted watermark and now. Doing that as one request either times out
//! or blows relay limits, so the filler walks fixed-size windows forward in
//! time, advancing only after a window's response (or giving up on
//! timeout), and going dormant when there is no connection rather than
//! burning the timeout budget on requests that cannot succeed.
//!
//! Not used for "older" pagination — that pages directly by `until`.

use firth_event::{FeedId, Timestamp};
use firth_transport::{subid, SubscriptionId};
use tracing::debug;

/// One catch-up window, `[start, end)` in unix seconds. Windows tile the
/// span from the resume point to now: window n+1 starts where n ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

/// Where the filler is in its walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GapState {
    /// Not walking (never started, finished, or gave up on timeout).
    Idle,
    /// A window's request is out; waiting for its end-of-stored or timeout.
    Fetching { window: GapWindow, sub: SubscriptionId },
    /// No connectivity; waiting for the first connection before retrying.
    Stalled,
}

/// What the caller should do after a state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GapStep {
    /// Send a bounded-range request for this window under this id.
    Fetch { window: GapWindow, sub: SubscriptionId },
    /// No connection; resume the walk when one appears.
    AwaitConnection,
    /// The walk reached now.
    CaughtUp,
}

/// Sequential window walker for one feed.
pub struct GapFiller {
    feed: FeedId,
    since: Timestamp,
    window_secs: u64,
    gap_index: u64,
    state: GapState,
}

impl GapFiller {
    pub fn new(feed: FeedId, window_hours: u64) -> Self {
        Self {
            feed,
            since: 0,
            window_secs: window_hours * 3600,
            gap_index: 0,
            state: GapState::Idle,
        }
    }

    /// Start a catch-up run from `since`.
    pub fn begin(&mut self, since: Timestamp, connected: bool, now: Timestamp) -> GapStep {
        self.since = since;
        self.gap_index = 0;
        self.step(connected, now)
    }

    /// The current window answered: persist happened upstream, move on.
    pub fn on_response(&mut self, connected: bool, now: Timestamp) -> GapStep {
        self.gap_index += 1;
        self.step(connected, now)
    }

    /// The current window timed out. The walk stops here; advancing past a
    /// window that never answered would compound the backlog on a bad
    /// connection.
    pub fn on_timeout(&mut self) {
        debug!(feed = %self.feed, gap = self.gap_index, "window timed out, stopping walk");
        self.state = GapState::Idle;
    }

    /// A connection appeared while stalled: resume the walk.
    pub fn on_connected(&mut self, now: Timestamp) -> Option<GapStep> {
        match self.state {
            GapState::Stalled => Some(self.step(true, now)),
            _ => None,
        }
    }

    /// Abandon the walk (pause). Returns the in-flight subscription so the
    /// caller can close it.
    pub fn cancel(&mut self) -> Option<SubscriptionId> {
        let sub = match std::mem::replace(&mut self.state, GapState::Idle) {
            GapState::Fetching { sub, .. } => Some(sub),
            _ => None,
        };
        self.gap_index = 0;
        sub
    }

    /// Subscription id of the window in flight.
    pub fn current_sub(&self) -> Option<&SubscriptionId> {
        match &self.state {
            GapState::Fetching { sub, .. } => Some(sub),
            _ => None,
        }
    }

    pub fn state(&self) -> &GapState {
        &self.state
    }

    fn step(&mut self, connected: bool, now: Timestamp) -> GapStep {
        if !connected {
            debug!(feed = %self.feed, "no connection, stalling catch-up");
            self.state = GapState::Stalled;
            return GapStep::AwaitConnection;
        }

        let start = self.since + self.gap_index * self.window_secs;
        if start >= now {
            debug!(feed = %self.feed, windows = self.gap_index, "caught up");
            self.gap_index = 0;
            self.state = GapState::Idle;
            return GapStep::CaughtUp;
        }

        let window = GapWindow {
            start,
            end: now.min(start + self.window_secs),
        };
        let sub = subid::resume(&self.feed, window.start);
        debug!(feed = %self.feed, start = window.start, end = window.end, sub = %sub, "fetching window");
        self.state = GapState::Fetching {
            window,
            sub: sub.clone(),
        };
        GapStep::Fetch { window, sub }
    }
}
