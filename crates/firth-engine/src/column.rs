//! Column controller.
//!
//! One controller per visible feed instance. The consumer-facing handle
//! lives on the rendering side and only ever sees fully formed snapshots:
//! a watch channel for [`ViewState`], one for the unread map, and a
//! one-shot scroll-restoration stream. All real work happens on a single
//! worker task (the processing context), which serializes reconciliation
//! passes by construction — there is never more than one in flight.
//!
//! Lifecycle: `Uninitialized → Loading → Ready ⇄ Paused`, with
//! `Ready → Error` on an unrecoverable config/parse failure. `Error` is
//! terminal only for that load cycle; a fresh `load()` starts over.

use std::collections::HashSet;
use std::sync::Arc;

use firth_event::{kind, now_ts, AuthorId, EventId, RawItem};
use firth_store::{AuthorQuery, EventStore, FeedStateStore, TimeWindow};
use firth_transport::{subid, ClientRequest, Filter, RelayMessage, SubscriptionId, Transport};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{FeedConfig, FeedSource};
use crate::error::{EngineError, Result};
use crate::gapfill::{GapFiller, GapStep};
use crate::reconcile::{InsertEdge, ScreenState, UnreadMap, ViewState};
use crate::resolver::RefResolver;
use crate::seen::SeenTracker;
use crate::thread::{reconstruct, split_danglers};
use crate::transform::{prepare_batch, transform_batch, BatchContext, BatchWindow};

/// Nothing on any relay predates this; the bottom of the last-resort fetch
/// when a feed is still empty after catching up.
const FEED_EPOCH: u64 = 1_622_888_074;

/// Collaborators a column is built from. Explicit dependencies, no
/// process-wide singletons: tests hand in doubles.
pub struct ColumnDeps {
    pub store: Arc<dyn EventStore>,
    pub feed_state: Arc<dyn FeedStateStore>,
    pub transport: Arc<dyn Transport>,
    /// Scoped to this column or shared process-wide.
    pub seen: SeenTracker,
    /// Allow-listed authors for the trust filter; `None` disables it.
    pub trusted: Option<Arc<HashSet<AuthorId>>>,
}

#[derive(Debug)]
enum Command {
    Load(FeedConfig),
    Reload(FeedConfig),
    Pause,
    Resume,
    LoadOlder,
    SetAtTop(bool),
    MarkRead(Vec<EventId>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Loading,
    Ready,
    Paused,
    Error,
}

/// Consumer-facing handle to one feed column.
pub struct ColumnController {
    cmd_tx: mpsc::UnboundedSender<Command>,
    view_rx: watch::Receiver<ViewState>,
    unread_rx: watch::Receiver<UnreadMap>,
    scroll_rx: Option<mpsc::UnboundedReceiver<usize>>,
    worker: tokio::task::JoinHandle<()>,
}

impl ColumnController {
    /// Spawn the column's worker. `relay_rx` is the incoming message
    /// stream from the transport that owns the sender half.
    pub fn spawn(deps: ColumnDeps, relay_rx: mpsc::UnboundedReceiver<RelayMessage>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ViewState::Loading);
        let (unread_tx, unread_rx) = watch::channel(UnreadMap::new());
        let (scroll_tx, scroll_rx) = mpsc::unbounded_channel();

        let worker = ColumnWorker {
            deps,
            config: None,
            phase: Phase::Uninitialized,
            screen: ScreenState::new(),
            view_tx,
            unread_tx,
            scroll_tx,
            cmd_rx,
            relay_rx,
            relay_closed: false,
            gap: None,
            gap_deadline: None,
            resolver: RefResolver::new(),
            resolver_flush_at: None,
            resolver_deadline: None,
            reconcile_at: None,
            last_pass: None,
            refresh_at: None,
            contacts_deadline: None,
            awaiting_contacts: false,
            watch_first_connection: false,
            any_probe: None,
            any_probe_used: false,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            cmd_tx,
            view_rx,
            unread_rx,
            scroll_rx: Some(scroll_rx),
            worker: handle,
        }
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| EngineError::WorkerGone)
    }

    /// Begin a load cycle with the given config.
    pub fn load(&self, config: FeedConfig) -> Result<()> {
        self.send(Command::Load(config))
    }

    /// Restart with new selection criteria (e.g. a replies toggle). The
    /// column's own seen set is reset; a shared one is left alone.
    pub fn reload(&self, config: FeedConfig) -> Result<()> {
        self.send(Command::Reload(config))
    }

    /// Suspend fetching and subscriptions; the view is preserved.
    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    /// Restart timers and catch up from the persisted watermark.
    pub fn resume(&self) -> Result<()> {
        self.send(Command::Resume)
    }

    /// Page older items onto the bottom.
    pub fn load_older(&self) -> Result<()> {
        self.send(Command::LoadOlder)
    }

    /// The rendering layer reports whether the consumer sits at the top.
    pub fn set_at_top(&self, at_top: bool) -> Result<()> {
        self.send(Command::SetAtTop(at_top))
    }

    /// The consumer scrolled past these rows; they never come back.
    pub fn mark_read(&self, ids: Vec<EventId>) -> Result<()> {
        self.send(Command::MarkRead(ids))
    }

    /// Observable view state. Every received value is a complete snapshot.
    pub fn view(&self) -> watch::Receiver<ViewState> {
        self.view_rx.clone()
    }

    /// Observable unread counters.
    pub fn unread(&self) -> watch::Receiver<UnreadMap> {
        self.unread_rx.clone()
    }

    /// One-shot scroll-restoration indices. Takeable once.
    pub fn take_scroll_signals(&mut self) -> Option<mpsc::UnboundedReceiver<usize>> {
        self.scroll_rx.take()
    }

    /// Stop the worker and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        let _ = self.worker.await;
    }
}

enum Wake {
    Cmd(Option<Command>),
    Relay(Option<RelayMessage>),
    Reconcile,
    GapTimeout,
    ResolverFlush,
    ResolverTimeout,
    Refresh,
    ContactsTimeout,
}

async fn sleep_or_never(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

struct ColumnWorker {
    deps: ColumnDeps,
    config: Option<FeedConfig>,
    phase: Phase,
    screen: ScreenState,

    view_tx: watch::Sender<ViewState>,
    unread_tx: watch::Sender<UnreadMap>,
    scroll_tx: mpsc::UnboundedSender<usize>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    relay_rx: mpsc::UnboundedReceiver<RelayMessage>,
    relay_closed: bool,

    gap: Option<GapFiller>,
    gap_deadline: Option<Instant>,
    resolver: RefResolver,
    resolver_flush_at: Option<Instant>,
    resolver_deadline: Option<Instant>,
    reconcile_at: Option<Instant>,
    last_pass: Option<Instant>,
    refresh_at: Option<Instant>,
    contacts_deadline: Option<Instant>,
    awaiting_contacts: bool,
    watch_first_connection: bool,
    /// Last-resort fetch when caught up onto an empty screen.
    any_probe: Option<SubscriptionId>,
    any_probe_used: bool,
}

impl ColumnWorker {
    async fn run(mut self) {
        loop {
            let wake = tokio::select! {
                cmd = self.cmd_rx.recv() => Wake::Cmd(cmd),
                msg = self.relay_rx.recv(), if !self.relay_closed => Wake::Relay(msg),
                _ = sleep_or_never(self.reconcile_at) => Wake::Reconcile,
                _ = sleep_or_never(self.gap_deadline) => Wake::GapTimeout,
                _ = sleep_or_never(self.resolver_flush_at) => Wake::ResolverFlush,
                _ = sleep_or_never(self.resolver_deadline) => Wake::ResolverTimeout,
                _ = sleep_or_never(self.refresh_at) => Wake::Refresh,
                _ = sleep_or_never(self.contacts_deadline) => Wake::ContactsTimeout,
            };

            match wake {
                Wake::Cmd(None) => break,
                Wake::Cmd(Some(cmd)) => {
                    if self.handle_command(cmd).await {
                        break;
                    }
                }
                Wake::Relay(None) => self.relay_closed = true,
                Wake::Relay(Some(msg)) => self.handle_relay(msg).await,
                Wake::Reconcile => {
                    self.reconcile_at = None;
                    self.run_local_pass(false);
                }
                Wake::GapTimeout => self.on_gap_timeout(),
                Wake::ResolverFlush => self.on_resolver_flush().await,
                Wake::ResolverTimeout => self.on_resolver_timeout(),
                Wake::Refresh => self.on_refresh().await,
                Wake::ContactsTimeout => self.on_contacts_timeout().await,
            }
        }
        debug!("column worker stopped");
    }

    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Load(config) => self.start_load(config, false).await,
            Command::Reload(config) => self.start_load(config, true).await,
            Command::Pause => self.on_pause().await,
            Command::Resume => self.on_resume().await,
            Command::LoadOlder => self.on_load_older().await,
            Command::SetAtTop(at_top) => self.screen.set_at_top(at_top),
            Command::MarkRead(ids) => {
                for id in &ids {
                    self.deps.seen.mark(*id);
                }
                self.screen.mark_read(&ids);
                self.publish();
            }
            Command::Shutdown => return true,
        }
        false
    }

    async fn handle_relay(&mut self, msg: RelayMessage) {
        match msg {
            RelayMessage::Event { subscription, item } => self.on_event(subscription, item),
            RelayMessage::EndOfStored { subscription } => {
                self.on_end_of_stored(subscription).await
            }
            RelayMessage::Connected => self.on_connected().await,
            RelayMessage::Disconnected => {
                self.watch_first_connection = true;
            }
        }
    }

    // --- Lifecycle ---

    async fn start_load(&mut self, config: FeedConfig, reset_seen: bool) {
        if let Err(err) = config.validate() {
            warn!(feed = %config.id, %err, "config rejected");
            self.phase = Phase::Error;
            self.screen.set_error(err.to_string());
            self.clear_deadlines();
            self.config = Some(config);
            self.publish();
            return;
        }

        info!(feed = %config.id, name = %config.name, "loading");
        if reset_seen {
            self.deps.seen.clear_scoped();
        }
        self.phase = Phase::Loading;
        self.screen.reset();
        self.publish();
        self.clear_deadlines();
        self.any_probe = None;
        self.any_probe_used = false;
        self.gap = Some(GapFiller::new(
            config.id.clone(),
            config.tuning.gap_window_hours,
        ));
        self.config = Some(config.clone());

        if let FeedSource::SomeoneElses { author, authors, .. } = &config.source {
            if authors.is_empty() {
                self.request_contacts(&config, *author).await;
                return;
            }
        }
        self.proceed_load(config).await;
    }

    async fn proceed_load(&mut self, config: FeedConfig) {
        // Local first: instant and works offline. Remote catches up after.
        self.run_local_pass(false);
        self.load_remote(&config).await;
        self.phase = Phase::Ready;
        self.refresh_at = Some(Instant::now());
    }

    async fn on_pause(&mut self) {
        let Some(config) = self.config.clone() else {
            return;
        };
        if !matches!(self.phase, Phase::Ready | Phase::Loading) {
            return;
        }
        info!(feed = %config.id, "paused");
        self.phase = Phase::Paused;
        self.clear_deadlines();

        self.close_sub(subid::live(&config.id)).await;
        if let Some(sub) = self.gap.as_mut().and_then(|g| g.cancel()) {
            self.close_sub(sub).await;
        }
        if let Some(sub) = self.any_probe.take() {
            self.close_sub(sub).await;
        }
        // An in-flight reference fetch is abandoned; its danglers spent
        // their one retry.
        self.resolver.take_timed_out();
    }

    async fn on_resume(&mut self) {
        let Some(config) = self.config.clone() else {
            return;
        };
        if self.phase != Phase::Paused {
            return;
        }
        info!(feed = %config.id, "resumed");
        self.phase = Phase::Ready;
        self.refresh_at = Some(Instant::now());
        self.run_local_pass(false);
        self.load_remote(&config).await;
        if self.resolver.has_pending() && self.resolver_flush_at.is_none() {
            self.resolver_flush_at = Some(Instant::now() + config.tuning.resolver_debounce);
        }
    }

    async fn on_load_older(&mut self) {
        let Some(config) = self.config.clone() else {
            return;
        };
        if self.phase != Phase::Ready {
            return;
        }
        self.run_local_pass(true);

        let until = self.screen.oldest_created_at().unwrap_or_else(now_ts);
        let filters = config
            .source
            .range_filters(None, Some(until), Some(config.tuning.page_limit));
        if filters.is_empty() {
            return;
        }
        let request = ClientRequest::Subscribe {
            id: subid::page(&config.id),
            filters,
            relays: config.source.relay_scope(),
        };
        if let Err(err) = self.deps.transport.send(request).await {
            debug!(feed = %config.id, %err, "page request failed, local only");
        }
    }

    // --- Someone-else's feed: resolve the follow list first ---

    async fn request_contacts(&mut self, config: &FeedConfig, author: AuthorId) {
        self.awaiting_contacts = true;
        let filter = Filter::by_authors([author].into(), [kind::FOLLOW_LIST].into()).limit(1);
        let request = ClientRequest::subscribe(subid::contacts(&config.id), vec![filter]);
        match self.deps.transport.send(request).await {
            Ok(()) => {
                self.contacts_deadline =
                    Some(Instant::now() + config.tuning.contacts_timeout);
            }
            Err(err) => {
                warn!(feed = %config.id, %err, "follow list fetch failed, trying local copy");
                self.finish_contacts(config.clone()).await;
            }
        }
    }

    async fn finish_contacts(&mut self, mut config: FeedConfig) {
        self.awaiting_contacts = false;
        self.contacts_deadline = None;

        if let FeedSource::SomeoneElses {
            author,
            authors,
            hashtags,
        } = &mut config.source
        {
            let query = AuthorQuery::new([*author].into(), [kind::FOLLOW_LIST].into(), 1);
            match self.deps.store.query_authors(&query) {
                Ok(rows) if !rows.is_empty() => {
                    let list = &rows[0];
                    *authors = list.tagged_authors.iter().copied().collect();
                    *hashtags = list.hashtags.iter().cloned().collect();
                    info!(feed = %config.id, follows = authors.len(), "resolved follow list");
                }
                Ok(_) => {
                    warn!(feed = %config.id, "no follow list available yet");
                }
                Err(err) => {
                    warn!(feed = %config.id, %err, "follow list query failed");
                }
            }
        }
        self.config = Some(config.clone());
        self.proceed_load(config).await;
    }

    async fn on_contacts_timeout(&mut self) {
        self.contacts_deadline = None;
        if !self.awaiting_contacts {
            return;
        }
        if let Some(config) = self.config.clone() {
            warn!(feed = %config.id, "follow list fetch timed out, using local copy");
            self.finish_contacts(config).await;
        }
    }

    // --- Remote catch-up ---

    async fn load_remote(&mut self, config: &FeedConfig) {
        let now = now_ts();
        let slack = config.tuning.watermark_slack;
        let watermark = self.deps.feed_state.refreshed_at(&config.id);
        let most_recent = self.screen.most_recent_created_at();

        // Resume from the watermark, not from the newest row on screen: that
        // row may have come from the store via another column's wider query,
        // with coverage gaps right behind it. Pull back a little for relay
        // clock skew, and never reach further back than the cap.
        let base = match (watermark, most_recent) {
            (Some(w), Some(m)) => w.min(m.saturating_sub(slack)),
            (Some(w), None) => w.saturating_sub(slack),
            (None, Some(m)) => m,
            (None, None) => now.saturating_sub(config.source.default_lookback()),
        };
        let since = base.max(now.saturating_sub(config.tuning.max_resume_lookback));

        let connected = self.deps.transport.is_connected();
        let step = match self.gap.as_mut() {
            Some(gap) => gap.begin(since, connected, now),
            None => return,
        };
        self.drive_gap(step, config).await;
    }

    async fn drive_gap(&mut self, step: GapStep, config: &FeedConfig) {
        match step {
            GapStep::Fetch { window, sub } => {
                let filters =
                    config
                        .source
                        .range_filters(Some(window.start), Some(window.end), None);
                if filters.is_empty() {
                    if let Some(gap) = self.gap.as_mut() {
                        gap.cancel();
                    }
                    return;
                }
                let request = ClientRequest::Subscribe {
                    id: sub,
                    filters,
                    relays: config.source.relay_scope(),
                };
                match self.deps.transport.send(request).await {
                    Ok(()) => {
                        self.gap_deadline = Some(Instant::now() + config.tuning.gap_timeout);
                    }
                    Err(err) => {
                        warn!(feed = %config.id, %err, "window request failed");
                        if let Some(gap) = self.gap.as_mut() {
                            gap.cancel();
                        }
                        self.watch_first_connection = true;
                    }
                }
            }
            GapStep::AwaitConnection => {
                self.watch_first_connection = true;
            }
            GapStep::CaughtUp => {
                self.gap_deadline = None;
                if self.screen.view.items().is_empty() && !self.any_probe_used {
                    self.send_any_probe(config).await;
                }
            }
        }
    }

    /// Caught up but the screen is still empty: one unbounded-range fetch
    /// so a feed whose authors post rarely shows *something*.
    async fn send_any_probe(&mut self, config: &FeedConfig) {
        self.any_probe_used = true;
        let filters = config.source.range_filters(
            Some(FEED_EPOCH),
            None,
            Some(config.tuning.page_limit),
        );
        if filters.is_empty() {
            return;
        }
        let sub = subid::resume(&config.id, FEED_EPOCH);
        debug!(feed = %config.id, "screen still empty, fetching any history");
        let request = ClientRequest::Subscribe {
            id: sub.clone(),
            filters,
            relays: config.source.relay_scope(),
        };
        if self.deps.transport.send(request).await.is_ok() {
            self.any_probe = Some(sub);
            self.gap_deadline = Some(Instant::now() + config.tuning.gap_timeout);
        }
    }

    fn on_gap_timeout(&mut self) {
        self.gap_deadline = None;
        self.any_probe = None;
        if let Some(gap) = self.gap.as_mut() {
            gap.on_timeout();
        }
        // Whatever arrived before the deadline is in the store; the cycle
        // still delivers that much instead of being dropped.
        self.run_local_pass(false);
    }

    // --- Relay stream ---

    fn on_event(&mut self, subscription: SubscriptionId, item: RawItem) {
        let Some(feed) = self.config.as_ref().map(|c| c.id.clone()) else {
            return;
        };
        if !subid::is_for_feed(&subscription, &feed) {
            return;
        }
        match self.deps.store.insert(item) {
            Ok(true) => self.schedule_reconcile(),
            Ok(false) => {}
            Err(err) => warn!(feed = %feed, %err, "store insert failed"),
        }
    }

    /// Debounce store-change signals into one reconciliation pass, with a
    /// throttle floor so event storms cannot starve or stampede the column.
    fn schedule_reconcile(&mut self) {
        let (debounce, throttle) = match self.config.as_ref() {
            Some(config) => (config.tuning.signal_debounce, config.tuning.signal_throttle),
            None => return,
        };
        if !matches!(self.phase, Phase::Ready | Phase::Loading) {
            return;
        }
        let mut at = Instant::now() + debounce;
        if let Some(last) = self.last_pass {
            let floor = last + throttle;
            if floor > at {
                at = floor;
            }
        }
        self.reconcile_at = Some(at);
    }

    async fn on_end_of_stored(&mut self, sub: SubscriptionId) {
        let Some(config) = self.config.clone() else {
            return;
        };
        if !subid::is_for_feed(&sub, &config.id) {
            return;
        }

        let gap_sub = self
            .gap
            .as_ref()
            .and_then(|g| g.current_sub())
            .is_some_and(|s| *s == sub);
        if gap_sub {
            self.gap_deadline = None;
            let now = now_ts();
            // Coverage up to this window is acknowledged; the watermark
            // moves regardless of how many rows survive filtering. Local
            // replay never touches it.
            self.deps.feed_state.advance_refreshed_at(&config.id, now);
            self.run_local_pass(false);
            let connected = self.deps.transport.is_connected();
            if let Some(step) = self.gap.as_mut().map(|g| g.on_response(connected, now)) {
                self.drive_gap(step, &config).await;
            }
            return;
        }

        if let Some(batch) = self.resolver.complete(&sub) {
            self.resolver_deadline = None;
            self.second_pass(batch, &config);
            if self.resolver.has_pending() && self.resolver_flush_at.is_none() {
                self.resolver_flush_at =
                    Some(Instant::now() + config.tuning.resolver_debounce);
            }
            return;
        }

        if self.any_probe.as_ref() == Some(&sub) {
            self.any_probe = None;
            self.gap_deadline = None;
            self.run_local_pass(false);
            return;
        }

        if self.awaiting_contacts && sub == subid::contacts(&config.id) {
            self.finish_contacts(config).await;
            return;
        }

        if sub == subid::page(&config.id) {
            self.run_local_pass(true);
        }
    }

    async fn on_connected(&mut self) {
        let Some(config) = self.config.clone() else {
            return;
        };
        if !matches!(self.phase, Phase::Ready | Phase::Loading) {
            return;
        }
        let was_watching = std::mem::take(&mut self.watch_first_connection);
        if let Some(step) = self.gap.as_mut().and_then(|g| g.on_connected(now_ts())) {
            self.drive_gap(step, &config).await;
        } else if was_watching {
            self.load_remote(&config).await;
        }
    }

    // --- Reference resolution ---

    async fn on_resolver_flush(&mut self) {
        self.resolver_flush_at = None;
        let Some(config) = self.config.clone() else {
            return;
        };
        if let Some(request) = self.resolver.flush(&config.id) {
            match self.deps.transport.send(request).await {
                Ok(()) => {
                    self.resolver_deadline =
                        Some(Instant::now() + config.tuning.resolver_timeout);
                }
                Err(err) => {
                    warn!(feed = %config.id, %err, "reference fetch failed");
                    if let Some(batch) = self.resolver.take_timed_out() {
                        self.second_pass(batch, &config);
                    }
                }
            }
        }
    }

    fn on_resolver_timeout(&mut self) {
        self.resolver_deadline = None;
        let Some(config) = self.config.clone() else {
            return;
        };
        if let Some(batch) = self.resolver.take_timed_out() {
            debug!(feed = %config.id, "reference fetch timed out, rendering partial threads");
            self.second_pass(batch, &config);
        }
    }

    /// Re-run a dangler batch with whatever context the store has now.
    /// Unresolved danglers render as best-effort partial threads this time
    /// instead of going back to the resolver.
    fn second_pass(&mut self, batch: Vec<RawItem>, config: &FeedConfig) {
        self.process_batch(batch, BatchWindow::Newer { since: 0 }, true, config);
    }

    // --- The reconciliation pipeline ---

    fn run_local_pass(&mut self, older: bool) {
        let Some(config) = self.config.clone() else {
            return;
        };
        if !matches!(self.phase, Phase::Ready | Phase::Loading) {
            return;
        }
        let now = now_ts();

        let (store_window, batch_window, limit) = if older {
            let until = self.screen.oldest_created_at().unwrap_or(now);
            (
                TimeWindow::until(until),
                BatchWindow::Older { until },
                config.tuning.page_limit,
            )
        } else {
            let since = self
                .screen
                .most_recent_created_at()
                .map(|ts| ts.saturating_sub(config.tuning.watermark_slack))
                .unwrap_or(0);
            (
                TimeWindow::since(since),
                BatchWindow::Newer { since },
                config.tuning.query_limit,
            )
        };

        let rows = match config.source.local_query(
            self.deps.store.as_ref(),
            store_window,
            config.replies_enabled,
            limit,
        ) {
            Ok(rows) => rows,
            Err(err) => {
                // Store trouble is "no data this cycle", retried on the
                // next tick; never fatal.
                warn!(feed = %config.id, %err, "local query failed");
                Vec::new()
            }
        };
        self.last_pass = Some(Instant::now());
        self.process_batch(rows, batch_window, false, &config);
    }

    fn process_batch(
        &mut self,
        events: Vec<RawItem>,
        window: BatchWindow,
        allow_dangling: bool,
        config: &FeedConfig,
    ) {
        if !matches!(self.phase, Phase::Ready | Phase::Loading) {
            return;
        }
        let now = now_ts();
        let seen = self.deps.seen.snapshot();
        let on_screen = self.screen.on_screen_ids();
        let trusted = if config.trust_enabled && !config.source.bypasses_trust_filter() {
            self.deps.trusted.as_deref()
        } else {
            None
        };

        let ctx = BatchContext {
            seen: &seen,
            on_screen: &on_screen,
            trusted,
            window,
            first_load: self.screen.view.is_loading(),
            now,
            future_drift_max: config.tuning.future_drift_max,
        };
        let prepared = prepare_batch(events, &ctx);
        if prepared.is_empty() {
            return;
        }

        let items = transform_batch(
            prepared,
            self.deps.store.as_ref(),
            &on_screen,
            config.replies_enabled,
            config.tuning.max_ancestors,
        );
        let leaves = reconstruct(items, &on_screen);

        let (danglers, threads) = if allow_dangling || !config.replies_enabled {
            (Vec::new(), leaves)
        } else {
            split_danglers(leaves)
        };
        if !danglers.is_empty() {
            if self.resolver.enqueue(&danglers) && self.resolver_flush_at.is_none() {
                self.resolver_flush_at =
                    Some(Instant::now() + config.tuning.resolver_debounce);
            }
        }
        if threads.is_empty() {
            return;
        }

        let edge = match window {
            BatchWindow::Older { .. } => InsertEdge::Bottom,
            BatchWindow::Newer { .. } => InsertEdge::Top,
        };
        let outcome = self.screen.splice(threads, edge, &config.tuning);
        for id in &outcome.dropped_ids {
            self.deps.seen.mark(*id);
        }
        if let Some(index) = outcome.scroll_to {
            let _ = self.scroll_tx.send(index);
        }
        if outcome.changed {
            self.publish();
        }
    }

    // --- Plumbing ---

    async fn on_refresh(&mut self) {
        let Some(config) = self.config.clone() else {
            self.refresh_at = None;
            return;
        };
        self.refresh_at = Some(Instant::now() + config.tuning.refresh_interval);
        if self.phase != Phase::Ready {
            return;
        }
        let filters = config.source.live_filters(now_ts());
        if filters.is_empty() {
            return;
        }
        let request = ClientRequest::Subscribe {
            id: subid::live(&config.id),
            filters,
            relays: config.source.relay_scope(),
        };
        if let Err(err) = self.deps.transport.send(request).await {
            debug!(feed = %config.id, %err, "live request failed");
        }
    }

    async fn close_sub(&mut self, id: SubscriptionId) {
        let _ = self
            .deps
            .transport
            .send(ClientRequest::Close { id })
            .await;
    }

    fn clear_deadlines(&mut self) {
        self.reconcile_at = None;
        self.gap_deadline = None;
        self.resolver_flush_at = None;
        self.resolver_deadline = None;
        self.refresh_at = None;
        self.contacts_deadline = None;
        self.awaiting_contacts = false;
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.screen.view.clone());
        self.unread_tx.send_replace(self.screen.unread.clone());
    }
}
