use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use chrono::NaiveDate;
use tokio::{sync::watch, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    opener::{OpenOutcome, PlatformOpener},
    platform::Platform,
    storage::{keys::LAST_RESET_KEY, StoreValue, UsageStore},
    utils::{
        clock::Clock,
        ticker::{schedule_once, start_ticker, TickerHandle},
        time::{date_to_marker, marker_to_date, until_next_day},
    },
};

use super::{
    ledger::Ledger,
    message::{TickKind, TrackerMessage, TrackerQueue},
    session::{Phase, Session},
    snapshot::{LiveActivity, Snapshot, TrackerView},
};

pub const DEFAULT_DISPLAY_INTERVAL: Duration = Duration::from_millis(100);
/// Live activities are never updated more often than this.
pub const MIN_ACTIVITY_INTERVAL: Duration = Duration::from_secs(1);
/// Scheduling jitter accepted between two activity ticks.
const ACTIVITY_JITTER: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub display_interval: Duration,
    pub activity_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            display_interval: DEFAULT_DISPLAY_INTERVAL,
            activity_interval: MIN_ACTIVITY_INTERVAL,
        }
    }
}

impl TrackerConfig {
    pub fn new(display_interval: Duration, activity_interval: Duration) -> Self {
        let display_interval = if display_interval.is_zero() {
            warn!("Display interval can't be zero, using {DEFAULT_DISPLAY_INTERVAL:?}");
            DEFAULT_DISPLAY_INTERVAL
        } else {
            display_interval
        };
        if activity_interval < MIN_ACTIVITY_INTERVAL {
            warn!("Activity interval {activity_interval:?} is too short, using {MIN_ACTIVITY_INTERVAL:?}");
        }
        Self {
            display_interval,
            activity_interval: activity_interval.max(MIN_ACTIVITY_INTERVAL),
        }
    }
}

/// Owner of the session state machine and the daily ledger.
///
/// Operations called outside of their precondition are ignored. Every method runs to completion
/// before the next message is taken from the queue, which keeps the daily reset and the pause
/// accounting from interleaving.
pub struct SessionTracker<S> {
    session: Session,
    ledger: Ledger,
    last_reset: Option<NaiveDate>,
    redirect_problem: Option<String>,
    store: S,
    clock: Arc<dyn Clock>,
    opener: Arc<dyn PlatformOpener>,
    live: Box<dyn LiveActivity>,
    live_visible: bool,
    last_live_update: Option<Instant>,
    queue: TrackerQueue,
    display_ticker: Option<TickerHandle>,
    activity_ticker: Option<TickerHandle>,
    next_day: Option<TickerHandle>,
    view: watch::Sender<TrackerView>,
    config: TrackerConfig,
}

impl<S: UsageStore> SessionTracker<S> {
    /// Restores the ledger and the reset marker from `store`. Nothing is reset or scheduled until
    /// [SessionTracker::startup] is called.
    pub async fn load(
        store: S,
        clock: Arc<dyn Clock>,
        opener: Arc<dyn PlatformOpener>,
        live: Box<dyn LiveActivity>,
        queue: TrackerQueue,
        config: TrackerConfig,
    ) -> Self {
        let ledger = Ledger::load(&store).await;
        let last_reset = read_marker(&store).await;
        let (view, _) = watch::channel(TrackerView::default());

        let tracker = Self {
            session: Session::default(),
            ledger,
            last_reset,
            redirect_problem: None,
            store,
            clock,
            opener,
            live,
            live_visible: false,
            last_live_update: None,
            queue,
            display_ticker: None,
            activity_ticker: None,
            next_day: None,
            view,
            config,
        };
        tracker.publish();
        tracker
    }

    /// Applies a pending daily reset and schedules the next one. Must run before the first
    /// session starts.
    pub async fn startup(&mut self) {
        self.reset_if_new_day().await;
        self.schedule_next_day();
    }

    pub async fn handle(&mut self, message: TrackerMessage) {
        // The boundary timer runs on the monotonic clock, which stands still while the machine
        // is suspended
        if message.is_command() && self.reset_if_new_day().await {
            self.schedule_next_day();
        }

        match message {
            TrackerMessage::Start(platform) => self.start_session(platform).await,
            TrackerMessage::Pause => self.pause_session().await,
            TrackerMessage::Resume => self.resume_session(),
            TrackerMessage::End => self.end_current_session().await,
            TrackerMessage::Foreground => self.app_foregrounded().await,
            TrackerMessage::ClearRedirectProblem => self.clear_redirect_problem(),
            TrackerMessage::Query(reply) => {
                if reply.send(self.view()).is_err() {
                    debug!("Query was dropped before the reply");
                }
            }
            TrackerMessage::Tick { kind, ticker } => self.on_tick(kind, ticker),
            TrackerMessage::OpenFinished { platform, outcome } => {
                self.apply_open_outcome(platform, outcome)
            }
            TrackerMessage::DailyBoundary { ticker } => self.on_day_boundary(ticker).await,
            TrackerMessage::Shutdown => self.shutdown().await,
        }
    }

    /// Starts timing `platform` from zero. An active session, even for the same platform, is
    /// accounted and ended first.
    pub async fn start_session(&mut self, platform: Platform) {
        if self.session.platform().is_some() {
            self.end_current_session().await;
        }

        self.session.begin(platform, self.clock.instant());
        self.start_tickers();
        self.live_begin(&Snapshot::new(platform, Duration::ZERO));
        self.request_open(platform);
        info!("Started session for {platform}");
        self.publish();
    }

    pub async fn pause_session(&mut self) {
        let Some((platform, delta)) = self.session.pause(self.clock.instant()) else {
            debug!("Ignoring pause in {:?}", self.session.phase());
            return;
        };

        self.ledger.add(platform, delta);
        self.ledger.persist(&mut self.store, platform).await;
        self.stop_tickers();
        if let Some(snapshot) = self.snapshot() {
            self.live_update(&snapshot);
        }
        info!("Paused {platform} after {delta:?}");
        self.publish();
    }

    pub fn resume_session(&mut self) {
        let Some(platform) = self.session.resume(self.clock.instant()) else {
            debug!("Ignoring resume in {:?}", self.session.phase());
            return;
        };

        self.start_tickers();
        if let Some(snapshot) = self.snapshot() {
            if self.live_visible {
                self.live_update(&snapshot);
            } else {
                self.live_begin(&snapshot);
            }
        }
        self.request_open(platform);
        info!("Resumed {platform}");
        self.publish();
    }

    pub async fn end_current_session(&mut self) {
        if self.session.phase() == Phase::Idle {
            debug!("Ignoring end without a session");
            return;
        }

        self.pause_session().await;
        let final_snapshot = self.snapshot();
        let Some(platform) = self.session.end() else {
            return;
        };

        if let Some(snapshot) = final_snapshot {
            if self.live_visible {
                self.live.end(&snapshot);
                self.live_visible = false;
            }
        }
        info!("Ended session for {platform}");
        self.publish();
    }

    /// The user is back from the external platform, so the time spent there stops counting.
    pub async fn app_foregrounded(&mut self) {
        self.pause_session().await;
    }

    /// Ends the session so nothing running is lost and stops every timer.
    pub async fn shutdown(&mut self) {
        self.end_current_session().await;
        self.stop_tickers();
        if let Some(next_day) = self.next_day.take() {
            next_day.cancel();
        }
        info!("Tracker stopped");
    }

    /// Zeroes the ledger unless it was already reset today. Returns whether a reset happened.
    ///
    /// A running interval that began before the boundary is banked into the session only, so the
    /// new day starts from zero while the session timer keeps going.
    pub async fn reset_if_new_day(&mut self) -> bool {
        let today = self.clock.local_time().date_naive();
        if self.last_reset == Some(today) {
            debug!("Usage was already reset for {today}");
            return false;
        }

        if let Some(carried) = self.session.bank(self.clock.instant()) {
            debug!("Running interval of {carried:?} stays with the previous day");
        }
        self.ledger.clear();
        self.ledger.persist_all(&mut self.store).await;

        self.last_reset = Some(today);
        if let Err(e) = self
            .store
            .set(LAST_RESET_KEY, StoreValue::Text(date_to_marker(today)))
            .await
        {
            warn!("Failed to persist reset marker: {e:?}");
        }

        info!("Reset daily usage for {today}");
        self.publish();
        true
    }

    pub fn active_platform(&self) -> Option<Platform> {
        self.session.platform()
    }

    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    pub fn current_elapsed(&self) -> Duration {
        self.session.current_elapsed(self.clock.instant())
    }

    /// Today's total for `platform`, current through now when it's the one running.
    pub fn daily_total(&self, platform: Platform) -> Duration {
        self.total_at(platform, self.session.running_delta(self.clock.instant()))
    }

    pub fn last_reset(&self) -> Option<NaiveDate> {
        self.last_reset
    }

    pub fn redirect_problem(&self) -> Option<&str> {
        self.redirect_problem.as_deref()
    }

    pub fn clear_redirect_problem(&mut self) {
        if self.redirect_problem.take().is_some() {
            self.publish();
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> TrackerView {
        let running_delta = self.session.running_delta(self.clock.instant());
        TrackerView {
            active_platform: self.session.platform(),
            phase: self.session.phase(),
            current_elapsed: self.session.buffered().saturating_add(running_delta),
            daily_totals: Platform::ALL
                .into_iter()
                .map(|platform| (platform, self.total_at(platform, running_delta)))
                .collect(),
            redirect_problem: self.redirect_problem.clone(),
        }
    }

    fn total_at(&self, platform: Platform, running_delta: Duration) -> Duration {
        let total = self.ledger.get(platform);
        if self.session.platform() == Some(platform) {
            total.saturating_add(running_delta)
        } else {
            total
        }
    }

    fn publish(&self) {
        self.view.send_replace(self.view());
    }

    fn snapshot(&self) -> Option<Snapshot> {
        self.session
            .platform()
            .map(|platform| Snapshot::new(platform, self.current_elapsed()))
    }

    fn live_begin(&mut self, snapshot: &Snapshot) {
        self.live.begin(snapshot);
        self.live_visible = true;
        self.last_live_update = Some(self.clock.instant());
    }

    fn live_update(&mut self, snapshot: &Snapshot) {
        if self.live_visible {
            self.live.update(snapshot);
            self.last_live_update = Some(self.clock.instant());
        }
    }

    fn start_tickers(&mut self) {
        // Replacing a handle drops the old one, which cancels it
        self.display_ticker =
            Some(self.spawn_ticker(TickKind::Display, self.config.display_interval));
        self.activity_ticker =
            Some(self.spawn_ticker(TickKind::Activity, self.config.activity_interval));
    }

    fn stop_tickers(&mut self) {
        for ticker in [self.display_ticker.take(), self.activity_ticker.take()]
            .into_iter()
            .flatten()
        {
            ticker.cancel();
        }
    }

    fn spawn_ticker(&self, kind: TickKind, interval: Duration) -> TickerHandle {
        let queue = self.queue.clone();
        start_ticker(self.clock.clone(), interval, move |ticker| {
            queue
                .send(TrackerMessage::Tick { kind, ticker })
                .map_err(|_| anyhow!("Tracker queue is closed"))
        })
    }

    fn on_tick(&mut self, kind: TickKind, ticker: u64) {
        let current = match kind {
            TickKind::Display => &self.display_ticker,
            TickKind::Activity => &self.activity_ticker,
        };
        if !self.session.is_running() || !current.as_ref().is_some_and(|h| h.id() == ticker) {
            debug!("Ignoring stale {kind:?} tick {ticker}");
            return;
        }

        match kind {
            TickKind::Display => self.publish(),
            TickKind::Activity => {
                let now = self.clock.instant();
                let too_soon = self.last_live_update.is_some_and(|last| {
                    now.saturating_duration_since(last) + ACTIVITY_JITTER
                        < self.config.activity_interval
                });
                if too_soon {
                    debug!("Dropping activity tick {ticker}, last update is too recent");
                    return;
                }
                if let Some(snapshot) = self.snapshot() {
                    self.live_update(&snapshot);
                }
            }
        }
    }

    fn schedule_next_day(&mut self) {
        let delay = until_next_day(self.clock.local_time());
        let queue = self.queue.clone();
        debug!("Next daily reset in {delay:?}");
        self.next_day = Some(schedule_once(self.clock.clone(), delay, move |ticker| {
            queue
                .send(TrackerMessage::DailyBoundary { ticker })
                .map_err(|_| anyhow!("Tracker queue is closed"))
        }));
    }

    async fn on_day_boundary(&mut self, ticker: u64) {
        if !self.next_day.as_ref().is_some_and(|h| h.id() == ticker) {
            debug!("Ignoring stale day boundary {ticker}");
            return;
        }
        // Waking up slightly early makes this a no-op, the new schedule then covers the rest
        self.reset_if_new_day().await;
        self.schedule_next_day();
    }

    /// The open runs on its own task, its outcome comes back through the queue.
    fn request_open(&self, platform: Platform) {
        let opener = self.opener.clone();
        let queue = self.queue.clone();
        tokio::spawn(async move {
            let outcome = opener.open(platform).await;
            if queue
                .send(TrackerMessage::OpenFinished { platform, outcome })
                .is_err()
            {
                debug!("Tracker is gone, dropping open outcome for {platform}");
            }
        });
    }

    fn apply_open_outcome(&mut self, platform: Platform, outcome: OpenOutcome) {
        if outcome.success {
            debug!("Opened {platform}");
            return;
        }
        if self.session.platform() != Some(platform) {
            debug!("Ignoring open failure of {platform}, it's no longer active");
            return;
        }

        let message = outcome
            .message
            .unwrap_or_else(|| format!("Could not open {}", platform.name()));
        warn!("Redirection to {platform} failed: {message}");
        self.redirect_problem = Some(message);
        self.publish();
    }
}

async fn read_marker(store: &impl UsageStore) -> Option<NaiveDate> {
    match store.get(LAST_RESET_KEY).await {
        Ok(Some(value)) => {
            let date = value.as_text().and_then(marker_to_date);
            if date.is_none() {
                warn!("Reset marker {value:?} is unreadable");
            }
            date
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Failed to read reset marker: {e:?}");
            None
        }
    }
}
