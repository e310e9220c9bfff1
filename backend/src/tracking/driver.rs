//! The polling driver.
//!
//! One tokio task per tracked user runs the reconciler on a schedule and
//! publishes a [`TrackingSnapshot`] through a watch channel. Only one poll is
//! ever in flight; a tick that fires while a poll is outstanding is dropped.
//! While the consumer is hidden no timers fire, and becoming visible again
//! triggers an immediate poll.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::{
    sync::{mpsc, watch},
    task::{JoinError, JoinHandle},
    time::{Instant, MissedTickBehavior},
};

use crate::error::AppError;
use crate::services::reconciler::{PresenceReconciler, SyncError, SyncReport};
use crate::tracking::{
    live::TrackingSnapshot,
    schedule::{PollState, TrackingConfig},
};
use crate::types::UserId;
use crate::utils::time::local_day_bounds;

/// Wall-clock source, injectable for tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The work one poll performs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionSync: Send + Sync {
    async fn sync(&self, now: DateTime<Utc>) -> Result<SyncReport, SyncError>;

    /// Minutes of completed sessions that count towards "today" at `now`.
    async fn completed_minutes_today(&self, now: DateTime<Utc>) -> Result<i64, AppError>;
}

/// [`SessionSync`] for one user backed by the presence reconciler.
pub struct UserSessionSync {
    reconciler: Arc<PresenceReconciler>,
    user_id: UserId,
    time_zone: Tz,
}

impl UserSessionSync {
    pub fn new(reconciler: Arc<PresenceReconciler>, user_id: UserId, time_zone: Tz) -> Self {
        Self {
            reconciler,
            user_id,
            time_zone,
        }
    }
}

#[async_trait]
impl SessionSync for UserSessionSync {
    async fn sync(&self, now: DateTime<Utc>) -> Result<SyncReport, SyncError> {
        self.reconciler.sync_user_at(self.user_id, now).await
    }

    async fn completed_minutes_today(&self, now: DateTime<Utc>) -> Result<i64, AppError> {
        let (from, to) = local_day_bounds(&self.time_zone, now);
        self.reconciler
            .store()
            .completed_minutes_between(self.user_id, from, to)
            .await
    }
}

#[derive(Debug)]
enum Command {
    SetVisible(bool),
    DismissRateLimit,
    SyncNow,
    Shutdown,
}

/// Consumer side of a running driver.
pub struct TrackingHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<TrackingSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl TrackingHandle {
    pub fn snapshot(&self) -> TrackingSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackingSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn set_visible(&self, visible: bool) {
        self.send(Command::SetVisible(visible));
    }

    /// Hides the rate-limit flag. The backoff window itself keeps running.
    pub fn dismiss_rate_limit(&self) {
        self.send(Command::DismissRateLimit);
    }

    pub fn sync_now(&self) {
        self.send(Command::SyncNow);
    }

    pub async fn shutdown(mut self) {
        self.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "Tracking task ended abnormally");
            }
        }
    }

    fn send(&self, command: Command) {
        // A disabled driver has no task listening; commands are ignored.
        let _ = self.commands.send(command);
    }
}

pub fn spawn(sync: Arc<dyn SessionSync>, config: TrackingConfig, enabled: bool) -> TrackingHandle {
    spawn_with_clock(sync, config, enabled, Arc::new(Utc::now))
}

pub fn spawn_with_clock(
    sync: Arc<dyn SessionSync>,
    config: TrackingConfig,
    enabled: bool,
    clock: Clock,
) -> TrackingHandle {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();

    if !enabled {
        let (_, snapshot_rx) = watch::channel(TrackingSnapshot::disabled());
        return TrackingHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
            task: None,
        };
    }

    let initial = TrackingSnapshot {
        enabled: true,
        visible: true,
        ..TrackingSnapshot::default()
    };
    let (snapshot_tx, snapshot_rx) = watch::channel(initial.clone());
    let driver = Driver {
        sync,
        clock,
        live_tick: config.live_tick,
        poll: PollState::new(config),
        snapshot: initial,
        snapshot_tx,
        next_poll: None,
    };
    let task = tokio::spawn(driver.run(commands_rx));

    TrackingHandle {
        commands: commands_tx,
        snapshot: snapshot_rx,
        task: Some(task),
    }
}

struct PollOutcome {
    started_at: DateTime<Utc>,
    result: Result<SyncReport, SyncError>,
    today: Result<i64, AppError>,
}

struct Driver {
    sync: Arc<dyn SessionSync>,
    clock: Clock,
    live_tick: std::time::Duration,
    poll: PollState,
    snapshot: TrackingSnapshot,
    snapshot_tx: watch::Sender<TrackingSnapshot>,
    next_poll: Option<Instant>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut in_flight: Option<JoinHandle<PollOutcome>> = None;
        let mut live = tokio::time::interval(self.live_tick);
        live.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.start_poll(&mut in_flight);

        loop {
            let visible = self.snapshot.visible;
            let poll_at = self.next_poll.filter(|_| visible && in_flight.is_none());
            let backoff_until = self.poll.backoff_until();
            let live_enabled = visible && self.snapshot.active_session.is_some();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::SetVisible(visible)) => self.set_visible(visible, &mut in_flight),
                    Some(Command::DismissRateLimit) => {
                        self.snapshot.is_rate_limited = false;
                        self.publish();
                    }
                    Some(Command::SyncNow) => self.start_poll(&mut in_flight),
                    Some(Command::Shutdown) | None => break,
                },
                _ = tokio::time::sleep_until(poll_at.unwrap_or_else(Instant::now)), if poll_at.is_some() => {
                    self.start_poll(&mut in_flight);
                }
                outcome = async {
                    match in_flight.as_mut() {
                        Some(task) => task.await,
                        None => std::future::pending().await,
                    }
                }, if in_flight.is_some() => {
                    in_flight = None;
                    self.finish_poll(outcome);
                }
                _ = live.tick(), if live_enabled => {
                    self.refresh_live();
                }
                _ = tokio::time::sleep_until(backoff_until.unwrap_or_else(Instant::now)), if backoff_until.is_some() => {
                    self.expire_backoff();
                }
            }
        }

        if let Some(task) = in_flight.take() {
            task.abort();
        }
        tracing::debug!("Tracking driver stopped");
    }

    fn start_poll(&mut self, in_flight: &mut Option<JoinHandle<PollOutcome>>) {
        if in_flight.is_some() {
            tracing::debug!("Poll already in flight; tick dropped");
            return;
        }

        let sync = Arc::clone(&self.sync);
        let started_at = (self.clock)();
        self.next_poll = None;
        *in_flight = Some(tokio::spawn(async move {
            let result = sync.sync(started_at).await;
            let today = sync.completed_minutes_today(started_at).await;
            PollOutcome {
                started_at,
                result,
                today,
            }
        }));
    }

    fn finish_poll(&mut self, outcome: Result<PollOutcome, JoinError>) {
        let now = Instant::now();

        match outcome {
            Ok(PollOutcome {
                started_at,
                result,
                today,
            }) => {
                self.apply_sync_result(result, started_at, now);
                match today {
                    Ok(minutes) => self.snapshot.today_completed_minutes = minutes,
                    Err(err) => {
                        tracing::warn!(error = %err, "Failed to load today's playtime");
                    }
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "Poll task failed");
                self.snapshot.last_error = Some(err.to_string());
            }
        }

        self.next_poll = Some(self.poll.next_poll_at(now));
        self.snapshot.mode = self.poll.mode(now);
        self.refresh_live();
        self.publish();
    }

    fn apply_sync_result(
        &mut self,
        result: Result<SyncReport, SyncError>,
        started_at: DateTime<Utc>,
        now: Instant,
    ) {
        match result {
            Ok(report) => {
                self.poll.clear_backoff();
                self.poll.record_session(report.active_session.is_some());
                self.snapshot.active_session = report.active_session;
                self.snapshot.is_rate_limited = false;
                self.snapshot.last_error = report.start_error;
                self.snapshot.last_synced_at = Some(started_at);
            }
            Err(SyncError::RateLimited { retry_after }) => {
                let until = self.poll.enter_backoff(now, retry_after);
                tracing::warn!(
                    backoff_secs = until.saturating_duration_since(now).as_secs(),
                    "Presence source rate limited; backing off"
                );
                self.snapshot.is_rate_limited = true;
                self.snapshot.last_error = Some(SyncError::RateLimited { retry_after }.to_string());
            }
            Err(err) => {
                tracing::warn!(error = %err, "Session sync failed; retrying next poll");
                self.snapshot.last_error = Some(err.to_string());
            }
        }
    }

    fn set_visible(&mut self, visible: bool, in_flight: &mut Option<JoinHandle<PollOutcome>>) {
        if self.snapshot.visible == visible {
            return;
        }
        self.snapshot.visible = visible;
        if visible {
            self.refresh_live();
            self.start_poll(in_flight);
        }
        self.publish();
    }

    fn expire_backoff(&mut self) {
        self.poll.clear_backoff();
        self.snapshot.is_rate_limited = false;
        self.snapshot.mode = self.poll.mode(Instant::now());
        self.publish();
    }

    fn refresh_live(&mut self) {
        self.snapshot.refresh_live((self.clock)());
        self.publish();
    }

    fn publish(&self) {
        let next = self.snapshot.clone();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LibraryEntry, LibraryStatus, Platform, PlaySession, PresenceSignal};
    use crate::repositories::MemorySessionStore;
    use crate::services::events::LibraryEvents;
    use crate::services::presence::{PresenceError, PresenceSource};
    use crate::services::reconciler::SyncAction;
    use crate::tracking::schedule::PollMode;
    use crate::types::GameId;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 18, 0, 0).unwrap()
    }

    /// Wall clock that follows tokio's (paused) clock.
    fn test_clock() -> Clock {
        let origin = Instant::now();
        Arc::new(move || {
            base_time() + chrono::Duration::from_std(origin.elapsed()).unwrap_or_else(|_| chrono::Duration::zero())
        })
    }

    fn open_session(started_at: DateTime<Utc>) -> PlaySession {
        let entry = LibraryEntry::new(
            UserId::new(),
            GameId::new(),
            Platform::Steam,
            LibraryStatus::Backlog,
            started_at,
        );
        PlaySession::start(&entry, "570", started_at)
    }

    fn report(active_session: Option<PlaySession>) -> SyncReport {
        SyncReport {
            action: SyncAction::None,
            active_session,
            ended_session: None,
            presence: PresenceSignal::idle(),
            start_error: None,
        }
    }

    /// Replays scripted results, then keeps returning the fallback.
    struct FakeSync {
        script: Mutex<VecDeque<Result<SyncReport, SyncError>>>,
        fallback: Option<PlaySession>,
        delay: Duration,
        completed_minutes: i64,
        calls: AtomicUsize,
    }

    impl FakeSync {
        fn new(script: Vec<Result<SyncReport, SyncError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                fallback: None,
                delay: Duration::ZERO,
                completed_minutes: 0,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SessionSync for FakeSync {
        async fn sync(&self, _now: DateTime<Utc>) -> Result<SyncReport, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(report(self.fallback.clone())))
        }

        async fn completed_minutes_today(&self, _now: DateTime<Utc>) -> Result<i64, AppError> {
            Ok(self.completed_minutes)
        }
    }

    fn start(sync: Arc<FakeSync>) -> TrackingHandle {
        spawn_with_clock(sync, TrackingConfig::default(), true, test_clock())
    }

    /// Lets spawned tasks run; paused time only advances once they idle.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    async fn advance(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_driver_never_polls() {
        let mut sync = MockSessionSync::new();
        sync.expect_sync().never();
        sync.expect_completed_minutes_today().never();

        let handle = spawn_with_clock(Arc::new(sync), TrackingConfig::default(), false, test_clock());
        advance(1_000).await;

        assert!(!handle.is_running());
        assert_eq!(handle.snapshot(), TrackingSnapshot::disabled());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn polls_immediately_then_on_idle_interval() {
        let sync = Arc::new(FakeSync::new(vec![]));
        let handle = start(sync.clone());

        settle().await;
        assert_eq!(sync.calls(), 1);
        assert_eq!(handle.snapshot().mode, PollMode::Idle);

        advance(118).await;
        assert_eq!(sync.calls(), 1);
        advance(3).await;
        assert_eq!(sync.calls(), 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn open_session_switches_to_active_interval_and_live_minutes() {
        let mut fake = FakeSync::new(vec![]);
        fake.fallback = Some(open_session(base_time()));
        fake.completed_minutes = 30;
        let sync = Arc::new(fake);
        let handle = start(sync.clone());

        settle().await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.mode, PollMode::Active);
        assert!(snapshot.active_session.is_some());
        assert_eq!(snapshot.today_playtime_minutes, 30);

        advance(58).await;
        assert_eq!(sync.calls(), 1);
        advance(3).await;
        assert_eq!(sync.calls(), 2);

        advance(90).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.session_duration_minutes, 2);
        assert_eq!(snapshot.today_playtime_minutes, 32);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_backs_off_and_recovers() {
        let sync = Arc::new(FakeSync::new(vec![Err(SyncError::RateLimited {
            retry_after: None,
        })]));
        let handle = start(sync.clone());

        settle().await;
        let snapshot = handle.snapshot();
        assert!(snapshot.is_rate_limited);
        assert_eq!(snapshot.mode, PollMode::Backoff);
        assert!(snapshot.last_error.is_some());

        advance(298).await;
        assert_eq!(sync.calls(), 1);
        assert!(handle.snapshot().is_rate_limited);

        advance(3).await;
        assert_eq!(sync.calls(), 2);
        let snapshot = handle.snapshot();
        assert!(!snapshot.is_rate_limited);
        assert_eq!(snapshot.mode, PollMode::Idle);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn dismiss_clears_flag_but_keeps_backoff() {
        let sync = Arc::new(FakeSync::new(vec![Err(SyncError::RateLimited {
            retry_after: None,
        })]));
        let handle = start(sync.clone());
        settle().await;

        handle.dismiss_rate_limit();
        settle().await;
        let snapshot = handle.snapshot();
        assert!(!snapshot.is_rate_limited);
        assert_eq!(snapshot.mode, PollMode::Backoff);

        advance(150).await;
        assert_eq!(sync.calls(), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_driver_pauses_until_visible_again() {
        let sync = Arc::new(FakeSync::new(vec![]));
        let handle = start(sync.clone());
        settle().await;
        assert_eq!(sync.calls(), 1);

        handle.set_visible(false);
        advance(600).await;
        assert_eq!(sync.calls(), 1);
        assert!(!handle.snapshot().visible);

        handle.set_visible(true);
        settle().await;
        assert_eq!(sync.calls(), 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_during_in_flight_poll_are_dropped() {
        let mut fake = FakeSync::new(vec![]);
        fake.delay = Duration::from_secs(10);
        let sync = Arc::new(fake);
        let handle = start(sync.clone());

        settle().await;
        handle.sync_now();
        handle.sync_now();
        handle.sync_now();
        advance(20).await;

        assert_eq!(sync.calls(), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn errors_are_reported_and_polling_continues() {
        let sync = Arc::new(FakeSync::new(vec![Err(SyncError::Upstream(
            "connection refused".into(),
        ))]));
        let handle = start(sync.clone());

        settle().await;
        let snapshot = handle.snapshot();
        assert!(snapshot.last_error.is_some());
        assert!(!snapshot.is_rate_limited);
        assert!(snapshot.last_synced_at.is_none());

        advance(121).await;
        assert_eq!(sync.calls(), 2);
        let snapshot = handle.snapshot();
        assert!(snapshot.last_error.is_none());
        assert!(snapshot.last_synced_at.is_some());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn ending_session_stops_live_ticker_and_resets_duration() {
        let session = open_session(base_time());
        let sync = Arc::new(FakeSync::new(vec![
            Ok(report(Some(session))),
            Ok(report(None)),
        ]));
        let handle = start(sync.clone());
        settle().await;
        advance(61).await;

        let snapshot = handle.snapshot();
        assert_eq!(sync.calls(), 2);
        assert!(snapshot.active_session.is_none());
        assert_eq!(snapshot.session_duration_minutes, 0);
        assert_eq!(snapshot.mode, PollMode::Idle);
        handle.shutdown().await;
    }

    /// Presence source that replays signals in order, then reports idle.
    struct QueuedPresence(Mutex<VecDeque<PresenceSignal>>);

    #[async_trait]
    impl PresenceSource for QueuedPresence {
        fn platform(&self) -> Platform {
            Platform::Steam
        }

        async fn fetch_presence(&self, _: &str) -> Result<PresenceSignal, PresenceError> {
            Ok(self.0.lock().unwrap().pop_front().unwrap_or_default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_start_after_switch_clears_active_session() {
        let store = Arc::new(MemorySessionStore::new());
        let user = UserId::new();
        store.link_account(user, Platform::Steam, "76561197960287930");
        let dota = store.add_game(Platform::Steam, "570", "Dota 2");
        let cs = store.add_game(Platform::Steam, "730", "Counter-Strike 2");
        store.add_library_entry(user, &dota, LibraryStatus::Backlog);
        store.add_library_entry(user, &cs, LibraryStatus::Backlog);

        let presence = QueuedPresence(Mutex::new(VecDeque::from([
            PresenceSignal::playing("570", None),
            PresenceSignal::playing("730", None),
            PresenceSignal::playing("730", None),
        ])));
        let reconciler = Arc::new(PresenceReconciler::new(
            store.clone(),
            Arc::new(presence),
            LibraryEvents::default(),
        ));
        let sync = Arc::new(UserSessionSync::new(reconciler, user, chrono_tz::UTC));
        let handle = spawn_with_clock(sync, TrackingConfig::default(), true, test_clock());

        settle().await;
        let snapshot = handle.snapshot();
        assert_eq!(
            snapshot.active_session.map(|s| s.external_game_id),
            Some("570".to_string())
        );

        store.fail_next_starts(1);
        handle.sync_now();
        settle().await;

        let snapshot = handle.snapshot();
        assert!(store.active_sessions_for(user).is_empty());
        assert!(snapshot.active_session.is_none());
        assert!(snapshot.last_error.is_some());
        assert_eq!(snapshot.mode, PollMode::Idle);

        advance(30).await;
        assert_eq!(handle.snapshot().session_duration_minutes, 0);

        // The next poll retries the start.
        advance(100).await;
        let snapshot = handle.snapshot();
        assert_eq!(
            snapshot.active_session.map(|s| s.external_game_id),
            Some("730".to_string())
        );
        assert!(snapshot.last_error.is_none());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_poll_interval_keeps_driver_running() {
        let sync = Arc::new(FakeSync::new(vec![]));
        let config = TrackingConfig {
            idle_interval: Duration::from_secs(u64::MAX),
            ..TrackingConfig::default()
        };
        let handle = spawn_with_clock(sync.clone(), config, true, test_clock());

        settle().await;
        assert_eq!(sync.calls(), 1);
        advance(60).await;
        assert!(handle.is_running());
        assert_eq!(sync.calls(), 1);
        handle.shutdown().await;
    }
}
