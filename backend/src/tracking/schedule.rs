//! Poll scheduling: which interval applies and when backoff ends.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Upper bound on any single wait, whatever the config or upstream says.
pub const MAX_POLL_WAIT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingConfig {
    /// Poll interval while no session is open.
    pub idle_interval: Duration,
    /// Poll interval while a session is open.
    pub active_interval: Duration,
    /// Minimum wait after the presence source rate limits us.
    pub backoff_interval: Duration,
    /// Refresh period of the live elapsed-time values.
    pub live_tick: Duration,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(120),
            active_interval: Duration::from_secs(60),
            backoff_interval: Duration::from_secs(300),
            live_tick: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollMode {
    #[default]
    Idle,
    Active,
    Backoff,
}

#[derive(Debug, Clone)]
pub struct PollState {
    config: TrackingConfig,
    has_session: bool,
    backoff_until: Option<Instant>,
}

impl PollState {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            has_session: false,
            backoff_until: None,
        }
    }

    pub fn mode(&self, now: Instant) -> PollMode {
        if self.in_backoff(now) {
            PollMode::Backoff
        } else if self.has_session {
            PollMode::Active
        } else {
            PollMode::Idle
        }
    }

    pub fn in_backoff(&self, now: Instant) -> bool {
        self.backoff_until.is_some_and(|until| now < until)
    }

    /// Delay from `now` until the next poll is due, at most [`MAX_POLL_WAIT`].
    pub fn interval(&self, now: Instant) -> Duration {
        let interval = match (self.mode(now), self.backoff_until) {
            (PollMode::Backoff, Some(until)) => until.saturating_duration_since(now),
            (PollMode::Active, _) => self.config.active_interval,
            _ => self.config.idle_interval,
        };
        interval.min(MAX_POLL_WAIT)
    }

    pub fn next_poll_at(&self, now: Instant) -> Instant {
        now + self.interval(now)
    }

    pub fn record_session(&mut self, has_session: bool) {
        self.has_session = has_session;
    }

    /// Starts a backoff window of at least the configured length.
    pub fn enter_backoff(&mut self, now: Instant, retry_after: Option<Duration>) -> Instant {
        let window = retry_after
            .map(|hint| hint.max(self.config.backoff_interval))
            .unwrap_or(self.config.backoff_interval)
            .min(MAX_POLL_WAIT);
        let until = now + window;
        self.backoff_until = Some(until);
        until
    }

    pub fn backoff_until(&self) -> Option<Instant> {
        self.backoff_until
    }

    pub fn clear_backoff(&mut self) {
        self.backoff_until = None;
    }
}
