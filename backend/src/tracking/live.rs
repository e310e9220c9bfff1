use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::PlaySession;
use crate::tracking::schedule::PollMode;

/// What a consumer of the polling driver sees.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackingSnapshot {
    pub enabled: bool,
    pub visible: bool,
    pub mode: PollMode,
    pub active_session: Option<PlaySession>,
    /// Live minutes elapsed in the open session.
    pub session_duration_minutes: i64,
    /// Completed-session minutes for today, as last read from the store.
    pub today_completed_minutes: i64,
    /// `today_completed_minutes` plus the live session minutes.
    pub today_playtime_minutes: i64,
    pub is_rate_limited: bool,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl TrackingSnapshot {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Recomputes the derived minute counters for `now`.
    pub fn refresh_live(&mut self, now: DateTime<Utc>) {
        self.session_duration_minutes = self
            .active_session
            .as_ref()
            .map(|session| session.elapsed_minutes(now))
            .unwrap_or(0);
        self.today_playtime_minutes = self.today_completed_minutes + self.session_duration_minutes;
    }
}
