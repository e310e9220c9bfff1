//! A user's ownership and progress record for one game.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::platform::Platform;
use crate::types::{GameId, LibraryEntryId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LibraryEntry {
    pub id: LibraryEntryId,
    pub user_id: UserId,
    pub game_id: GameId,
    pub platform: Platform,
    pub status: LibraryStatus,
    /// Accumulated playtime in hours.
    pub playtime_hours: f64,
    pub last_played_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LibraryStatus {
    Unplayed,
    Playing,
    Backlog,
    Completed,
    Dropped,
}

impl LibraryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryStatus::Unplayed => "unplayed",
            LibraryStatus::Playing => "playing",
            LibraryStatus::Backlog => "backlog",
            LibraryStatus::Completed => "completed",
            LibraryStatus::Dropped => "dropped",
        }
    }
}

impl LibraryEntry {
    pub fn new(
        user_id: UserId,
        game_id: GameId,
        platform: Platform,
        status: LibraryStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LibraryEntryId::new(),
            user_id,
            game_id,
            platform,
            status,
            playtime_hours: 0.0,
            last_played_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies the side effects of a session starting.
    pub fn mark_playing(&mut self, now: DateTime<Utc>) {
        self.status = LibraryStatus::Playing;
        self.last_played_at = Some(now);
        self.updated_at = now;
    }

    /// Applies the side effects of a session ending.
    ///
    /// Only the transient `playing` status is reverted; a status the user set
    /// (completed, dropped, ...) is left as is.
    pub fn record_session_end(&mut self, duration_minutes: i32, now: DateTime<Utc>) {
        self.playtime_hours += minutes_to_hours(duration_minutes);
        if self.status == LibraryStatus::Playing {
            self.status = LibraryStatus::Backlog;
        }
        self.updated_at = now;
    }
}

pub fn minutes_to_hours(minutes: i32) -> f64 {
    f64::from(minutes.max(0)) / 60.0
}
