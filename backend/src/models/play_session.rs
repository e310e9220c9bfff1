//! Models that capture continuous play intervals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::{library_entry::LibraryEntry, platform::Platform};
use crate::types::{GameId, LibraryEntryId, SessionId, UserId};
use crate::utils::time::elapsed_minutes;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
/// Persistent representation of one play interval for one user on one game.
pub struct PlaySession {
    pub id: SessionId,
    pub user_id: UserId,
    pub game_id: GameId,
    pub library_entry_id: LibraryEntryId,
    pub platform: Platform,
    /// Platform-specific game identifier (e.g. a Steam app id).
    pub external_game_id: String,
    pub started_at: DateTime<Utc>,
    /// `None` while the session is open.
    pub ended_at: Option<DateTime<Utc>>,
    /// Filled when the session is closed.
    pub duration_minutes: Option<i32>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }
}

impl PlaySession {
    /// Opens a new session for the game behind `entry`, starting at `now`.
    pub fn start(entry: &LibraryEntry, external_game_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            user_id: entry.user_id,
            game_id: entry.game_id,
            library_entry_id: entry.id,
            platform: entry.platform,
            external_game_id: external_game_id.to_string(),
            started_at: now,
            ended_at: None,
            duration_minutes: None,
            status: SessionStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the session as completed at `now` and computes its duration.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        let minutes = elapsed_minutes(self.started_at, now);
        self.ended_at = Some(now);
        self.duration_minutes = Some(i32::try_from(minutes).unwrap_or(i32::MAX));
        self.status = SessionStatus::Completed;
        self.updated_at = now;
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Live elapsed minutes for an open session.
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> i64 {
        elapsed_minutes(self.started_at, self.ended_at.unwrap_or(now))
    }

    pub fn matches_game(&self, external_game_id: &str) -> bool {
        self.external_game_id == external_game_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// API-friendly representation of a play session.
pub struct PlaySessionResponse {
    pub id: SessionId,
    pub game_id: GameId,
    pub platform: Platform,
    pub external_game_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub status: SessionStatus,
}

impl From<PlaySession> for PlaySessionResponse {
    fn from(session: PlaySession) -> Self {
        PlaySessionResponse {
            id: session.id,
            game_id: session.game_id,
            platform: session.platform,
            external_game_id: session.external_game_id,
            started_at: session.started_at,
            ended_at: session.ended_at,
            duration_minutes: session.duration_minutes,
            status: session.status,
        }
    }
}
