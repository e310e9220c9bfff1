//! In-memory [`SessionStore`] used by unit tests and local tooling.
//!
//! It mirrors the Postgres store's guarantees: one open session per user,
//! and session/library writes applied together. Failures can be injected to
//! exercise the reconciler's partial-failure paths.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppError;
use crate::models::{
    Game, LibraryEntry, LibraryStatus, LinkedAccount, Platform, PlaySession, SessionStatus,
};
use crate::repositories::session_store::{SessionStore, StartOutcome};
use crate::types::{LibraryEntryId, UserId};

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    accounts: Vec<LinkedAccount>,
    games: Vec<Game>,
    entries: Vec<LibraryEntry>,
    sessions: Vec<PlaySession>,
    pending_start_failures: usize,
    pending_complete_failures: usize,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn link_account(
        &self,
        user_id: UserId,
        platform: Platform,
        platform_user_id: &str,
    ) -> LinkedAccount {
        let account = LinkedAccount::new(user_id, platform, platform_user_id);
        self.state().accounts.push(account.clone());
        account
    }

    pub fn add_game(&self, platform: Platform, external_game_id: &str, title: &str) -> Game {
        let game = Game::new(platform, external_game_id, title);
        self.state().games.push(game.clone());
        game
    }

    pub fn add_library_entry(
        &self,
        user_id: UserId,
        game: &Game,
        status: LibraryStatus,
    ) -> LibraryEntry {
        let entry = LibraryEntry::new(user_id, game.id, game.platform, status, Utc::now());
        self.state().entries.push(entry.clone());
        entry
    }

    /// Seeds a session row as-is, bypassing the one-open-session check.
    pub fn insert_session(&self, session: PlaySession) {
        self.state().sessions.push(session);
    }

    pub fn sessions(&self) -> Vec<PlaySession> {
        self.state().sessions.clone()
    }

    pub fn active_sessions_for(&self, user_id: UserId) -> Vec<PlaySession> {
        self.state()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_active())
            .cloned()
            .collect()
    }

    pub fn library_entry(&self, id: LibraryEntryId) -> Option<LibraryEntry> {
        self.state().entries.iter().find(|e| e.id == id).cloned()
    }

    /// The next `count` calls to `start_session` fail with a store error.
    pub fn fail_next_starts(&self, count: usize) {
        self.state().pending_start_failures = count;
    }

    /// The next `count` calls to `complete_session` fail with a store error.
    pub fn fail_next_completes(&self, count: usize) {
        self.state().pending_complete_failures = count;
    }
}

fn injected_failure(operation: &str) -> AppError {
    AppError::InternalServerError(anyhow::anyhow!("injected {} failure", operation))
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn find_linked_account(
        &self,
        user_id: UserId,
        platform: Platform,
    ) -> Result<Option<LinkedAccount>, AppError> {
        Ok(self
            .state()
            .accounts
            .iter()
            .find(|a| a.user_id == user_id && a.platform == platform)
            .cloned())
    }

    async fn find_active_session(&self, user_id: UserId) -> Result<Option<PlaySession>, AppError> {
        Ok(self
            .state()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_active())
            .max_by_key(|s| s.started_at)
            .cloned())
    }

    async fn find_library_entry(
        &self,
        user_id: UserId,
        platform: Platform,
        external_game_id: &str,
    ) -> Result<Option<LibraryEntry>, AppError> {
        let state = self.state();
        let Some(game) = state
            .games
            .iter()
            .find(|g| g.platform == platform && g.external_game_id == external_game_id)
        else {
            return Ok(None);
        };
        Ok(state
            .entries
            .iter()
            .find(|e| e.user_id == user_id && e.game_id == game.id)
            .cloned())
    }

    async fn start_session(&self, session: &PlaySession) -> Result<StartOutcome, AppError> {
        let mut state = self.state();
        if state.pending_start_failures > 0 {
            state.pending_start_failures -= 1;
            return Err(injected_failure("start"));
        }
        if state
            .sessions
            .iter()
            .any(|s| s.user_id == session.user_id && s.is_active())
        {
            return Ok(StartOutcome::AlreadyActive);
        }

        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.id == session.library_entry_id)
            .ok_or_else(|| AppError::NotFound("Library entry not found".into()))?;
        entry.mark_playing(session.started_at);
        state.sessions.push(session.clone());

        Ok(StartOutcome::Started(session.clone()))
    }

    async fn complete_session(
        &self,
        session: &PlaySession,
    ) -> Result<Option<PlaySession>, AppError> {
        let (Some(ended_at), Some(duration_minutes)) = (session.ended_at, session.duration_minutes)
        else {
            return Err(AppError::BadRequest(format!(
                "session {} has not been completed",
                session.id
            )));
        };

        let mut state = self.state();
        if state.pending_complete_failures > 0 {
            state.pending_complete_failures -= 1;
            return Err(injected_failure("complete"));
        }

        let Some(stored) = state
            .sessions
            .iter_mut()
            .find(|s| s.id == session.id && s.status == SessionStatus::Active)
        else {
            return Ok(None);
        };
        stored.ended_at = Some(ended_at);
        stored.duration_minutes = Some(duration_minutes);
        stored.status = SessionStatus::Completed;
        stored.updated_at = session.updated_at;
        let closed = stored.clone();

        if let Some(entry) = state
            .entries
            .iter_mut()
            .find(|e| e.id == closed.library_entry_id)
        {
            entry.record_session_end(duration_minutes, ended_at);
        }

        Ok(Some(closed))
    }

    async fn completed_minutes_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        Ok(self
            .state()
            .sessions
            .iter()
            .filter(|s| {
                s.user_id == user_id
                    && s.status == SessionStatus::Completed
                    && s.started_at >= from
                    && s.started_at < to
            })
            .filter_map(|s| s.duration_minutes)
            .map(i64::from)
            .sum())
    }

    async fn find_stale_sessions(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<PlaySession>, AppError> {
        let mut stale: Vec<PlaySession> = self
            .state()
            .sessions
            .iter()
            .filter(|s| s.is_active() && s.started_at < started_before)
            .cloned()
            .collect();
        stale.sort_by_key(|s| s.started_at);
        Ok(stale)
    }
}
