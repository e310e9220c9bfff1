//! Session store trait for dependency injection and testing.
//!
//! The reconciler, the stale sweep and the HTTP handlers only talk to
//! [`SessionStore`]. [`PgSessionStore`] is the production implementation;
//! tests use the mockall-generated `MockSessionStore` or the in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::{LibraryEntry, LinkedAccount, Platform, PlaySession};
use crate::repositories::{
    library_entry, linked_account, play_session,
    transaction::{begin_transaction, commit_transaction, is_unique_violation, rollback_transaction},
};
use crate::types::UserId;

/// Result of trying to open a session.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started(PlaySession),
    /// Another writer already holds the user's single open session.
    AlreadyActive,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_linked_account(
        &self,
        user_id: UserId,
        platform: Platform,
    ) -> Result<Option<LinkedAccount>, AppError>;

    /// The user's open session, if any.
    async fn find_active_session(&self, user_id: UserId) -> Result<Option<PlaySession>, AppError>;

    async fn find_library_entry(
        &self,
        user_id: UserId,
        platform: Platform,
        external_game_id: &str,
    ) -> Result<Option<LibraryEntry>, AppError>;

    /// Inserts an `active` session and marks its library entry as playing.
    async fn start_session(&self, session: &PlaySession) -> Result<StartOutcome, AppError>;

    /// Persists a session already completed in memory and adds its playtime
    /// to the library entry. Returns `None` if the session was not open.
    async fn complete_session(&self, session: &PlaySession)
        -> Result<Option<PlaySession>, AppError>;

    /// Sum of completed session minutes for sessions started in `[from, to)`.
    async fn completed_minutes_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, AppError>;

    /// Open sessions that started before `started_before`.
    async fn find_stale_sessions(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<PlaySession>, AppError>;
}

/// Postgres-backed [`SessionStore`].
#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn find_linked_account(
        &self,
        user_id: UserId,
        platform: Platform,
    ) -> Result<Option<LinkedAccount>, AppError> {
        Ok(linked_account::find_linked_account(&self.pool, user_id, platform).await?)
    }

    async fn find_active_session(&self, user_id: UserId) -> Result<Option<PlaySession>, AppError> {
        Ok(play_session::find_active_session_for_user(&self.pool, user_id).await?)
    }

    async fn find_library_entry(
        &self,
        user_id: UserId,
        platform: Platform,
        external_game_id: &str,
    ) -> Result<Option<LibraryEntry>, AppError> {
        Ok(
            library_entry::find_by_external_game(&self.pool, user_id, platform, external_game_id)
                .await?,
        )
    }

    async fn start_session(&self, session: &PlaySession) -> Result<StartOutcome, AppError> {
        let mut tx = begin_transaction(&self.pool).await?;

        let inserted = match play_session::insert_session(&mut tx, session).await {
            Ok(row) => row,
            Err(err) if is_unique_violation(&err) => {
                rollback_transaction(tx).await?;
                return Ok(StartOutcome::AlreadyActive);
            }
            Err(err) => return Err(err.into()),
        };

        library_entry::mark_playing(&mut tx, session.library_entry_id, session.started_at)
            .await?;
        commit_transaction(tx).await?;

        Ok(StartOutcome::Started(inserted))
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

        let mut tx = begin_transaction(&self.pool).await?;
        let Some(closed) = play_session::close_session(&mut tx, session).await? else {
            rollback_transaction(tx).await?;
            return Ok(None);
        };

        library_entry::record_session_end(
            &mut tx,
            closed.library_entry_id,
            duration_minutes,
            ended_at,
        )
        .await?;
        commit_transaction(tx).await?;

        Ok(Some(closed))
    }

    async fn completed_minutes_between(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        Ok(play_session::completed_minutes_between(&self.pool, user_id, from, to).await?)
    }

    async fn find_stale_sessions(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<PlaySession>, AppError> {
        Ok(play_session::list_stale_sessions(&self.pool, started_before).await?)
    }
}
