//! Start and End transitions shared by the reconciler and the stale sweep.

use chrono::{DateTime, Utc};

use crate::models::{LibraryEntry, Platform, PlaySession};
use crate::repositories::{SessionStore, StartOutcome};
use crate::services::events::{LibraryEvent, LibraryEvents};
use crate::services::reconciler::SyncError;
use crate::types::UserId;

#[derive(Debug, Clone, PartialEq)]
pub enum StartResult {
    Started(PlaySession),
    /// The game has no library entry for this user; nothing was written.
    NotInLibrary,
    /// A concurrent writer already opened a session for this user.
    AlreadyActive,
}

/// Opens a session for `external_game_id` if the user owns the game.
pub async fn start_session(
    store: &dyn SessionStore,
    events: &LibraryEvents,
    user_id: UserId,
    platform: Platform,
    external_game_id: &str,
    now: DateTime<Utc>,
) -> Result<StartResult, SyncError> {
    let entry: Option<LibraryEntry> = store
        .find_library_entry(user_id, platform, external_game_id)
        .await
        .map_err(|source| SyncError::store("find_library_entry", source))?;
    let Some(entry) = entry else {
        tracing::debug!(
            user_id = %user_id,
            external_game_id,
            "Game not in library; skipping session start"
        );
        return Ok(StartResult::NotInLibrary);
    };

    let session = PlaySession::start(&entry, external_game_id, now);
    match store
        .start_session(&session)
        .await
        .map_err(|source| SyncError::store("start_session", source))?
    {
        StartOutcome::Started(session) => {
            tracing::info!(
                user_id = %user_id,
                session_id = %session.id,
                external_game_id,
                "Play session started"
            );
            events.publish(LibraryEvent::SessionStarted {
                user_id,
                session_id: session.id,
                library_entry_id: session.library_entry_id,
                external_game_id: session.external_game_id.clone(),
            });
            Ok(StartResult::Started(session))
        }
        StartOutcome::AlreadyActive => {
            tracing::debug!(user_id = %user_id, "Session already active; start ignored");
            Ok(StartResult::AlreadyActive)
        }
    }
}

/// Closes `session` at `now`.
///
/// Returns `None` when the session had already been closed elsewhere.
pub async fn end_session(
    store: &dyn SessionStore,
    events: &LibraryEvents,
    session: &PlaySession,
    now: DateTime<Utc>,
) -> Result<Option<PlaySession>, SyncError> {
    let mut completed = session.clone();
    completed.complete(now);

    let closed = store
        .complete_session(&completed)
        .await
        .map_err(|source| SyncError::store("complete_session", source))?;

    match &closed {
        Some(closed) => {
            let duration_minutes = closed.duration_minutes.unwrap_or_default();
            tracing::info!(
                user_id = %closed.user_id,
                session_id = %closed.id,
                duration_minutes,
                "Play session ended"
            );
            events.publish(LibraryEvent::SessionEnded {
                user_id: closed.user_id,
                session_id: closed.id,
                library_entry_id: closed.library_entry_id,
                duration_minutes,
            });
        }
        None => {
            tracing::debug!(session_id = %session.id, "Session was already closed");
        }
    }
    Ok(closed)
}
