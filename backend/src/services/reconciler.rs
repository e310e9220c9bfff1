//! Presence reconciliation.
//!
//! Each call compares what the platform says the user is doing with the
//! session stored for them and applies at most one corrective transition:
//!
//! | presence    | open session        | action              |
//! |-------------|---------------------|---------------------|
//! | not playing | none                | nothing             |
//! | not playing | any                 | end it              |
//! | playing     | none                | start one           |
//! | playing     | same game           | nothing             |
//! | playing     | different game      | end old, start new  |
//!
//! The reconciler keeps no state between calls.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::models::{LinkedAccount, Platform, PlaySession, PresenceSignal};
use crate::repositories::SessionStore;
use crate::services::events::LibraryEvents;
use crate::services::presence::{PresenceError, PresenceSource};
use crate::services::session_lifecycle::{end_session, start_session, StartResult};
use crate::types::UserId;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("presence source is rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("presence source unavailable: {0}")]
    Upstream(String),
    #[error("user {user_id} has no linked {platform} account")]
    NotLinked { user_id: UserId, platform: Platform },
    #[error("session store failed during {operation}: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: AppError,
    },
}

impl SyncError {
    pub(crate) fn store(operation: &'static str, source: AppError) -> Self {
        SyncError::Store { operation, source }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SyncError::RateLimited { .. })
    }
}

impl From<PresenceError> for SyncError {
    fn from(err: PresenceError) -> Self {
        match err {
            PresenceError::RateLimited { retry_after } => SyncError::RateLimited { retry_after },
            PresenceError::Unavailable(msg) => SyncError::Upstream(msg),
            PresenceError::InvalidResponse(msg) => {
                SyncError::Upstream(format!("invalid response: {}", msg))
            }
        }
    }
}

/// The corrective step implied by a presence signal and the open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Noop,
    Start(String),
    End,
    Switch(String),
}

pub fn plan(presence: &PresenceSignal, open_session: Option<&PlaySession>) -> Transition {
    match (presence.playing_game_id(), open_session) {
        (None, None) => Transition::Noop,
        (None, Some(_)) => Transition::End,
        (Some(game_id), None) => Transition::Start(game_id.to_string()),
        (Some(game_id), Some(session)) if session.matches_game(game_id) => Transition::Noop,
        (Some(game_id), Some(_)) => Transition::Switch(game_id.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncAction {
    None,
    Started,
    Ended,
    Switched,
    SkippedNotInLibrary {
        external_game_id: String,
        game_name: Option<String>,
    },
    AlreadyActive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub action: SyncAction,
    /// The user's open session after this call.
    pub active_session: Option<PlaySession>,
    /// The session this call closed, if any.
    pub ended_session: Option<PlaySession>,
    pub presence: PresenceSignal,
    /// Set when a switch closed the old session but could not open the new one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_error: Option<String>,
}

pub struct PresenceReconciler {
    store: Arc<dyn SessionStore>,
    presence: Arc<dyn PresenceSource>,
    events: LibraryEvents,
}

impl PresenceReconciler {
    pub fn new(
        store: Arc<dyn SessionStore>,
        presence: Arc<dyn PresenceSource>,
        events: LibraryEvents,
    ) -> Self {
        Self {
            store,
            presence,
            events,
        }
    }

    pub fn platform(&self) -> Platform {
        self.presence.platform()
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn events(&self) -> &LibraryEvents {
        &self.events
    }

    pub async fn sync_user(&self, user_id: UserId) -> Result<SyncReport, SyncError> {
        self.sync_user_at(user_id, Utc::now()).await
    }

    pub async fn sync_user_at(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, SyncError> {
        let account = self.linked_account(user_id).await?;
        self.sync_account_at(&account, now).await
    }

    /// Looks up the account the presence source needs for `user_id`.
    pub async fn linked_account(&self, user_id: UserId) -> Result<LinkedAccount, SyncError> {
        let platform = self.platform();
        self.store
            .find_linked_account(user_id, platform)
            .await
            .map_err(|source| SyncError::store("find_linked_account", source))?
            .ok_or(SyncError::NotLinked { user_id, platform })
    }

    pub async fn sync_account_at(
        &self,
        account: &LinkedAccount,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, SyncError> {
        let user_id = account.user_id;

        // Presence first: a failed fetch must not touch the store.
        let presence = match self.presence.fetch_presence(&account.platform_user_id).await {
            Ok(presence) => presence,
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "Presence fetch failed");
                return Err(err.into());
            }
        };

        let open_session = self
            .store
            .find_active_session(user_id)
            .await
            .map_err(|source| SyncError::store("find_active_session", source))?;

        let transition = plan(&presence, open_session.as_ref());
        tracing::debug!(user_id = %user_id, ?transition, "Reconciling presence");

        let store = self.store.as_ref();
        match (transition, open_session) {
            (Transition::Noop, open_session) => Ok(SyncReport {
                action: SyncAction::None,
                active_session: open_session,
                ended_session: None,
                presence,
                start_error: None,
            }),
            (Transition::End, Some(session)) => {
                let ended = end_session(store, &self.events, &session, now).await?;
                Ok(SyncReport {
                    action: SyncAction::Ended,
                    active_session: None,
                    ended_session: ended,
                    presence,
                    start_error: None,
                })
            }
            (Transition::Start(game_id), _) => {
                self.start(user_id, &game_id, None, false, presence, now).await
            }
            (Transition::Switch(game_id), Some(session)) => {
                // End must land before Start; if it fails the old session stays open.
                let ended = end_session(store, &self.events, &session, now).await?;
                match self
                    .start(user_id, &game_id, ended.clone(), true, presence.clone(), now)
                    .await
                {
                    Ok(report) => Ok(report),
                    // The End is committed, so report it with no open session.
                    Err(err) => {
                        tracing::warn!(
                            user_id = %user_id,
                            external_game_id = %game_id,
                            error = %err,
                            "Old session closed but new session failed to start"
                        );
                        Ok(SyncReport {
                            action: SyncAction::Ended,
                            active_session: None,
                            ended_session: ended,
                            presence,
                            start_error: Some(err.to_string()),
                        })
                    }
                }
            }
            (Transition::End | Transition::Switch(_), None) => Ok(SyncReport {
                action: SyncAction::None,
                active_session: None,
                ended_session: None,
                presence,
                start_error: None,
            }),
        }
    }

    async fn start(
        &self,
        user_id: UserId,
        game_id: &str,
        ended_session: Option<PlaySession>,
        switched: bool,
        presence: PresenceSignal,
        now: DateTime<Utc>,
    ) -> Result<SyncReport, SyncError> {
        let result = start_session(
            self.store.as_ref(),
            &self.events,
            user_id,
            self.platform(),
            game_id,
            now,
        )
        .await?;

        let (action, active_session) = match result {
            StartResult::Started(session) if switched => (SyncAction::Switched, Some(session)),
            StartResult::Started(session) => (SyncAction::Started, Some(session)),
            StartResult::NotInLibrary => (
                SyncAction::SkippedNotInLibrary {
                    external_game_id: game_id.to_string(),
                    game_name: presence.game_name.clone(),
                },
                None,
            ),
            StartResult::AlreadyActive => {
                let current = self
                    .store
                    .find_active_session(user_id)
                    .await
                    .map_err(|source| SyncError::store("find_active_session", source))?;
                (SyncAction::AlreadyActive, current)
            }
        };

        Ok(SyncReport {
            action,
            active_session,
            ended_session,
            presence,
            start_error: None,
        })
    }
}
