//! Stale session sweep.
//!
//! Sessions left open by a crashed client would otherwise accumulate
//! playtime forever. The sweep closes every session open longer than the
//! threshold, at sweep time, with the regular End transition.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::repositories::SessionStore;
use crate::services::events::LibraryEvents;
use crate::services::session_lifecycle::end_session;
use crate::types::SessionId;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub closed: Vec<SessionId>,
    pub failed: Vec<SessionId>,
}

pub async fn sweep_stale_sessions(
    store: &dyn SessionStore,
    events: &LibraryEvents,
    now: DateTime<Utc>,
    threshold: Duration,
) -> Result<SweepReport, AppError> {
    let cutoff = now - threshold;
    let stale = store.find_stale_sessions(cutoff).await?;
    let mut report = SweepReport::default();

    for session in stale {
        match end_session(store, events, &session, now).await {
            Ok(Some(closed)) => report.closed.push(closed.id),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(
                    session_id = %session.id,
                    user_id = %session.user_id,
                    error = %err,
                    "Failed to close stale session"
                );
                report.failed.push(session.id);
            }
        }
    }

    if !report.closed.is_empty() || !report.failed.is_empty() {
        tracing::info!(
            closed = report.closed.len(),
            failed = report.failed.len(),
            cutoff = %cutoff,
            "Stale session sweep finished"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LibraryStatus, Platform, PlaySession, SessionStatus};
    use crate::repositories::MemorySessionStore;
    use crate::types::UserId;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn sweep_closes_stale_sessions_exactly_once() {
        let store = MemorySessionStore::new();
        let events = LibraryEvents::default();
        let stale_user = UserId::new();
        let fresh_user = UserId::new();
        let game = store.add_game(Platform::Steam, "570", "Dota 2");
        let stale_entry = store.add_library_entry(stale_user, &game, LibraryStatus::Playing);
        let fresh_entry = store.add_library_entry(fresh_user, &game, LibraryStatus::Playing);

        let stale = PlaySession::start(&stale_entry, "570", now() - Duration::hours(7));
        let fresh = PlaySession::start(&fresh_entry, "570", now() - Duration::hours(1));
        store.insert_session(stale.clone());
        store.insert_session(fresh.clone());

        let report = sweep_stale_sessions(&store, &events, now(), Duration::hours(6))
            .await
            .unwrap();
        assert_eq!(report.closed, vec![stale.id]);
        assert!(report.failed.is_empty());

        let closed = store
            .sessions()
            .into_iter()
            .find(|s| s.id == stale.id)
            .unwrap();
        assert_eq!(closed.status, SessionStatus::Completed);
        assert_eq!(closed.duration_minutes, Some(7 * 60));
        assert_eq!(
            store.library_entry(stale_entry.id).unwrap().status,
            LibraryStatus::Backlog
        );
        assert_eq!(store.active_sessions_for(fresh_user).len(), 1);

        let again = sweep_stale_sessions(&store, &events, now(), Duration::hours(6))
            .await
            .unwrap();
        assert!(again.closed.is_empty());
        let hours = store.library_entry(stale_entry.id).unwrap().playtime_hours;
        assert!((hours - 7.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn sweep_reports_failures_and_continues() {
        let store = MemorySessionStore::new();
        let events = LibraryEvents::default();
        let game = store.add_game(Platform::Steam, "730", "Counter-Strike 2");
        let first = store.add_library_entry(UserId::new(), &game, LibraryStatus::Playing);
        let second = store.add_library_entry(UserId::new(), &game, LibraryStatus::Playing);
        let older = PlaySession::start(&first, "730", now() - Duration::hours(10));
        let newer = PlaySession::start(&second, "730", now() - Duration::hours(8));
        store.insert_session(older.clone());
        store.insert_session(newer.clone());
        store.fail_next_completes(1);

        let report = sweep_stale_sessions(&store, &events, now(), Duration::hours(6))
            .await
            .unwrap();

        assert_eq!(report.failed, vec![older.id]);
        assert_eq!(report.closed, vec![newer.id]);
    }
}
