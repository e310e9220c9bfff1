//! Play session queries.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::models::play_session::PlaySession;
use crate::types::UserId;

const SELECT_COLUMNS: &str = "id, user_id, game_id, library_entry_id, platform, external_game_id, \
     started_at, ended_at, duration_minutes, status, created_at, updated_at";

pub async fn find_active_session_for_user(
    pool: &PgPool,
    user_id: UserId,
) -> Result<Option<PlaySession>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM play_sessions \
         WHERE user_id = $1 AND status = 'active' \
         ORDER BY started_at DESC LIMIT 1",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, PlaySession>(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn insert_session(
    conn: &mut PgConnection,
    session: &PlaySession,
) -> Result<PlaySession, sqlx::Error> {
    let query = format!(
        "INSERT INTO play_sessions \
            (id, user_id, game_id, library_entry_id, platform, external_game_id, \
             started_at, ended_at, duration_minutes, status, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
         RETURNING {}",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, PlaySession>(&query)
        .bind(session.id)
        .bind(session.user_id)
        .bind(session.game_id)
        .bind(session.library_entry_id)
        .bind(session.platform.as_str())
        .bind(&session.external_game_id)
        .bind(session.started_at)
        .bind(session.ended_at)
        .bind(session.duration_minutes)
        .bind(session.status.as_str())
        .bind(session.created_at)
        .bind(session.updated_at)
        .fetch_one(&mut *conn)
        .await
}

/// Writes the completion fields of `session`.
///
/// Only rows still `active` are touched, so closing twice is a no-op that
/// returns `None`.
pub async fn close_session(
    conn: &mut PgConnection,
    session: &PlaySession,
) -> Result<Option<PlaySession>, sqlx::Error> {
    let query = format!(
        "UPDATE play_sessions \
         SET ended_at = $2, duration_minutes = $3, status = 'completed', updated_at = $4 \
         WHERE id = $1 AND status = 'active' \
         RETURNING {}",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, PlaySession>(&query)
        .bind(session.id)
        .bind(session.ended_at)
        .bind(session.duration_minutes)
        .bind(session.updated_at)
        .fetch_optional(&mut *conn)
        .await
}

/// Sum of completed session minutes for sessions started in `[from, to)`.
pub async fn completed_minutes_between(
    pool: &PgPool,
    user_id: UserId,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COALESCE(SUM(duration_minutes), 0)::BIGINT FROM play_sessions \
         WHERE user_id = $1 AND status = 'completed' AND started_at >= $2 AND started_at < $3",
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await
}

pub async fn list_stale_sessions(
    pool: &PgPool,
    started_before: DateTime<Utc>,
) -> Result<Vec<PlaySession>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM play_sessions \
         WHERE status = 'active' AND started_at < $1 \
         ORDER BY started_at ASC",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, PlaySession>(&query)
        .bind(started_before)
        .fetch_all(pool)
        .await
}
