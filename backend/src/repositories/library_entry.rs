//! Library entry queries.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::models::library_entry::{minutes_to_hours, LibraryEntry};
use crate::models::platform::Platform;
use crate::types::{LibraryEntryId, UserId};

const SELECT_COLUMNS: &str = "le.id, le.user_id, le.game_id, le.platform, le.status, \
     le.playtime_hours, le.last_played_at, le.created_at, le.updated_at";

pub async fn find_by_external_game(
    pool: &PgPool,
    user_id: UserId,
    platform: Platform,
    external_game_id: &str,
) -> Result<Option<LibraryEntry>, sqlx::Error> {
    let query = format!(
        "SELECT {} FROM library_entries le \
         JOIN games g ON g.id = le.game_id \
         WHERE le.user_id = $1 AND le.platform = $2 AND g.external_game_id = $3 \
         LIMIT 1",
        SELECT_COLUMNS
    );
    sqlx::query_as::<_, LibraryEntry>(&query)
        .bind(user_id)
        .bind(platform.as_str())
        .bind(external_game_id)
        .fetch_optional(pool)
        .await
}

pub async fn mark_playing(
    conn: &mut PgConnection,
    id: LibraryEntryId,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE library_entries \
         SET status = 'playing', last_played_at = $2, updated_at = $2 \
         WHERE id = $1",
    )
    .bind(id)
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Adds the session's playtime and reverts a transient `playing` status.
pub async fn record_session_end(
    conn: &mut PgConnection,
    id: LibraryEntryId,
    duration_minutes: i32,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE library_entries \
         SET playtime_hours = playtime_hours + $2, \
             status = CASE WHEN status = 'playing' THEN 'backlog' ELSE status END, \
             updated_at = $3 \
         WHERE id = $1",
    )
    .bind(id)
    .bind(minutes_to_hours(duration_minutes))
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() > 0)
}
