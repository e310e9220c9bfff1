use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::{
    error::AppError,
    models::PlaySessionResponse,
    services::reconciler::SyncReport,
    state::AppState,
    types::UserId,
    utils::time::local_day_bounds,
};

#[derive(Debug, Serialize)]
pub struct ActiveSessionResponse {
    pub session: Option<PlaySessionResponse>,
    pub elapsed_minutes: i64,
}

#[derive(Debug, Serialize)]
pub struct TodayPlaytimeResponse {
    pub date: NaiveDate,
    pub time_zone: String,
    pub completed_minutes: i64,
    pub live_minutes: i64,
    pub total_minutes: i64,
}

fn parse_user_id(raw: &str) -> Result<UserId, AppError> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid user ID".into()))
}

/// Runs one reconciliation for the user and returns what it did.
pub async fn sync_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<SyncReport>, AppError> {
    let user_id = parse_user_id(&user_id)?;
    let report = state.reconciler.sync_user(user_id).await?;
    Ok(Json(report))
}

pub async fn get_active_session(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ActiveSessionResponse>, AppError> {
    let user_id = parse_user_id(&user_id)?;
    let session = state.store.find_active_session(user_id).await?;
    let elapsed_minutes = session
        .as_ref()
        .map(|s| s.elapsed_minutes(Utc::now()))
        .unwrap_or(0);

    Ok(Json(ActiveSessionResponse {
        session: session.map(PlaySessionResponse::from),
        elapsed_minutes,
    }))
}

/// Today's playtime in the configured time zone: completed sessions started
/// since local midnight plus the live minutes of the open session.
pub async fn get_today_playtime(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<TodayPlaytimeResponse>, AppError> {
    let user_id = parse_user_id(&user_id)?;
    let now = Utc::now();
    let tz = state.config.time_zone;
    let (from, to) = local_day_bounds(&tz, now);

    let completed_minutes = state
        .store
        .completed_minutes_between(user_id, from, to)
        .await?;
    let live_minutes = state
        .store
        .find_active_session(user_id)
        .await?
        .map(|s| s.elapsed_minutes(now))
        .unwrap_or(0);

    Ok(Json(TodayPlaytimeResponse {
        date: now.with_timezone(&tz).date_naive(),
        time_zone: tz.to_string(),
        completed_minutes,
        live_minutes,
        total_minutes: completed_minutes + live_minutes,
    }))
}
