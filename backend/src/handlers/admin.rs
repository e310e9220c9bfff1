use axum::{extract::State, Json};
use chrono::Utc;

use crate::{
    error::AppError,
    services::sweep::{sweep_stale_sessions, SweepReport},
    state::AppState,
};

/// Force-closes sessions open longer than the configured threshold.
pub async fn sweep_sessions(State(state): State<AppState>) -> Result<Json<SweepReport>, AppError> {
    let report = sweep_stale_sessions(
        state.store.as_ref(),
        &state.events,
        Utc::now(),
        state.config.stale_session_threshold(),
    )
    .await?;
    Ok(Json(report))
}
