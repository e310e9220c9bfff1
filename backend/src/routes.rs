use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};

use crate::{handlers, middleware, state::AppState};

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/users/{user_id}/sessions/sync",
            post(handlers::sessions::sync_sessions),
        )
        .route(
            "/api/users/{user_id}/sessions/active",
            get(handlers::sessions::get_active_session),
        )
        .route(
            "/api/users/{user_id}/playtime/today",
            get(handlers::sessions::get_today_playtime),
        )
        .route(
            "/api/admin/sessions/sweep",
            post(handlers::admin::sweep_sessions),
        )
        .layer(axum_middleware::from_fn(middleware::log_error_responses))
        .layer(axum_middleware::from_fn(middleware::request_id))
        .with_state(state)
}
