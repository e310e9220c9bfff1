use axum::http::{HeaderValue, Method};
use chrono::Utc;
use std::{net::SocketAddr, time::Duration};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use playdash_backend::{
    config::Config,
    db::connection::{create_pool, DbPool},
    init_tracing, routes,
    services::sweep::sweep_stale_sessions,
    state::AppState,
};

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "<empty>".into();
    }
    let prefix = s.chars().take(4).collect::<String>();
    format!("{}*** (len={})", prefix, s.len())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allow_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(Duration::from_secs(24 * 60 * 60))
}

/// Runs the stale-session sweep on a fixed interval for the server's lifetime.
fn spawn_stale_sweep(state: AppState) {
    let period = state.config.stale_sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(err) = sweep_stale_sessions(
                state.store.as_ref(),
                &state.events,
                Utc::now(),
                state.config.stale_session_threshold(),
            )
            .await
            {
                tracing::warn!(error = %err, "Scheduled stale session sweep failed");
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::load()?;
    tracing::info!(
        database_url = %config.database_url,
        steam_api_key = %mask_secret(&config.steam_api_key),
        steam_api_base_url = %config.steam_api_base_url,
        time_zone = %config.time_zone,
        stale_session_hours = config.stale_session_hours,
        "Loaded configuration from environment/.env"
    );

    let pool: DbPool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let state = AppState::from_config(config.clone(), pool)?;
    spawn_stale_sweep(state.clone());

    let app = routes::api_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&config)),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
