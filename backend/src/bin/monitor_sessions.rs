use std::sync::Arc;

use anyhow::Context;

use playdash_backend::{
    config::Config,
    db::connection::create_pool,
    init_tracing,
    services::reconciler::SyncError,
    state::AppState,
    tracking::{self, UserSessionSync},
    types::UserId,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let user_id: UserId = std::env::args()
        .nth(1)
        .context("usage: monitor_sessions <user_id>")?
        .parse()
        .context("user_id must be a UUID")?;

    let config = Config::load()?;
    let pool = create_pool(&config.database_url).await?;
    let state = AppState::from_config(config.clone(), pool)?;

    // The driver only runs for users with a linked account.
    let enabled = match state.reconciler.linked_account(user_id).await {
        Ok(_) => true,
        Err(SyncError::NotLinked { .. }) => {
            tracing::warn!(user_id = %user_id, "No linked account; tracking disabled");
            false
        }
        Err(err) => return Err(err.into()),
    };

    let sync = Arc::new(UserSessionSync::new(
        Arc::clone(&state.reconciler),
        user_id,
        config.time_zone,
    ));
    let handle = tracking::spawn(sync, config.tracking_config(), enabled);
    if !enabled {
        return Ok(());
    }

    let mut snapshots = handle.subscribe();
    let mut events = state.events.subscribe();
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                tracing::info!(
                    mode = ?snapshot.mode,
                    game = snapshot.active_session.as_ref().map(|s| s.external_game_id.as_str()).unwrap_or("-"),
                    session_minutes = snapshot.session_duration_minutes,
                    today_minutes = snapshot.today_playtime_minutes,
                    rate_limited = snapshot.is_rate_limited,
                    last_error = snapshot.last_error.as_deref().unwrap_or(""),
                    "Tracking snapshot"
                );
            }
            Some(event) = events.recv() => {
                tracing::info!(event = ?event, "Library changed");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Stopping session monitor");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
