use chrono::Utc;

use playdash_backend::{
    config::Config,
    db::connection::create_pool,
    init_tracing,
    repositories::PgSessionStore,
    services::{events::LibraryEvents, sweep::sweep_stale_sessions},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::load()?;
    let pool = create_pool(&config.database_url).await?;
    let store = PgSessionStore::new(pool);

    let report = sweep_stale_sessions(
        &store,
        &LibraryEvents::default(),
        Utc::now(),
        config.stale_session_threshold(),
    )
    .await?;

    println!(
        "Closed {} stale session(s), {} failed",
        report.closed.len(),
        report.failed.len()
    );
    for id in &report.failed {
        tracing::warn!(session_id = %id, "Stale session left open");
    }

    if report.failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} stale session(s) could not be closed", report.failed.len())
    }
}
