use anyhow::Context;

use playdash_backend::{
    config::Config, db::connection::create_pool, init_tracing, state::AppState, types::UserId,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let user_id: UserId = std::env::args()
        .nth(1)
        .context("usage: force_sync <user_id>")?
        .parse()
        .context("user_id must be a UUID")?;

    let config = Config::load()?;
    let pool = create_pool(&config.database_url).await?;
    let state = AppState::from_config(config, pool)?;

    let report = state.reconciler.sync_user(user_id).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
