use std::sync::Arc;

use crate::{
    config::Config,
    db::connection::DbPool,
    repositories::{PgSessionStore, SessionStore},
    services::{
        events::LibraryEvents,
        presence::{PresenceSource, SteamPresenceSource},
        reconciler::PresenceReconciler,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn SessionStore>,
    pub reconciler: Arc<PresenceReconciler>,
    pub events: LibraryEvents,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn SessionStore>,
        presence: Arc<dyn PresenceSource>,
    ) -> Self {
        let events = LibraryEvents::default();
        let reconciler = Arc::new(PresenceReconciler::new(
            Arc::clone(&store),
            presence,
            events.clone(),
        ));
        Self {
            config,
            store,
            reconciler,
            events,
        }
    }

    /// Production wiring: Postgres store and the Steam presence adapter.
    pub fn from_config(config: Config, pool: DbPool) -> anyhow::Result<Self> {
        let presence = SteamPresenceSource::new(
            config.steam_api_key.clone(),
            config.steam_api_base_url.clone(),
            config.presence_timeout(),
        )?;
        Ok(Self::new(
            config,
            Arc::new(PgSessionStore::new(pool)),
            Arc::new(presence),
        ))
    }
}
