use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::platform::Platform;
use crate::types::GameId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Game {
    pub id: GameId,
    pub platform: Platform,
    pub external_game_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Game {
    pub fn new(platform: Platform, external_game_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: GameId::new(),
            platform,
            external_game_id: external_game_id.into(),
            title: title.into(),
            created_at: Utc::now(),
        }
    }
}
