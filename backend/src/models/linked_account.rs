//! Platform accounts linked to a dashboard user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::platform::Platform;
use crate::types::UserId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LinkedAccount {
    pub user_id: UserId,
    pub platform: Platform,
    /// Identifier the platform knows the user by (e.g. a SteamID64).
    pub platform_user_id: String,
    pub created_at: DateTime<Utc>,
}

impl LinkedAccount {
    pub fn new(user_id: UserId, platform: Platform, platform_user_id: impl Into<String>) -> Self {
        Self {
            user_id,
            platform,
            platform_user_id: platform_user_id.into(),
            created_at: Utc::now(),
        }
    }
}
