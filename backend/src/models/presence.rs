//! Point-in-time presence observations reported by a gaming platform.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSignal {
    pub is_playing: bool,
    pub external_game_id: Option<String>,
    pub game_name: Option<String>,
}

impl PresenceSignal {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn playing(external_game_id: impl Into<String>, game_name: Option<String>) -> Self {
        Self {
            is_playing: true,
            external_game_id: Some(external_game_id.into()),
            game_name,
        }
    }

    /// The game being played, if any.
    ///
    /// A "playing" report without a usable game id is treated as not playing.
    pub fn playing_game_id(&self) -> Option<&str> {
        if !self.is_playing {
            return None;
        }
        self.external_game_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}
