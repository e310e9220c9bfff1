//! Presence sources: "what is this player doing right now" on a platform.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, StatusCode};
use serde::Deserialize;
use tracing::Instrument;

use crate::models::{Platform, PresenceSignal};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PresenceError {
    #[error("presence source rate limited the request")]
    RateLimited { retry_after: Option<Duration> },
    #[error("presence source unavailable: {0}")]
    Unavailable(String),
    #[error("presence source returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PresenceSource: Send + Sync {
    fn platform(&self) -> Platform;

    async fn fetch_presence(&self, platform_user_id: &str)
        -> Result<PresenceSignal, PresenceError>;
}

/// Steam Web API `GetPlayerSummaries` adapter.
pub struct SteamPresenceSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SteamPresenceSource {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    fn summaries_url(&self) -> String {
        format!("{}/ISteamUser/GetPlayerSummaries/v0002/", self.base_url)
    }
}

#[async_trait]
impl PresenceSource for SteamPresenceSource {
    fn platform(&self) -> Platform {
        Platform::Steam
    }

    async fn fetch_presence(
        &self,
        platform_user_id: &str,
    ) -> Result<PresenceSignal, PresenceError> {
        let span = tracing::debug_span!("steam_fetch_presence", steam_id = platform_user_id);

        let response = self
            .client
            .get(self.summaries_url())
            .query(&[
                ("key", self.api_key.as_str()),
                ("steamids", platform_user_id),
            ])
            .send()
            .instrument(span.clone())
            .await
            .map_err(|e| PresenceError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(PresenceError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(PresenceError::Unavailable(format!(
                "GetPlayerSummaries returned {}",
                status
            )));
        }

        let envelope: PlayerSummariesEnvelope = response
            .json()
            .instrument(span)
            .await
            .map_err(|e| PresenceError::InvalidResponse(e.to_string()))?;
        presence_from_summaries(envelope)
    }
}

#[derive(Debug, Deserialize)]
struct PlayerSummariesEnvelope {
    response: PlayerSummaries,
}

#[derive(Debug, Deserialize)]
struct PlayerSummaries {
    #[serde(default)]
    players: Vec<PlayerSummary>,
}

#[derive(Debug, Deserialize)]
struct PlayerSummary {
    gameid: Option<String>,
    gameextrainfo: Option<String>,
}

fn presence_from_summaries(
    envelope: PlayerSummariesEnvelope,
) -> Result<PresenceSignal, PresenceError> {
    let player = envelope
        .response
        .players
        .into_iter()
        .next()
        .ok_or_else(|| PresenceError::InvalidResponse("no player in summary".into()))?;

    Ok(match player.gameid.filter(|id| !id.trim().is_empty()) {
        Some(game_id) => PresenceSignal::playing(game_id, player.gameextrainfo),
        None => PresenceSignal::idle(),
    })
}

/// Parses a `Retry-After` value given in seconds. HTTP-date values are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
