use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::snapshot::{GameResponse, LiveSnapshot, UiResponse};

/// Anything that can sample the local game state.
///
/// `Err` means the client is unreachable or answered garbage, `Ok(None)` that
/// it is reachable but not showing a two-player game.
#[async_trait]
pub trait GameStateSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<Option<LiveSnapshot>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// The game client's local HTTP API (`/game` and `/ui`).
pub struct HttpGameClient {
    http: Client,
    game_url: Url,
    ui_url: Url,
}

impl HttpGameClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let mut base = Url::parse(base_url)
            .with_context(|| format!("Invalid game client URL: {}", base_url))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let game_url = base.join("game").context("Failed to build game endpoint URL")?;
        let ui_url = base.join("ui").context("Failed to build ui endpoint URL")?;

        Ok(HttpGameClient {
            http,
            game_url,
            ui_url,
        })
    }

    pub fn game_url(&self) -> &Url {
        &self.game_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Game client request to {} failed", url))?;

        if !resp.status().is_success() {
            anyhow::bail!("Game client error: {}", resp.status());
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }
}

#[async_trait]
impl GameStateSource for HttpGameClient {
    fn name(&self) -> &str {
        "SC2 client API"
    }

    async fn fetch_snapshot(&self) -> Result<Option<LiveSnapshot>> {
        let game: GameResponse = self.get_json(&self.game_url).await?;
        if game.players.len() != 2 {
            debug!("{} player(s) in client, waiting", game.players.len());
            return Ok(None);
        }
        let ui: UiResponse = self.get_json(&self.ui_url).await?;
        Ok(LiveSnapshot::from_responses(&game, &ui))
    }
}
