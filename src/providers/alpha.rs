use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{name_or_tbd, GrabbedMatch, GrabbedTeam, ProviderAdapter, ProviderError};
use crate::matches::{FormatConfig, Provider, Race};

const URL_PREFIX: &str = "http://alpha.tl/match/";
const DEFAULT_API_PREFIX: &str = "http://alpha.tl/api?match=";
const SETS: usize = 5;

/// Alpha SC2 Team League match API.
pub struct AlphaTlProvider {
    http: Client,
    /// API prefix, overridable in tests
    api_prefix: String,
}

impl AlphaTlProvider {
    pub fn new(api_prefix: Option<&str>) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(AlphaTlProvider {
            http,
            api_prefix: api_prefix.unwrap_or(DEFAULT_API_PREFIX).to_string(),
        })
    }

    async fn fetch(&self, id: u64) -> anyhow::Result<AlphaResponse> {
        let url = format!("{}{}", self.api_prefix, id);
        debug!("Fetching AlphaTL match from {}", url);

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("AlphaTL request failed")?;
        if !resp.status().is_success() {
            anyhow::bail!("AlphaTL error: {}", resp.status());
        }
        resp.json().await.context("Failed to parse AlphaTL response")
    }
}

#[async_trait]
impl ProviderAdapter for AlphaTlProvider {
    fn provider(&self) -> Provider {
        Provider::AlphaTl
    }

    fn url_prefix(&self) -> Option<&str> {
        Some(URL_PREFIX)
    }

    async fn grab(&self, id: u64) -> Result<GrabbedMatch, ProviderError> {
        let raw = self.fetch(id).await.map_err(ProviderError::transport)?;
        parse_match(raw, id, self.match_url(id))
    }
}

#[derive(Debug, Deserialize)]
struct AlphaResponse {
    code: i64,
    #[serde(default)]
    error: String,
    #[serde(default)]
    tournament: String,
    #[serde(default)]
    maps: Vec<String>,
    #[serde(default)]
    lineup1: Vec<AlphaPlayer>,
    #[serde(default)]
    lineup2: Vec<AlphaPlayer>,
    team1: Option<AlphaTeam>,
    team2: Option<AlphaTeam>,
    #[serde(default)]
    games: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AlphaPlayer {
    nickname: String,
    #[serde(default)]
    race: String,
}

#[derive(Debug, Deserialize)]
struct AlphaTeam {
    name: String,
    #[serde(default)]
    tag: Option<String>,
}

/// `1` → team 1 won, `2` → team 2 won, anything else undecided.
fn game_score(game: &serde_json::Value) -> i8 {
    let winner = game
        .as_i64()
        .or_else(|| game.as_str().and_then(|s| s.trim().parse().ok()));
    match winner {
        Some(1) => -1,
        Some(2) => 1,
        _ => 0,
    }
}

fn parse_match(raw: AlphaResponse, id: u64, url: String) -> Result<GrabbedMatch, ProviderError> {
    if raw.code != 200 {
        return Err(ProviderError::new(
            format!("api-{}", raw.code),
            format!("API-Error: {}", raw.error),
        ));
    }

    let lineup = |players: &[AlphaPlayer]| -> Vec<(String, Race)> {
        players
            .iter()
            .take(SETS)
            .map(|p| (name_or_tbd(&p.nickname), Race::parse(&p.race)))
            .collect()
    };
    let team = |team: &Option<AlphaTeam>| -> GrabbedTeam {
        team.as_ref()
            .map(|t| GrabbedTeam {
                name: name_or_tbd(&t.name),
                tag: t.tag.clone(),
            })
            .unwrap_or(GrabbedTeam {
                name: name_or_tbd(""),
                tag: None,
            })
    };

    Ok(GrabbedMatch {
        provider: Provider::AlphaTl,
        external_id: id,
        url,
        league: name_or_tbd(&raw.tournament),
        format: FormatConfig {
            best_of: SETS as u32,
            ..FormatConfig::default()
        },
        min_sets: 3,
        teams: [team(&raw.team1), team(&raw.team2)],
        lineups: [lineup(&raw.lineup1), lineup(&raw.lineup2)],
        maps: raw.maps.iter().take(SETS).map(|m| name_or_tbd(m)).collect(),
        scores: raw.games.iter().take(SETS).map(game_score).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::AliasTable;
    use crate::matches::Match;

    fn sample() -> AlphaResponse {
        serde_json::from_value(serde_json::json!({
            "code": 200,
            "error": "",
            "tournament": "AlphaX Season 3",
            "maps": ["Alcyone", "Oceanborn", "Amphion", "Crimson Court", "Goldenaura"],
            "lineup1": [
                {"nickname": "Serral", "race": "Zerg"},
                {"nickname": "Clem", "race": "Terran"}
            ],
            "lineup2": [
                {"nickname": "Maru", "race": "T"},
                {"nickname": "herO", "race": "protoss"}
            ],
            "team1": {"name": "MiXed Minds", "tag": "MxM", "logo": "http://alpha.tl/logo1.png"},
            "team2": {"name": "Team Liquid", "tag": "TL"},
            "games": ["1", 2, "0"]
        }))
        .expect("alpha response")
    }

    #[test]
    fn test_parse_match() {
        let grabbed = parse_match(sample(), 3012, "http://alpha.tl/match/3012".to_string())
            .expect("parsed");
        assert_eq!(grabbed.league, "AlphaX Season 3");
        assert_eq!(grabbed.lineups[1][0], ("Maru".to_string(), Race::Terran));
        assert_eq!(grabbed.lineups[1][1].1, Race::Protoss);
        assert_eq!(grabbed.teams[0].tag.as_deref(), Some("MxM"));
        assert_eq!(grabbed.scores, vec![-1, 1, 0]);
        assert_eq!(grabbed.maps.len(), 5);
    }

    #[test]
    fn test_api_error() {
        let raw: AlphaResponse = serde_json::from_value(serde_json::json!({
            "code": 404,
            "error": "Match not found"
        }))
        .expect("alpha response");
        let err = parse_match(raw, 1, String::new()).expect_err("api error");
        assert_eq!(err.code, "api-404");
        assert!(err.message.contains("Match not found"));
    }

    #[test]
    fn test_applied_match() {
        let grabbed = parse_match(sample(), 3012, "http://alpha.tl/match/3012".to_string())
            .expect("parsed");
        let mut m = Match::new();
        grabbed.apply(&mut m, &AliasTable::default());
        assert_eq!(m.num_sets(), 5);
        assert_eq!(m.min_sets(), 3);
        assert_eq!(m.sets()[4].label, "Ace Map");
        assert_eq!(m.sets()[3].map, "Crimson Court");
        assert_eq!(m.score(), (1, 1));
        assert_eq!(m.player(0, 1).map(|p| p.name.as_str()), Some("Clem"));
        assert_eq!(m.url(), "http://alpha.tl/match/3012");
    }

    #[test]
    fn test_match_url() {
        let provider = AlphaTlProvider::new(None).expect("provider");
        assert_eq!(provider.match_url(42), "http://alpha.tl/match/42");
    }
}
