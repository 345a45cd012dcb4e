pub mod alpha;
pub mod custom;

pub use alpha::AlphaTlProvider;
pub use custom::CustomProvider;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::alias::AliasTable;
use crate::matches::{FormatConfig, Match, Provider, Race, TBD};

/// Classified failure of a provider, shown to the caster as a status line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(provider: Provider) -> Self {
        ProviderError::new(
            "unsupported",
            format!("Cannot grab data from {}", provider.as_str()),
        )
    }

    pub fn transport(err: anyhow::Error) -> Self {
        ProviderError::new("transport", format!("{:#}", err))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrabbedTeam {
    pub name: String,
    pub tag: Option<String>,
}

/// Provider-neutral match data, applied to a [`Match`] through its API.
#[derive(Debug, Clone)]
pub struct GrabbedMatch {
    pub provider: Provider,
    pub external_id: u64,
    pub url: String,
    pub league: String,
    pub format: FormatConfig,
    pub min_sets: usize,
    pub teams: [GrabbedTeam; 2],
    pub lineups: [Vec<(String, Race)>; 2],
    pub maps: Vec<String>,
    /// Per-set scores, -1/0/1.
    pub scores: Vec<i8>,
}

impl GrabbedMatch {
    /// Replace the contents of `m` with this data in one bulk update,
    /// translating player and team aliases.
    pub fn apply(&self, m: &mut Match, aliases: &AliasTable) {
        m.bulk_update(|m| {
            m.reset(true);
            m.set_format(self.format);
            m.set_min_sets(self.min_sets);
            m.set_provider(self.provider);
            m.set_external_id(self.external_id);
            m.set_url(&self.url);
            m.set_league(&self.league);

            for (idx, map) in self.maps.iter().enumerate() {
                m.set_map(idx, map);
            }
            for (team_idx, team) in self.teams.iter().enumerate() {
                m.set_team(team_idx, aliases.translate_team(&team.name), team.tag.as_deref());
                for (set_idx, (name, race)) in self.lineups[team_idx].iter().enumerate() {
                    m.set_player(team_idx, set_idx, aliases.translate_player(name), Some(*race));
                }
            }
            for (idx, score) in self.scores.iter().enumerate() {
                m.set_score(idx, *score, true);
            }
        });
    }
}

/// A source of match data.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// Public match URLs of this provider start with this prefix.
    fn url_prefix(&self) -> Option<&str>;

    fn match_url(&self, id: u64) -> String {
        self.url_prefix()
            .map(|prefix| format!("{}{}", prefix, id))
            .unwrap_or_default()
    }

    async fn grab(&self, id: u64) -> Result<GrabbedMatch, ProviderError>;
}

/// Adapters keyed by [`Provider`].
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    /// Provider whose URL prefix matches (scheme ignored), else `Custom`,
    /// plus the numeric match id when the URL carries one.
    pub fn resolve_url(&self, url: &str) -> (Provider, Option<u64>) {
        let target = strip_scheme(url.trim());
        let provider = self
            .adapters
            .values()
            .find(|a| {
                a.url_prefix()
                    .map(|prefix| target.starts_with(strip_scheme(prefix)))
                    .unwrap_or(false)
            })
            .map(|a| a.provider())
            .unwrap_or(Provider::Custom);
        (provider, extract_id(url))
    }

    /// Fetch the match behind `url`.
    pub async fn grab_url(&self, url: &str) -> Result<GrabbedMatch, ProviderError> {
        let (provider, id) = self.resolve_url(url);
        let adapter = self
            .get(provider)
            .ok_or_else(|| ProviderError::unsupported(provider))?;
        let id = id.ok_or_else(|| ProviderError::new("invalid-url", format!("No match id in {}", url)))?;
        info!("Grabbing match {} from {}", id, provider.as_str());
        adapter.grab(id).await
    }
}

fn strip_scheme(url: &str) -> &str {
    url.split_once("://").map(|(_, rest)| rest).unwrap_or(url)
}

/// Last run of ASCII digits in `url`.
fn extract_id(url: &str) -> Option<u64> {
    let bytes = url.as_bytes();
    let end = bytes.iter().rposition(u8::is_ascii_digit)? + 1;
    let start = bytes[..end]
        .iter()
        .rposition(|b| !b.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    url[start..end].parse().ok()
}

/// Placeholder-aware name: empty strings become TBD.
pub(crate) fn name_or_tbd(name: &str) -> String {
    let name = name.trim();
    if name.is_empty() {
        TBD.to_string()
    } else {
        name.to_string()
    }
}
