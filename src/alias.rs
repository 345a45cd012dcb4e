//! Alternative spellings of player and team names.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::matches::model::is_placeholder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasKind {
    Player,
    Team,
}

impl AliasKind {
    fn as_str(&self) -> &'static str {
        match self {
            AliasKind::Player => "player",
            AliasKind::Team => "team",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AliasError {
    #[error("invalid {0} name")]
    InvalidName(&'static str),
    #[error("invalid alias")]
    InvalidAlias,
    #[error("alias matches name")]
    SameAsName,
    #[error("alias {alias} is already used by {owner}")]
    AlreadyUsed { alias: String, owner: String },
}

/// alias → canonical name, one map per kind. Same layout on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasTable {
    #[serde(default)]
    player: BTreeMap<String, String>,
    #[serde(default)]
    team: BTreeMap<String, String>,
}

impl AliasTable {
    /// Read the alias file; any failure yields an empty table.
    pub fn load(path: &Path) -> AliasTable {
        if !path.exists() {
            return AliasTable::default();
        }
        let parsed = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))
            .and_then(|raw| {
                serde_json::from_str::<AliasTable>(&raw)
                    .with_context(|| format!("Malformed alias file {}", path.display()))
            });
        match parsed {
            Ok(table) => {
                info!(
                    "Loaded {} player and {} team alias(es)",
                    table.player.len(),
                    table.team.len()
                );
                table
            }
            Err(e) => {
                warn!("{:#}", e);
                AliasTable::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize aliases")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn map(&self, kind: AliasKind) -> &BTreeMap<String, String> {
        match kind {
            AliasKind::Player => &self.player,
            AliasKind::Team => &self.team,
        }
    }

    fn map_mut(&mut self, kind: AliasKind) -> &mut BTreeMap<String, String> {
        match kind {
            AliasKind::Player => &mut self.player,
            AliasKind::Team => &mut self.team,
        }
    }

    pub fn add(&mut self, kind: AliasKind, name: &str, alias: &str) -> Result<(), AliasError> {
        let (name, alias) = (name.trim(), alias.trim());
        if is_placeholder(name) {
            return Err(AliasError::InvalidName(kind.as_str()));
        }
        if is_placeholder(alias) {
            return Err(AliasError::InvalidAlias);
        }
        if name == alias {
            return Err(AliasError::SameAsName);
        }
        if let Some(owner) = self.map(kind).get(alias) {
            return Err(AliasError::AlreadyUsed {
                alias: alias.to_string(),
                owner: owner.clone(),
            });
        }
        self.map_mut(kind).insert(alias.to_string(), name.to_string());
        Ok(())
    }

    /// Remove `alias` if it points at `name`.
    pub fn remove(&mut self, kind: AliasKind, name: &str, alias: &str) -> bool {
        let map = self.map_mut(kind);
        if map.get(alias.trim()).map(String::as_str) == Some(name.trim()) {
            map.remove(alias.trim());
            true
        } else {
            false
        }
    }

    pub fn add_player_alias(&mut self, name: &str, alias: &str) -> Result<(), AliasError> {
        self.add(AliasKind::Player, name, alias)
    }

    pub fn add_team_alias(&mut self, name: &str, alias: &str) -> Result<(), AliasError> {
        self.add(AliasKind::Team, name, alias)
    }

    pub fn remove_player_alias(&mut self, name: &str, alias: &str) -> bool {
        self.remove(AliasKind::Player, name, alias)
    }

    pub fn remove_team_alias(&mut self, name: &str, alias: &str) -> bool {
        self.remove(AliasKind::Team, name, alias)
    }

    /// Canonical name for `name`, or `name` itself (trimmed).
    pub fn translate<'a>(&'a self, kind: AliasKind, name: &'a str) -> &'a str {
        let name = name.trim();
        self.map(kind).get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn translate_player<'a>(&'a self, name: &'a str) -> &'a str {
        self.translate(AliasKind::Player, name)
    }

    pub fn translate_team<'a>(&'a self, name: &'a str) -> &'a str {
        self.translate(AliasKind::Team, name)
    }

    /// canonical name → its aliases.
    pub fn aliases_by_name(&self, kind: AliasKind) -> BTreeMap<&str, Vec<&str>> {
        let mut out: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (alias, name) in self.map(kind) {
            out.entry(name.as_str()).or_default().push(alias.as_str());
        }
        out
    }
}
