//! On-disk persistence of the match registry.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::model::Match;
use super::registry::{MatchId, MatchRegistry};

/// Persisted shape of [`MatchRegistry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDocument {
    pub matches: HashMap<MatchId, Match>,
    pub active: MatchId,
    pub selected: MatchId,
    pub order: Vec<MatchId>,
}

/// Load the registry, falling back to a single default match when the file
/// is missing, unreadable or inconsistent. Never fails startup.
pub fn load(path: &Path) -> MatchRegistry {
    match read_document(path) {
        Ok(Some(doc)) => match MatchRegistry::from_document(doc) {
            Some(registry) => {
                info!("Loaded {} match(es) from {}", registry.len(), path.display());
                registry
            }
            None => {
                warn!("Inconsistent match file {}, starting fresh", path.display());
                MatchRegistry::new()
            }
        },
        Ok(None) => {
            info!("No match file at {}, starting fresh", path.display());
            MatchRegistry::new()
        }
        Err(e) => {
            warn!("Failed to load matches: {:#}", e);
            MatchRegistry::new()
        }
    }
}

fn read_document(path: &Path) -> Result<Option<RegistryDocument>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let doc = serde_json::from_str(&raw)
        .with_context(|| format!("Malformed match file {}", path.display()))?;
    Ok(Some(doc))
}

/// Write the registry atomically (temp file in the same directory + rename).
pub fn save(path: &Path, registry: &MatchRegistry) -> Result<()> {
    write_document(path, &registry.to_document())
}

/// Blocking write of an already captured document.
pub fn write_document(path: &Path, doc: &RegistryDocument) -> Result<()> {
    let json = serde_json::to_string_pretty(doc).context("Failed to serialize matches")?;

    let tmp = path.with_extension("json.tmp");
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} into place", tmp.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::Race;

    #[test]
    fn test_missing_file_gives_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = load(&dir.path().join("matches.json"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_malformed_file_gives_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("matches.json");
        std::fs::write(&path, "{ not json").expect("write");
        let registry = load(&path);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.active().map(Match::num_sets), Some(5));
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state").join("matches.json");

        let mut registry = MatchRegistry::new();
        let id = registry.new_match(None);
        {
            let m = registry.get_mut(id).expect("match");
            m.set_team(0, "MiXed Minds", Some("MxM"));
            m.set_player(0, 1, "Serral", Some(Race::Zerg));
            m.set_score(1, -1, false);
        }
        registry.activate(id);
        save(&path, &registry).expect("save");
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = load(&path);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.active_id(), id);
        assert_eq!(loaded.order(), registry.order());
        let m = loaded.active().expect("active");
        assert_eq!(m.team(0).and_then(|t| t.tag.as_deref()), Some("MxM"));
        assert_eq!(m.player(0, 1).map(|p| p.race), Some(Race::Zerg));
        assert_eq!(m.score(), (1, 0));
    }

    #[tokio::test]
    async fn test_write_document_off_runtime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("matches.json");
        let registry = MatchRegistry::new().into_shared();

        let doc = registry.read().await.to_document();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_document(&target, &doc))
            .await
            .expect("join")
            .expect("write");

        // The registry stays writable while the file is being written.
        registry.write().await.new_match(None);
        assert_eq!(load(&path).len(), 1);
    }
}
