use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::snapshot::LiveSnapshot;
use crate::alias::AliasTable;
use crate::fuzzy;
use crate::matches::model::is_placeholder;
use crate::matches::Match;

/// Similarity at or above which two handles are the same player.
pub const DEFAULT_THRESHOLD: f64 = 0.75;

/// A configured set matched to a live game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetResolution {
    pub set_index: usize,
    /// Live player 1 plays for team 1.
    pub in_order: bool,
    /// Weak matches only: the team whose configured player was a placeholder.
    pub placeholder_team: Option<usize>,
}

/// Matcher shared by the reconciler and the alias routes of the status API.
pub type SharedMatcher = Arc<RwLock<PlayerMatcher>>;

/// Maps live player names onto configured sets.
#[derive(Debug, Clone)]
pub struct PlayerMatcher {
    fuzzy: bool,
    threshold: f64,
    aliases: AliasTable,
}

impl Default for PlayerMatcher {
    fn default() -> Self {
        PlayerMatcher::new(true, DEFAULT_THRESHOLD, AliasTable::default())
    }
}

impl PlayerMatcher {
    pub fn new(fuzzy: bool, threshold: f64, aliases: AliasTable) -> Self {
        PlayerMatcher {
            fuzzy,
            threshold,
            aliases,
        }
    }

    pub fn into_shared(self) -> SharedMatcher {
        Arc::new(RwLock::new(self))
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn aliases_mut(&mut self) -> &mut AliasTable {
        &mut self.aliases
    }

    /// Exact equality, or case-insensitive similarity when fuzzy mode is on.
    pub fn compare(&self, a: &str, b: &str) -> bool {
        if self.fuzzy {
            fuzzy::similarity_ignore_case(a, b) >= self.threshold
        } else {
            a == b
        }
    }

    /// Raw live name plus its alias translation.
    fn live_names<'a>(&'a self, name: &'a str) -> Vec<&'a str> {
        let translated = self.aliases.translate_player(name);
        if translated == name {
            vec![name]
        } else {
            vec![translated, name]
        }
    }

    fn any_matches(&self, live: &[&str], configured: &str) -> bool {
        live.iter().any(|name| self.compare(name, configured))
    }

    /// Resolve one set. `weak` additionally accepts a set where one side is
    /// still a placeholder and the other side matches.
    pub fn resolve_pair(
        &self,
        snapshot: &LiveSnapshot,
        configured: (&str, &str),
        weak: bool,
    ) -> Option<(bool, Option<usize>)> {
        let (c1, c2) = (configured.0.trim(), configured.1.trim());
        let (c1_unset, c2_unset) = (is_placeholder(c1), is_placeholder(c2));
        let live1 = self.live_names(&snapshot.player1);
        let live2 = self.live_names(&snapshot.player2);

        if !c1_unset && !c2_unset {
            if self.any_matches(&live1, c1) && self.any_matches(&live2, c2) {
                return Some((true, None));
            }
            if self.any_matches(&live1, c2) && self.any_matches(&live2, c1) {
                return Some((false, None));
            }
            return None;
        }

        if !weak || (c1_unset && c2_unset) {
            return None;
        }

        if c1_unset {
            if self.any_matches(&live2, c2) {
                return Some((true, Some(0)));
            }
            if self.any_matches(&live1, c2) {
                return Some((false, Some(0)));
            }
        } else {
            if self.any_matches(&live1, c1) {
                return Some((true, Some(1)));
            }
            if self.any_matches(&live2, c1) {
                return Some((false, Some(1)));
            }
        }
        None
    }

    /// Every set matching the snapshot, in set order.
    pub fn resolve_candidates(
        &self,
        snapshot: &LiveSnapshot,
        m: &Match,
        weak: bool,
    ) -> Vec<SetResolution> {
        (0..m.num_sets())
            .filter_map(|set_index| {
                let p1 = m.player(0, set_index)?;
                let p2 = m.player(1, set_index)?;
                let (in_order, placeholder_team) =
                    self.resolve_pair(snapshot, (&p1.name, &p2.name), weak)?;
                Some(SetResolution {
                    set_index,
                    in_order,
                    placeholder_team,
                })
            })
            .collect()
    }

    /// First set matching the snapshot.
    pub fn resolve_set(&self, snapshot: &LiveSnapshot, m: &Match, weak: bool) -> Option<SetResolution> {
        let found = self.resolve_candidates(snapshot, m, weak).into_iter().next();
        if found.is_none() {
            debug!("No set matches {}", snapshot.describe());
        }
        found
    }
}
