//! Set of open matches with a single active and a single selected one.
//!
//! ```text
//!   order:    [m0, m3, m1]          explicit, user-reorderable
//!   active:   m3  ── notifier ──▶  broadcast::Sender<MatchChange>
//!   selected: m1                    (UI focus only)
//! ```
//!
//! Only the active match holds the change notifier, so live reconciliation
//! and overlay writers always follow "the" active match.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use super::model::{Match, MatchChange};
use super::store::RegistryDocument;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

pub type SharedRegistry = Arc<RwLock<MatchRegistry>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub u64);

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub struct MatchRegistry {
    matches: HashMap<MatchId, Match>,
    order: Vec<MatchId>,
    active: MatchId,
    selected: MatchId,
    next_id: u64,
    notifier: broadcast::Sender<MatchChange>,
}

impl Default for MatchRegistry {
    fn default() -> Self {
        MatchRegistry::new()
    }
}

impl MatchRegistry {
    /// Registry holding one default match, both active and selected.
    pub fn new() -> Self {
        let (notifier, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let id = MatchId(0);
        let mut first = Match::new();
        first.attach_notifier(notifier.clone());

        MatchRegistry {
            matches: HashMap::from([(id, first)]),
            order: vec![id],
            active: id,
            selected: id,
            next_id: 1,
            notifier,
        }
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Change notifications of whichever match is active at the time.
    pub fn subscribe(&self) -> broadcast::Receiver<MatchChange> {
        self.notifier.subscribe()
    }

    /// Add a match (default one when `seed` is `None`) at the end of the order.
    pub fn new_match(&mut self, seed: Option<Match>) -> MatchId {
        let id = MatchId(self.next_id);
        self.next_id += 1;
        let mut m = seed.unwrap_or_default();
        let _ = m.detach_notifier();
        self.matches.insert(id, m);
        self.order.push(id);
        debug!("Created match {}", id);
        id
    }

    /// Remove a match and return the id that is selected afterwards.
    ///
    /// The last remaining match cannot be removed. When the removed match was
    /// active, the match before it in the order (or the first remaining one)
    /// becomes active.
    pub fn remove_match(&mut self, id: MatchId) -> Option<MatchId> {
        if self.matches.len() <= 1 {
            warn!("Refusing to remove the last match {}", id);
            return None;
        }
        let pos = self.order.iter().position(|&m| m == id)?;
        // Nearest earlier entry in the order, else the next one.
        let fallback = self.order[..pos]
            .iter()
            .rev()
            .chain(self.order[pos + 1..].iter())
            .copied()
            .find(|candidate| *candidate != id && self.matches.contains_key(candidate))?;
        self.matches.remove(&id);
        self.order.remove(pos);

        if self.active == id {
            self.activate(fallback);
        }
        if self.selected == id {
            self.selected = fallback;
        }
        info!("Removed match {}", id);
        Some(self.selected)
    }

    /// Make `id` the match receiving live updates.
    pub fn activate(&mut self, id: MatchId) -> bool {
        if !self.matches.contains_key(&id) {
            return false;
        }
        if let Some(old) = self.matches.get_mut(&self.active) {
            let _ = old.detach_notifier();
        }
        if let Some(new) = self.matches.get_mut(&id) {
            new.attach_notifier(self.notifier.clone());
        }
        if self.active != id {
            info!("Activated match {}", id);
        }
        self.active = id;
        let _ = self.notifier.send(MatchChange::Meta);
        true
    }

    pub fn select(&mut self, id: MatchId) -> bool {
        if !self.matches.contains_key(&id) {
            return false;
        }
        self.selected = id;
        true
    }

    pub fn active_id(&self) -> MatchId {
        self.active
    }

    pub fn selected_id(&self) -> MatchId {
        self.selected
    }

    pub fn order(&self) -> &[MatchId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn get(&self, id: MatchId) -> Option<&Match> {
        self.matches.get(&id)
    }

    pub fn get_mut(&mut self, id: MatchId) -> Option<&mut Match> {
        self.matches.get_mut(&id)
    }

    pub fn active(&self) -> Option<&Match> {
        self.matches.get(&self.active)
    }

    pub fn active_mut(&mut self) -> Option<&mut Match> {
        self.matches.get_mut(&self.active)
    }

    /// Move the match at order position `from` to position `to`.
    pub fn move_match(&mut self, from: usize, to: usize) -> bool {
        if from >= self.order.len() || to >= self.order.len() {
            return false;
        }
        let id = self.order.remove(from);
        self.order.insert(to, id);
        true
    }

    /// Replace the order with a permutation of the current ids.
    pub fn set_order(&mut self, order: Vec<MatchId>) -> bool {
        if !is_permutation(&order, &self.matches) {
            return false;
        }
        self.order = order;
        true
    }

    /// Wake change subscribers for edits outside the active match (other
    /// matches, order, selection).
    pub fn mark_changed(&self) {
        let _ = self.notifier.send(MatchChange::Meta);
    }

    pub fn to_document(&self) -> RegistryDocument {
        RegistryDocument {
            matches: self.matches.clone(),
            active: self.active,
            selected: self.selected,
            order: self.order.clone(),
        }
    }

    /// Rebuild from a persisted document. `None` when the document is
    /// empty or its ids do not line up.
    pub fn from_document(doc: RegistryDocument) -> Option<Self> {
        let RegistryDocument {
            mut matches,
            active,
            selected,
            order,
        } = doc;

        if matches.is_empty() || !is_permutation(&order, &matches) {
            return None;
        }
        if !matches.contains_key(&active) || !matches.contains_key(&selected) {
            return None;
        }

        for m in matches.values_mut() {
            m.repair();
        }
        let next_id = matches.keys().map(|id| id.0 + 1).max().unwrap_or(0);
        let (notifier, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        let mut registry = MatchRegistry {
            matches,
            order,
            active,
            selected,
            next_id,
            notifier,
        };
        registry.activate(active);
        Some(registry)
    }
}

/// `order` names every match exactly once.
fn is_permutation(order: &[MatchId], matches: &HashMap<MatchId, Match>) -> bool {
    let mut sorted = order.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted.len() == order.len()
        && sorted.len() == matches.len()
        && sorted.iter().all(|id| matches.contains_key(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::FormatConfig;

    #[test]
    fn test_new_registry_has_one_match() {
        let registry = MatchRegistry::new();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.active_id(), registry.selected_id());
        assert!(registry.active().is_some());
    }

    #[test]
    fn test_cannot_remove_last_match() {
        let mut registry = MatchRegistry::new();
        let id = registry.active_id();
        assert_eq!(registry.remove_match(id), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_active_activates_previous() {
        let mut registry = MatchRegistry::new();
        let first = registry.active_id();
        let second = registry.new_match(None);
        let third = registry.new_match(None);
        registry.activate(third);
        registry.select(third);

        assert_eq!(registry.remove_match(third), Some(second));
        assert_eq!(registry.active_id(), second);

        assert_eq!(registry.remove_match(first), Some(second));
        assert_eq!(registry.order(), &[second]);
    }

    #[test]
    fn test_remove_first_falls_back_to_new_first() {
        let mut registry = MatchRegistry::new();
        let first = registry.active_id();
        let second = registry.new_match(None);
        assert_eq!(registry.remove_match(first), Some(second));
        assert_eq!(registry.active_id(), second);
    }

    #[test]
    fn test_remove_unknown_id() {
        let mut registry = MatchRegistry::new();
        registry.new_match(None);
        assert_eq!(registry.remove_match(MatchId(42)), None);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_only_active_match_notifies() {
        let mut registry = MatchRegistry::new();
        let mut rx = registry.subscribe();
        let first = registry.active_id();
        let second = registry.new_match(None);

        registry.get_mut(second).expect("match").set_map(0, "Alcyone");
        assert!(rx.try_recv().is_err());

        assert!(registry.activate(second));
        assert_eq!(rx.try_recv().ok(), Some(MatchChange::Meta));

        registry.get_mut(first).expect("match").set_map(0, "Oceanborn");
        assert!(rx.try_recv().is_err());

        registry.active_mut().expect("active").set_score(0, 1, false);
        assert_eq!(
            rx.try_recv().ok(),
            Some(MatchChange::Score {
                set_index: 0,
                value: 1
            })
        );
    }

    #[test]
    fn test_select_is_independent_of_activation() {
        let mut registry = MatchRegistry::new();
        let first = registry.active_id();
        let second = registry.new_match(None);
        assert!(registry.select(second));
        assert_eq!(registry.active_id(), first);
        assert!(!registry.select(MatchId(99)));
    }

    #[test]
    fn test_reordering() {
        let mut registry = MatchRegistry::new();
        let a = registry.active_id();
        let b = registry.new_match(None);
        let c = registry.new_match(None);
        assert!(registry.move_match(2, 0));
        assert_eq!(registry.order(), &[c, a, b]);
        assert!(!registry.move_match(3, 0));
        assert!(registry.set_order(vec![b, c, a]));
        assert!(!registry.set_order(vec![b, b, a]));
        assert!(!registry.set_order(vec![b, c]));
        assert_eq!(registry.order(), &[b, c, a]);
    }

    #[test]
    fn test_document_round_trip_keeps_ids() {
        let mut registry = MatchRegistry::new();
        let seeded = Match::with_format(FormatConfig {
            best_of: 3,
            ..FormatConfig::default()
        });
        let id = registry.new_match(Some(seeded));
        registry.activate(id);

        let restored = MatchRegistry::from_document(registry.to_document()).expect("registry");
        assert_eq!(restored.active_id(), id);
        assert_eq!(restored.order(), registry.order());
        assert_eq!(restored.active().map(Match::num_sets), Some(3));

        let mut restored = restored;
        let next = restored.new_match(None);
        assert!(next.0 > id.0);
    }

    #[test]
    fn test_inconsistent_document_rejected() {
        let mut doc = MatchRegistry::new().to_document();
        doc.active = MatchId(7);
        assert!(MatchRegistry::from_document(doc).is_none());
    }

    #[test]
    fn test_duplicate_order_rejected() {
        let mut registry = MatchRegistry::new();
        let a = registry.active_id();
        registry.new_match(None);
        let mut doc = registry.to_document();
        doc.order = vec![a, a];
        assert!(MatchRegistry::from_document(doc).is_none());
    }

    #[test]
    fn test_active_survives_removals_after_reload() {
        let mut registry = MatchRegistry::new();
        let a = registry.active_id();
        let b = registry.new_match(None);
        let c = registry.new_match(None);
        let mut restored =
            MatchRegistry::from_document(registry.to_document()).expect("registry");

        assert_eq!(restored.remove_match(a), Some(b));
        assert!(restored.active().is_some());
        assert_eq!(restored.active_id(), b);
        assert_eq!(restored.remove_match(b), Some(c));
        assert_eq!(restored.active_id(), c);
        assert!(restored.active().is_some());
    }

    #[test]
    fn test_mark_changed_notifies() {
        let registry = MatchRegistry::new();
        let mut rx = registry.subscribe();
        registry.mark_changed();
        assert_eq!(rx.try_recv().ok(), Some(MatchChange::Meta));
    }
}
