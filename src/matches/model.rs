use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::format::{self, FormatConfig, MAX_SETS};
use super::presets;
use crate::fuzzy;

/// Placeholder used for unknown players, teams, maps and leagues.
pub const TBD: &str = "TBD";

/// Cutoff used when matching team names against the "my team" list.
const MY_TEAM_CUTOFF: f64 = 0.6;

/// Empty or "TBD" (any case).
pub fn is_placeholder(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name.eq_ignore_ascii_case(TBD)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Race {
    #[default]
    Random,
    Protoss,
    Terran,
    Zerg,
}

impl Race {
    /// Parse a race by its first letter ("terr", "Z", "PROTOSS"); anything else is Random.
    pub fn parse(s: &str) -> Race {
        match s.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('P') => Race::Protoss,
            Some('T') => Race::Terran,
            Some('Z') => Race::Zerg,
            _ => Race::Random,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Race::Random => "Random",
            Race::Protoss => "Protoss",
            Race::Terran => "Terran",
            Race::Zerg => "Zerg",
        }
    }
}

/// Where a match's data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Custom,
    AlphaTl,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Custom => "Custom",
            Provider::AlphaTl => "AlphaTL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    pub tag: Option<String>,
}

impl Default for Team {
    fn default() -> Self {
        Team {
            name: TBD.to_string(),
            tag: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSlot {
    pub name: String,
    pub race: Race,
}

impl Default for PlayerSlot {
    fn default() -> Self {
        PlayerSlot {
            name: TBD.to_string(),
            race: Race::Random,
        }
    }
}

/// One game of the match. `score`: -1 team 1 won, +1 team 2 won, 0 undecided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Set {
    pub label: String,
    pub map: String,
    pub score: i8,
    pub is_ace: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Veto {
    pub map: String,
    pub vetoing_side: u8,
}

impl Veto {
    fn placeholder(idx: usize) -> Self {
        Veto {
            map: TBD.to_string(),
            vetoing_side: (idx % 2) as u8,
        }
    }
}

/// Change notification emitted by an active match.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchChange {
    Score { set_index: usize, value: i8 },
    Player { team: usize, set_index: usize, name: String },
    Race { team: usize, set_index: usize, race: Race },
    Map { set_index: usize, map: String },
    Label { set_index: usize, label: String },
    Veto { index: usize, map: String, side: u8 },
    Team { team: usize, name: String },
    League { league: String },
    MySide { value: i8 },
    Outcome { winner: i8 },
    BestOf { value: u32 },
    /// Several fields changed at once; re-read the whole match.
    Meta,
}

/// One casted match.
///
/// All mutation goes through the methods below. Index-taking mutators return
/// `false` (and change nothing) for out-of-range input so that UI handlers and
/// the live reconciler never have to handle errors mid-broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Match {
    league: String,
    provider: Provider,
    url: String,
    external_id: u64,
    teams: [Team; 2],
    my_side: i8,
    swapped: bool,
    sets: Vec<Set>,
    players: [Vec<PlayerSlot>; 2],
    format: FormatConfig,
    min_sets: usize,
    vetoes: Vec<Veto>,
    #[serde(skip)]
    notifier: Option<broadcast::Sender<MatchChange>>,
    #[serde(skip)]
    suppress_depth: u32,
}

impl Default for Match {
    fn default() -> Self {
        Match::new()
    }
}

impl Match {
    pub fn new() -> Self {
        Match::with_format(FormatConfig::default())
    }

    pub fn with_format(format: FormatConfig) -> Self {
        let mut m = Match {
            league: TBD.to_string(),
            provider: Provider::Custom,
            url: String::new(),
            external_id: 0,
            teams: [Team::default(), Team::default()],
            my_side: 0,
            swapped: false,
            sets: Vec::new(),
            players: [Vec::new(), Vec::new()],
            format,
            min_sets: 0,
            vetoes: Vec::new(),
            notifier: None,
            suppress_depth: 0,
        };
        m.set_format(format);
        m
    }

    // ── Notifications ────────────────────────────────────────────────────────

    pub(crate) fn attach_notifier(&mut self, notifier: broadcast::Sender<MatchChange>) {
        self.notifier = Some(notifier);
    }

    pub(crate) fn detach_notifier(&mut self) -> Option<broadcast::Sender<MatchChange>> {
        self.notifier.take()
    }

    fn emit(&self, change: MatchChange) {
        if self.suppress_depth > 0 {
            return;
        }
        if let Some(tx) = &self.notifier {
            // No subscribers is fine.
            let _ = tx.send(change);
        }
    }

    /// Apply several mutations with per-field notifications suppressed, then
    /// emit a single [`MatchChange::Meta`]. Nested calls emit once, at the end
    /// of the outermost one.
    pub fn bulk_update<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.suppress_depth += 1;
        let out = f(self);
        self.suppress_depth -= 1;
        self.emit(MatchChange::Meta);
        out
    }

    // ── Format ───────────────────────────────────────────────────────────────

    pub fn format(&self) -> FormatConfig {
        self.format
    }

    /// Replace the format, resizing sets, players and vetoes. Existing set
    /// data is kept where the index survives.
    pub fn set_format(&mut self, format: FormatConfig) {
        let format = FormatConfig {
            best_of: format.best_of.max(1),
            ..format
        };
        let layout = format.layout();
        let labels = format::labels(layout);

        let mut sets = Vec::with_capacity(layout.total_sets);
        for (idx, label) in labels.into_iter().enumerate() {
            let (map, score) = self
                .sets
                .get(idx)
                .map(|s| (s.map.clone(), s.score))
                .unwrap_or_else(|| (TBD.to_string(), 0));
            sets.push(Set {
                label,
                map,
                score,
                is_ace: idx >= layout.ace_start,
            });
        }
        self.sets = sets;

        for team in self.players.iter_mut() {
            team.resize_with(layout.total_sets, PlayerSlot::default);
        }

        let veto_count = format.veto_count as usize;
        self.vetoes.truncate(veto_count);
        while self.vetoes.len() < veto_count {
            let idx = self.vetoes.len();
            self.vetoes.push(Veto::placeholder(idx));
        }

        self.format = format;
        self.min_sets = format::compute_min_sets(layout.total_sets, format.best_of);

        if format.solo {
            for team in self.players.iter_mut() {
                if let Some(first) = team.first().cloned() {
                    team.iter_mut().for_each(|slot| *slot = first.clone());
                }
            }
        }

        debug!(
            "Format set: bo{} ace={} sets={} all_kill={} solo={}",
            format.best_of, format.ace_extension, layout.total_sets, format.all_kill, format.solo
        );
        self.emit(MatchChange::Meta);
    }

    /// Apply a named league preset. Returns `false` for an unknown name.
    pub fn apply_preset(&mut self, name: &str) -> bool {
        let Some(preset) = presets::find(name) else {
            return false;
        };
        self.bulk_update(|m| {
            m.set_format(preset.format);
            m.set_min_sets(preset.min_sets);
            m.set_provider(Provider::Custom);
            m.set_external_id(0);
            m.set_url(preset.url);
            m.set_league(preset.name);
        });
        info!("Applied format preset '{}'", preset.name);
        true
    }

    pub fn min_sets(&self) -> usize {
        self.min_sets
    }

    pub fn set_min_sets(&mut self, min_sets: usize) {
        self.min_sets = min_sets.min(self.sets.len());
    }

    fn ace_start(&self) -> usize {
        self.format.layout().ace_start.min(self.sets.len())
    }

    // ── Meta data ────────────────────────────────────────────────────────────

    pub fn league(&self) -> &str {
        &self.league
    }

    pub fn set_league(&mut self, league: &str) {
        if self.league != league {
            self.league = league.to_string();
            self.emit(MatchChange::League {
                league: self.league.clone(),
            });
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn set_provider(&mut self, provider: Provider) {
        if self.provider != provider {
            info!("Match provider changed to {}", provider.as_str());
            self.provider = provider;
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    pub fn external_id(&self) -> u64 {
        self.external_id
    }

    pub fn set_external_id(&mut self, id: u64) {
        self.external_id = id;
    }

    // ── Teams ────────────────────────────────────────────────────────────────

    pub fn team(&self, team: usize) -> Option<&Team> {
        self.teams.get(team)
    }

    pub fn set_team(&mut self, team: usize, name: &str, tag: Option<&str>) -> bool {
        if team > 1 {
            return false;
        }
        let name = name.trim();
        if self.teams[team].name != name {
            self.teams[team].name = name.to_string();
            self.emit(MatchChange::Team {
                team,
                name: name.to_string(),
            });
        }
        if let Some(tag) = tag {
            self.teams[team].tag = Some(tag.to_string());
        }
        true
    }

    /// Team name, or the set-0 player in solo mode.
    pub fn team_or_player(&self, team: usize) -> Option<&str> {
        if self.format.solo {
            self.player(team, 0).map(|p| p.name.as_str())
        } else {
            self.team(team).map(|t| t.name.as_str())
        }
    }

    /// -1 = team 1, 0 = neither, 1 = team 2.
    pub fn my_side(&self) -> i8 {
        self.my_side
    }

    pub fn set_my_side(&mut self, side: i8) -> bool {
        if !(-1..=1).contains(&side) {
            return false;
        }
        if self.my_side != side {
            self.my_side = side;
            self.emit(MatchChange::MySide { value: side });
        }
        true
    }

    /// Pick "my" side by fuzzy-matching team names against `my_teams`.
    /// Falls back to neutral unless exactly one team matches.
    pub fn auto_detect_my_side(&mut self, my_teams: &[String]) -> bool {
        let candidates: Vec<String> = my_teams.iter().map(|t| t.trim().to_lowercase()).collect();
        let matched: Vec<usize> = (0..2)
            .filter(|&idx| {
                let name = &self.teams[idx].name;
                !is_placeholder(name)
                    && fuzzy::closest_match(
                        &name.to_lowercase(),
                        candidates.iter().map(String::as_str),
                        MY_TEAM_CUTOFF,
                    )
                    .is_some()
            })
            .collect();

        if let [idx] = matched[..] {
            self.set_my_side(idx as i8 * 2 - 1);
            true
        } else {
            self.set_my_side(0);
            false
        }
    }

    pub fn is_swapped(&self) -> bool {
        self.swapped
    }

    /// Swap the two teams, mirroring scores, players, vetoes and my-side.
    pub fn swap_teams(&mut self) {
        info!("Swapping teams");
        self.swapped = !self.swapped;
        self.my_side = -self.my_side;
        self.teams.swap(0, 1);
        self.players.swap(0, 1);
        for set in self.sets.iter_mut() {
            set.score = -set.score;
        }
        for veto in self.vetoes.iter_mut() {
            veto.vetoing_side = 1 - veto.vetoing_side.min(1);
        }
        self.emit(MatchChange::Meta);
    }

    // ── Sets ─────────────────────────────────────────────────────────────────

    pub fn sets(&self) -> &[Set] {
        &self.sets
    }

    pub fn set(&self, set_index: usize) -> Option<&Set> {
        self.sets.get(set_index)
    }

    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    pub fn map_score(&self, set_index: usize) -> Option<i8> {
        self.sets.get(set_index).map(|s| s.score)
    }

    /// Write a set result. Without `overwrite` only an undecided set is
    /// written, so a late or duplicate live result never clobbers a manual
    /// correction. Returns whether the write was accepted.
    pub fn set_score(&mut self, set_index: usize, value: i8, overwrite: bool) -> bool {
        if !(-1..=1).contains(&value) {
            return false;
        }
        let Some(current) = self.sets.get(set_index).map(|s| s.score) else {
            return false;
        };
        if !overwrite && current != 0 {
            return false;
        }
        if current == value {
            return true;
        }

        let was_decided = self.is_decided();
        let old_best_of = self.best_of();
        self.sets[set_index].score = value;

        if self.is_decided() != was_decided {
            self.emit(MatchChange::Outcome {
                winner: self.winner(),
            });
        }
        let new_best_of = self.best_of();
        if new_best_of != old_best_of {
            self.emit(MatchChange::BestOf { value: new_best_of });
        }
        self.emit(MatchChange::Score { set_index, value });
        true
    }

    pub fn set_map(&mut self, set_index: usize, map: &str) -> bool {
        let Some(set) = self.sets.get_mut(set_index) else {
            return false;
        };
        if set.map != map {
            set.map = map.to_string();
            self.emit(MatchChange::Map {
                set_index,
                map: map.to_string(),
            });
        }
        true
    }

    pub fn set_label(&mut self, set_index: usize, label: &str) -> bool {
        let Some(set) = self.sets.get_mut(set_index) else {
            return false;
        };
        if set.label != label {
            set.label = label.to_string();
            self.emit(MatchChange::Label {
                set_index,
                label: label.to_string(),
            });
        }
        true
    }

    fn relabel(&mut self) {
        let ace_start = self.ace_start();
        let total = self.sets.len();
        for idx in 0..total {
            let label = format::label_for(idx, ace_start, total);
            self.set_label(idx, &label);
            self.sets[idx].is_ace = idx >= ace_start;
        }
    }

    // ── Players ──────────────────────────────────────────────────────────────

    pub fn player(&self, team: usize, set_index: usize) -> Option<&PlayerSlot> {
        self.players.get(team)?.get(set_index)
    }

    pub fn player_names(&self, team: usize) -> Vec<&str> {
        self.players
            .get(team)
            .map(|slots| slots.iter().map(|p| p.name.trim()).collect())
            .unwrap_or_default()
    }

    pub fn set_player(&mut self, team: usize, set_index: usize, name: &str, race: Option<Race>) -> bool {
        let Some(slot) = self.players.get_mut(team).and_then(|t| t.get_mut(set_index)) else {
            return false;
        };
        if slot.name != name {
            slot.name = name.to_string();
            self.emit(MatchChange::Player {
                team,
                set_index,
                name: name.to_string(),
            });
        }
        if let Some(race) = race {
            self.set_race(team, set_index, race);
        }
        true
    }

    pub fn set_race(&mut self, team: usize, set_index: usize, race: Race) -> bool {
        let Some(slot) = self.players.get_mut(team).and_then(|t| t.get_mut(set_index)) else {
            return false;
        };
        if slot.race != race {
            slot.race = race;
            self.emit(MatchChange::Race {
                team,
                set_index,
                race,
            });
        }
        true
    }

    /// Move the previous set's winner into the next set (all-kill format).
    ///
    /// Fills the winning team's slot of the first undecided set that follows a
    /// decided one, unless that slot already holds a real player name.
    pub fn all_kill_advance(&mut self) -> bool {
        if !self.format.all_kill {
            return false;
        }
        for idx in 1..self.sets.len() {
            if self.sets[idx].score != 0 {
                continue;
            }
            let previous = self.sets[idx - 1].score;
            if previous == 0 {
                continue;
            }
            let team = if previous < 0 { 0 } else { 1 };
            if !is_placeholder(&self.players[team][idx].name) {
                continue;
            }
            let winner = self.players[team][idx - 1].clone();
            debug!("All-kill: {} advances to set {}", winner.name, idx + 1);
            self.set_player(team, idx, &winner.name, Some(winner.race));
            return true;
        }
        false
    }

    pub fn next_set(&self) -> Option<usize> {
        self.sets.iter().position(|s| s.score == 0)
    }

    pub fn next_player(&self, team: usize) -> Option<&PlayerSlot> {
        self.next_set().and_then(|idx| self.player(team, idx))
    }

    // ── Vetoes ───────────────────────────────────────────────────────────────

    pub fn vetoes(&self) -> &[Veto] {
        &self.vetoes
    }

    pub fn veto(&self, index: usize) -> Option<&Veto> {
        self.vetoes.get(index)
    }

    /// Set a veto; `side = None` keeps the current vetoing side.
    pub fn set_veto(&mut self, index: usize, map: &str, side: Option<u8>) -> bool {
        if matches!(side, Some(s) if s > 1) {
            return false;
        }
        let Some(veto) = self.vetoes.get_mut(index) else {
            return false;
        };
        let side = side.unwrap_or(veto.vetoing_side);
        if veto.map != map || veto.vetoing_side != side {
            veto.map = map.to_string();
            veto.vetoing_side = side;
            self.emit(MatchChange::Veto {
                index,
                map: map.to_string(),
                side,
            });
        }
        true
    }

    pub fn was_map_played(&self, map: &str) -> bool {
        self.sets
            .iter()
            .any(|s| s.score != 0 && s.map.eq_ignore_ascii_case(map))
    }

    pub fn is_map_vetoed(&self, map: &str) -> bool {
        self.vetoes.iter().any(|v| v.map.eq_ignore_ascii_case(map))
    }

    // ── Derived score ────────────────────────────────────────────────────────

    /// `(team 1 wins, team 2 wins)`, recomputed from the sets on every call.
    pub fn score(&self) -> (u32, u32) {
        self.sets.iter().fold((0, 0), |(a, b), set| match set.score {
            s if s < 0 => (a + 1, b),
            s if s > 0 => (a, b + 1),
            _ => (a, b),
        })
    }

    pub fn best_of_raw(&self) -> u32 {
        self.format.best_of
    }

    /// Displayed (always odd) best-of.
    ///
    /// Even formats show one less until the trailing side reaches half of the
    /// regular sets, at which point the tie-break is in play and the whole set
    /// count is shown.
    pub fn best_of(&self) -> u32 {
        let best_of = self.format.best_of.max(1);
        if best_of % 2 == 1 {
            return best_of;
        }
        if self.tie_break_reached() {
            self.sets.len() as u32
        } else {
            best_of - 1
        }
    }

    fn tie_break_reached(&self) -> bool {
        let (a, b) = self.score();
        a.min(b) as usize >= self.ace_start() / 2
    }

    /// Set wins needed to take the match.
    pub fn wins_required(&self) -> u32 {
        let regular = self.ace_start();
        if self.tie_break_reached() {
            (self.sets.len() / 2 + 1) as u32
        } else {
            (regular / 2 + 1) as u32
        }
    }

    pub fn is_decided(&self) -> bool {
        let (a, b) = self.score();
        a.max(b) >= self.wins_required()
    }

    /// -1 team 1, 1 team 2, 0 while undecided.
    pub fn winner(&self) -> i8 {
        let (a, b) = self.score();
        if !self.is_decided() || a == b {
            0
        } else if a > b {
            -1
        } else {
            1
        }
    }

    // ── Reset / repair ───────────────────────────────────────────────────────

    /// Reset players, scores, maps, teams and vetoes to placeholders.
    pub fn reset(&mut self, reset_options: bool) {
        self.bulk_update(|m| {
            for team in 0..2 {
                for set_index in 0..m.sets.len() {
                    m.set_player(team, set_index, TBD, Some(Race::Random));
                }
                m.set_team(team, TBD, None);
                m.teams[team].tag = None;
            }
            for set_index in 0..m.sets.len() {
                m.set_score(set_index, 0, true);
                m.set_map(set_index, TBD);
            }
            m.relabel();
            for index in 0..m.vetoes.len() {
                m.set_veto(index, TBD, Some((index % 2) as u8));
            }
            m.set_league(TBD);
            m.swapped = false;
            m.set_my_side(0);
            if reset_options {
                m.format.all_kill = false;
                m.format.solo = false;
            }
        });
    }

    /// Restore the length and value invariants after deserializing
    /// externally-written data.
    pub fn repair(&mut self) {
        self.sets.truncate(MAX_SETS);
        let total = self.sets.len();
        for set in self.sets.iter_mut() {
            if !(-1..=1).contains(&set.score) {
                set.score = 0;
            }
        }
        for team in self.players.iter_mut() {
            team.resize_with(total, PlayerSlot::default);
        }
        if !(-1..=1).contains(&self.my_side) {
            self.my_side = 0;
        }
        let veto_count = self.format.veto_count as usize;
        self.vetoes.truncate(veto_count);
        while self.vetoes.len() < veto_count {
            let idx = self.vetoes.len();
            self.vetoes.push(Veto::placeholder(idx));
        }
        for veto in self.vetoes.iter_mut() {
            veto.vetoing_side = veto.vetoing_side.min(1);
        }
        self.min_sets = self.min_sets.min(total);
    }
}
