use serde::{Deserialize, Serialize};

use crate::matches::Race;

const STARTING_WINDOW_SECS: u32 = 5;
const LIVE_WINDOW_SECS: u32 = 30;
/// Results reported before this point come from loading screens or replay seeking.
const DECIDED_FLOOR_SECS: u32 = 60;

/// Outcome from player 1's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GameResult {
    #[default]
    Undecided,
    Player1Won,
    Player1Lost,
    Unknown,
}

impl GameResult {
    fn from_client(result: &str) -> GameResult {
        match result {
            "Victory" => GameResult::Player1Won,
            "Defeat" => GameResult::Player1Lost,
            "Undecided" => GameResult::Undecided,
            _ => GameResult::Unknown,
        }
    }

    /// Set score for a set whose configured order matches the client's.
    pub fn set_score(&self) -> i8 {
        match self {
            GameResult::Player1Won => -1,
            GameResult::Player1Lost => 1,
            _ => 0,
        }
    }
}

/// `GET /game` body of the local client API.
#[derive(Debug, Clone, Deserialize)]
pub struct GameResponse {
    #[serde(default)]
    pub players: Vec<ClientPlayer>,
    #[serde(rename = "displayTime", default)]
    pub display_time: f64,
    #[serde(rename = "isReplay", default)]
    pub is_replay: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientPlayer {
    pub name: String,
    #[serde(default)]
    pub race: String,
    #[serde(default)]
    pub result: String,
}

/// `GET /ui` body of the local client API.
#[derive(Debug, Clone, Deserialize)]
pub struct UiResponse {
    #[serde(rename = "activeScreens", default)]
    pub active_screens: Vec<serde_json::Value>,
}

/// One polled sample of a two-player game.
///
/// Equality ignores elapsed time, replay and overlay state: two samples of the
/// same game phase compare equal however far apart they were taken.
#[derive(Debug, Clone, Serialize)]
pub struct LiveSnapshot {
    pub player1: String,
    pub player2: String,
    pub race1: Race,
    pub race2: Race,
    pub elapsed_seconds: u32,
    pub is_replay: bool,
    pub in_active_gameplay: bool,
    pub result: GameResult,
}

impl PartialEq for LiveSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.player1 == other.player1
            && self.player2 == other.player2
            && self.race1 == other.race1
            && self.race2 == other.race2
            && self.result == other.result
    }
}

impl LiveSnapshot {
    /// `None` unless exactly two players are present.
    pub fn from_responses(game: &GameResponse, ui: &UiResponse) -> Option<LiveSnapshot> {
        let [p1, p2] = game.players.as_slice() else {
            return None;
        };
        Some(LiveSnapshot {
            player1: p1.name.clone(),
            player2: p2.name.clone(),
            race1: Race::parse(&p1.race),
            race2: Race::parse(&p2.race),
            elapsed_seconds: game.display_time.max(0.0) as u32,
            is_replay: game.is_replay,
            in_active_gameplay: ui.active_screens.is_empty(),
            result: GameResult::from_client(&p1.result),
        })
    }

    pub fn players(&self) -> [&str; 2] {
        [&self.player1, &self.player2]
    }

    pub fn is_starting(&self) -> bool {
        self.in_active_gameplay
            && self.result == GameResult::Undecided
            && self.elapsed_seconds < STARTING_WINDOW_SECS
    }

    pub fn is_live(&self) -> bool {
        self.in_active_gameplay
            && self.result == GameResult::Undecided
            && self.elapsed_seconds < LIVE_WINDOW_SECS
    }

    pub fn is_decided(&self) -> bool {
        matches!(self.result, GameResult::Player1Won | GameResult::Player1Lost)
            && self.elapsed_seconds > DECIDED_FLOOR_SECS
    }

    pub fn describe(&self) -> String {
        format!(
            "{} ({}) vs {} ({})",
            self.player1,
            self.race1.as_str(),
            self.player2,
            self.race2.as_str()
        )
    }
}

#[cfg(test)]
pub(crate) fn test_snapshot(p1: &str, p2: &str, result: GameResult, elapsed: u32) -> LiveSnapshot {
    LiveSnapshot {
        player1: p1.to_string(),
        player2: p2.to_string(),
        race1: Race::Zerg,
        race2: Race::Terran,
        elapsed_seconds: elapsed,
        is_replay: false,
        in_active_gameplay: true,
        result,
    }
}
