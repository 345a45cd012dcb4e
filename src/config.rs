use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::alias::AliasTable;
use crate::sc2::{MonitorSettings, PlayerMatcher, ReconcilerSettings, Task, TaskFlags};

/// StarCraft II best-of-N match tracker with live game-client score sync
#[derive(Parser, Debug, Clone)]
#[command(name = "sc2-match-sync", version, about)]
pub struct Config {
    /// Match registry state file (JSON)
    #[arg(long, env = "STATE_FILE", default_value = "matches.json")]
    pub state_file: PathBuf,

    /// Player/team alias file (JSON)
    #[arg(long, env = "ALIAS_FILE", default_value = "alias.json")]
    pub alias_file: PathBuf,

    /// Status API listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "127.0.0.1:8080")]
    pub dashboard_addr: String,

    /// Base URL of the game client's local API
    #[arg(long, env = "GAME_CLIENT_URL", default_value = "http://localhost:6119")]
    pub game_client_url: String,

    /// Game client polling interval in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", default_value = "1000")]
    pub poll_interval_ms: u64,

    /// Wait after the game client was unreachable, in seconds
    #[arg(long, env = "BACKOFF_SECS", default_value = "10")]
    pub backoff_secs: u64,

    /// Game client request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "30")]
    pub request_timeout_secs: u64,

    /// Compare player names by similarity instead of equality
    #[arg(long, env = "FUZZY_MATCH", default_value_t = true, action = ArgAction::Set)]
    pub fuzzy_match: bool,

    /// Similarity (0.0-1.0) at which two player names are considered equal
    #[arg(long, env = "MATCH_THRESHOLD", default_value = "0.75")]
    pub match_threshold: f64,

    /// Comma-separated names of the caster's own teams
    #[arg(
        long,
        env = "MY_TEAMS",
        value_delimiter = ',',
        default_value = "MiXed Minds,team pheeniX"
    )]
    pub my_teams: Vec<String>,

    /// Write decided game results into the active match
    #[arg(long, env = "UPDATE_SCORE", default_value_t = true, action = ArgAction::Set)]
    pub update_score: bool,

    /// Push the match score into the game UI when a game starts
    #[arg(long, env = "TOGGLE_SCORE", default_value = "false")]
    pub toggle_score: bool,

    /// Open the production tab when a game starts
    #[arg(long, env = "TOGGLE_PRODUCTION", default_value = "false")]
    pub toggle_production: bool,

    /// Command used to send keystrokes to the game (receives the key combo)
    #[arg(long, env = "KEYSTROKE_COMMAND")]
    pub keystroke_command: Option<String>,

    /// Command printing the foreground window title
    #[arg(long, env = "FOCUS_COMMAND")]
    pub focus_command: Option<String>,

    /// Interval between focus checks in milliseconds
    #[arg(long, env = "FOCUS_POLL_MS", default_value = "100")]
    pub focus_poll_ms: u64,

    /// Focus checks before giving up on a toggle
    #[arg(long, env = "FOCUS_MAX_ATTEMPTS", default_value = "600")]
    pub focus_max_attempts: u32,

    /// Detect the on-screen player order with OCR
    #[arg(long, env = "USE_OCR", default_value = "false")]
    pub use_ocr: bool,

    /// Run OCR even when the score is tied
    #[arg(long, env = "FORCE_OCR", default_value = "false")]
    pub force_ocr: bool,

    /// OCR command (receives x1 x2 y1 y2 screen fractions, prints text)
    #[arg(long, env = "OCR_COMMAND")]
    pub ocr_command: Option<String>,

    /// Timeout per OCR region in seconds
    #[arg(long, env = "OCR_TIMEOUT_SECS", default_value = "5")]
    pub ocr_timeout_secs: u64,

    /// Fix a swapped on-screen order with the client's swap hotkey
    #[arg(long, env = "SWAP_IN_CLIENT", default_value = "false")]
    pub swap_in_client: bool,

    /// Show the in-game player names panel before OCR
    #[arg(long, env = "TOGGLE_PLAYER_NAMES", default_value = "false")]
    pub toggle_player_names: bool,

    /// Comma-separated players whose games are never toggled
    #[arg(long, env = "BLACKLIST", value_delimiter = ',')]
    pub blacklist: Vec<String>,

    /// Match URL to grab into the active match on startup
    #[arg(long, env = "MATCH_URL")]
    pub match_url: Option<String>,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.match_threshold) {
            anyhow::bail!("match_threshold must be between 0.0 and 1.0");
        }
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be positive");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be positive");
        }
        if self.ocr_timeout_secs == 0 {
            anyhow::bail!("ocr_timeout_secs must be positive");
        }
        if self.use_ocr && self.ocr_command.is_none() {
            anyhow::bail!("OCR_COMMAND is required with --use-ocr");
        }
        if (self.toggle_score || self.toggle_production) && self.keystroke_command.is_none() {
            anyhow::bail!("KEYSTROKE_COMMAND is required to toggle score or production tab");
        }
        url::Url::parse(&self.game_client_url)
            .map_err(|e| anyhow::anyhow!("invalid game_client_url: {}", e))?;
        Ok(())
    }

    pub fn task_flags(&self) -> TaskFlags {
        let flags = TaskFlags::default();
        flags.set(Task::UpdateScore, self.update_score);
        flags.set(Task::ToggleScore, self.toggle_score);
        flags.set(Task::ToggleProduction, self.toggle_production);
        flags
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            backoff: Duration::from_secs(self.backoff_secs),
        }
    }

    pub fn reconciler_settings(&self, tasks: TaskFlags) -> ReconcilerSettings {
        ReconcilerSettings {
            tasks,
            blacklist: self.blacklist.iter().map(|p| p.trim().to_string()).collect(),
            use_ocr: self.use_ocr,
            force_ocr: self.force_ocr,
            ocr_timeout: Duration::from_secs(self.ocr_timeout_secs),
            swap_in_client: self.swap_in_client,
            toggle_player_names: self.toggle_player_names,
            focus_poll_interval: Duration::from_millis(self.focus_poll_ms),
            focus_max_attempts: self.focus_max_attempts,
        }
    }

    pub fn player_matcher(&self, aliases: AliasTable) -> PlayerMatcher {
        PlayerMatcher::new(self.fuzzy_match, self.match_threshold, aliases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["sc2-match-sync"]);
        config.validate().expect("defaults are valid");
        assert!(config.fuzzy_match);
        assert_eq!(config.my_teams, vec!["MiXed Minds", "team pheeniX"]);
        let tasks = config.task_flags();
        assert!(tasks.is_active(Task::UpdateScore));
        assert!(!tasks.toggling());
    }

    #[test]
    fn test_toggle_requires_keystroke_command() {
        let config = Config::parse_from(["sc2-match-sync", "--toggle-score"]);
        assert!(config.validate().is_err());

        let config = Config::parse_from([
            "sc2-match-sync",
            "--toggle-score",
            "--keystroke-command",
            "sc2-keys",
        ]);
        config.validate().expect("valid");
    }

    #[test]
    fn test_bool_flags_accept_values() {
        let config = Config::parse_from([
            "sc2-match-sync",
            "--fuzzy-match",
            "false",
            "--update-score",
            "false",
            "--blacklist",
            "Serral, Maru",
        ]);
        assert!(!config.fuzzy_match);
        assert!(!config.task_flags().any_active());
        assert_eq!(
            config.reconciler_settings(config.task_flags()).blacklist,
            vec!["Serral", "Maru"]
        );
    }

    #[test]
    fn test_invalid_threshold() {
        let config = Config::parse_from(["sc2-match-sync", "--match-threshold", "1.5"]);
        assert!(config.validate().is_err());
    }
}
