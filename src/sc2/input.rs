//! Capabilities the reconciler drives in the game client: keystrokes and
//! on-screen player order detection.
//!
//! Both come with a no-op implementation and an implementation that shells
//! out to a user-supplied command, so the reconciler never depends on a
//! particular OS mechanism.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use crate::fuzzy;

/// Window title of the game client.
const GAME_WINDOW_TITLE: &str = "starcraft ii";
/// Minimum token similarity for an OCR hit.
const OCR_TOKEN_THRESHOLD: f64 = 0.35;

#[async_trait]
pub trait InputInjector: Send + Sync {
    fn is_supported(&self) -> bool;
    async fn is_game_focused(&self) -> bool;
    async fn apply_score(&self, team1: u32, team2: u32, best_of: u32) -> Result<()>;
    async fn toggle_production_tab(&self) -> Result<()>;
    async fn swap_player_order(&self) -> Result<()>;
    async fn toggle_player_names(&self) -> Result<()>;
}

/// For platforms without keystroke injection.
pub struct NoopInjector;

#[async_trait]
impl InputInjector for NoopInjector {
    fn is_supported(&self) -> bool {
        false
    }

    async fn is_game_focused(&self) -> bool {
        false
    }

    async fn apply_score(&self, _team1: u32, _team2: u32, _best_of: u32) -> Result<()> {
        Ok(())
    }

    async fn toggle_production_tab(&self) -> Result<()> {
        Ok(())
    }

    async fn swap_player_order(&self) -> Result<()> {
        Ok(())
    }

    async fn toggle_player_names(&self) -> Result<()> {
        Ok(())
    }
}

/// In-game observer hotkeys for showing a score of `team1:team2` in a best-of.
///
/// Best-of 3 is the client's default and 0 wins need no key press.
pub fn score_keystrokes(team1: u32, team2: u32, best_of: u32) -> Vec<String> {
    let mut keys = Vec::new();
    if best_of != 3 {
        keys.push(format!("ctrl+shift+{}", best_of));
    }
    if team2 != 0 {
        keys.push(format!("ctrl+{}", team2));
    }
    if team1 != 0 {
        keys.push(format!("shift+{}", team1));
    }
    keys
}

/// Sends keystrokes by running `program <keys>` (e.g. an `xdotool key`
/// wrapper). Focus is checked with an optional command that prints the
/// foreground window title.
pub struct CommandInjector {
    program: String,
    focus_program: Option<String>,
}

impl CommandInjector {
    pub fn new(program: &str, focus_program: Option<&str>) -> Self {
        CommandInjector {
            program: program.to_string(),
            focus_program: focus_program.map(str::to_string),
        }
    }

    async fn send(&self, keys: &str) -> Result<()> {
        debug!("Sending keys {}", keys);
        let status = Command::new(&self.program)
            .arg(keys)
            .status()
            .await
            .with_context(|| format!("Failed to run {}", self.program))?;
        if !status.success() {
            anyhow::bail!("{} exited with {}", self.program, status);
        }
        Ok(())
    }
}

#[async_trait]
impl InputInjector for CommandInjector {
    fn is_supported(&self) -> bool {
        true
    }

    async fn is_game_focused(&self) -> bool {
        let Some(program) = &self.focus_program else {
            return true;
        };
        match Command::new(program).output().await {
            Ok(out) => String::from_utf8_lossy(&out.stdout).trim().to_lowercase() == GAME_WINDOW_TITLE,
            Err(e) => {
                debug!("Focus check failed: {}", e);
                false
            }
        }
    }

    async fn apply_score(&self, team1: u32, team2: u32, best_of: u32) -> Result<()> {
        for keys in score_keystrokes(team1, team2, best_of) {
            self.send(&keys).await?;
        }
        Ok(())
    }

    async fn toggle_production_tab(&self) -> Result<()> {
        self.send("d").await
    }

    async fn swap_player_order(&self) -> Result<()> {
        self.send("ctrl+x").await
    }

    async fn toggle_player_names(&self) -> Result<()> {
        self.send("ctrl+n").await
    }
}

/// Screen rectangle as fractions of width (`x1..x2`) and height (`y1..y2`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CropRegion {
    pub x1: f64,
    pub x2: f64,
    pub y1: f64,
    pub y2: f64,
}

impl CropRegion {
    pub const FULL_SCREEN: CropRegion = CropRegion::new(0.0, 1.0, 0.0, 1.0);

    pub const fn new(x1: f64, x2: f64, y1: f64, y2: f64) -> Self {
        CropRegion { x1, x2, y1, y2 }
    }
}

/// Where to look for player names, most likely first. With the in-game name
/// panel toggled on, the top bar is tried before the bottom corners.
pub fn crop_regions(player_names_shown: bool) -> Vec<CropRegion> {
    let top = CropRegion::new(0.3, 0.7, 0.0, 0.08);
    let top_tall = CropRegion::new(0.3, 0.7, 0.0, 0.14);
    let bottom = CropRegion::new(0.12, 0.35, 0.88, 1.0);
    let bottom_wide = CropRegion::new(0.1, 0.4, 0.8, 1.0);

    let mut regions = if player_names_shown {
        vec![top, top_tall, bottom, bottom_wide]
    } else {
        vec![bottom, bottom_wide, top]
    };
    regions.push(CropRegion::FULL_SCREEN);
    regions
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OrderDetection {
    pub found: bool,
    pub swapped: bool,
}

#[async_trait]
pub trait OrderDetector: Send + Sync {
    async fn detect_order(&self, players: [&str; 2], region: CropRegion) -> Result<OrderDetection>;
}

pub struct NoopOrderDetector;

#[async_trait]
impl OrderDetector for NoopOrderDetector {
    async fn detect_order(&self, _players: [&str; 2], _region: CropRegion) -> Result<OrderDetection> {
        Ok(OrderDetection::default())
    }
}

/// Locate both players among the whitespace-separated tokens of `text` and
/// report whether player 2 appears before player 1.
pub fn detect_order_in_text(text: &str, players: [&str; 2]) -> OrderDetection {
    let mut best_ratio = [0.0f64; 2];
    let mut position: [Option<usize>; 2] = [None, None];

    for (token_idx, token) in text.split_whitespace().enumerate() {
        let token = strip_tags(token).to_lowercase();
        for (player_idx, player) in players.iter().enumerate() {
            let ratio = fuzzy::similarity(&token, &player.to_lowercase());
            if ratio >= OCR_TOKEN_THRESHOLD.max(best_ratio[player_idx]) {
                best_ratio[player_idx] = ratio;
                position[player_idx] = Some(token_idx);
            }
        }
    }

    match position {
        [Some(p1), Some(p2)] => OrderDetection {
            found: true,
            swapped: p1 > p2,
        },
        _ => OrderDetection::default(),
    }
}

/// Remove `<...>` markup (clan tags rendered as rich text).
fn strip_tags(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut depth = 0usize;
    for c in token.chars() {
        match c {
            '<' => depth += 1,
            '>' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// Text recognition over a screen region.
#[async_trait]
pub trait ScreenReader: Send + Sync {
    async fn read_text(&self, region: CropRegion) -> Result<String>;
}

/// [`ScreenReader`] running `program x1 x2 y1 y2` and reading its stdout.
pub struct CommandScreenReader {
    program: String,
}

impl CommandScreenReader {
    pub fn new(program: &str) -> Self {
        CommandScreenReader {
            program: program.to_string(),
        }
    }
}

#[async_trait]
impl ScreenReader for CommandScreenReader {
    async fn read_text(&self, region: CropRegion) -> Result<String> {
        let out = Command::new(&self.program)
            .args([region.x1, region.x2, region.y1, region.y2].map(|v| v.to_string()))
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to run OCR command {}", self.program))?;
        if !out.status.success() {
            anyhow::bail!("OCR command exited with {}", out.status);
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }
}

/// [`OrderDetector`] over any text-producing [`ScreenReader`].
pub struct TextOrderDetector<R> {
    reader: R,
}

impl<R: ScreenReader> TextOrderDetector<R> {
    pub fn new(reader: R) -> Self {
        TextOrderDetector { reader }
    }
}

#[async_trait]
impl<R: ScreenReader> OrderDetector for TextOrderDetector<R> {
    async fn detect_order(&self, players: [&str; 2], region: CropRegion) -> Result<OrderDetection> {
        let text = self.reader.read_text(region).await?;
        Ok(detect_order_in_text(&text, players))
    }
}
