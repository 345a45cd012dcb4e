//! Applies live game events to the active match.
//!
//! * `Decided` → write the set result once (never overwriting) and advance
//!   the winner in all-kill matches.
//! * `Live` → once the game window has focus, push the running match score
//!   into the client's observer UI and/or open the production tab.
//!
//! Nothing here is an error for the caster: unresolvable players, missing
//! focus or a failing OCR backend just mean this game is handled by hand.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::input::{crop_regions, InputInjector, OrderDetector};
use super::matcher::{SetResolution, SharedMatcher};
use super::monitor::{GameEvent, GameEventKind};
use super::snapshot::LiveSnapshot;
use super::tasks::{Task, TaskFlags};
use crate::matches::SharedRegistry;

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub tasks: TaskFlags,
    /// Skip toggling for (non-replay) games involving these players.
    pub blacklist: Vec<String>,
    pub use_ocr: bool,
    /// Run OCR even when the score is tied.
    pub force_ocr: bool,
    pub ocr_timeout: Duration,
    /// Fix a swapped on-screen order with the client's swap hotkey instead of
    /// sending the score mirrored.
    pub swap_in_client: bool,
    /// Show the in-game player name panel before OCR.
    pub toggle_player_names: bool,
    pub focus_poll_interval: Duration,
    pub focus_max_attempts: u32,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        ReconcilerSettings {
            tasks: TaskFlags::with(&[Task::UpdateScore]),
            blacklist: Vec::new(),
            use_ocr: false,
            force_ocr: false,
            ocr_timeout: Duration::from_secs(5),
            swap_in_client: false,
            toggle_player_names: false,
            focus_poll_interval: Duration::from_millis(100),
            focus_max_attempts: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    ScoreApplied {
        set_index: usize,
        value: i8,
        advanced: bool,
    },
    Toggled {
        set_index: Option<usize>,
        score: (u32, u32),
        best_of: u32,
        swapped_on_screen: bool,
    },
    Skipped {
        reason: &'static str,
    },
}

fn skipped(reason: &'static str) -> ReconcileOutcome {
    ReconcileOutcome::Skipped { reason }
}

pub struct ScoreReconciler {
    registry: SharedRegistry,
    matcher: SharedMatcher,
    injector: Arc<dyn InputInjector>,
    detector: Arc<dyn OrderDetector>,
    settings: ReconcilerSettings,
    cancel: CancellationToken,
    /// Last decided event written into a set.
    last_applied: Mutex<Option<(DateTime<Utc>, LiveSnapshot)>>,
}

impl ScoreReconciler {
    pub fn new(
        registry: SharedRegistry,
        matcher: SharedMatcher,
        injector: Arc<dyn InputInjector>,
        detector: Arc<dyn OrderDetector>,
        settings: ReconcilerSettings,
        cancel: CancellationToken,
    ) -> Self {
        ScoreReconciler {
            registry,
            matcher,
            injector,
            detector,
            settings,
            cancel,
            last_applied: Mutex::new(None),
        }
    }

    /// Consume events until the channel closes or the token is cancelled.
    pub async fn run(self, mut events: mpsc::Receiver<GameEvent>) {
        info!("Score reconciler started");
        loop {
            let event = tokio::select! {
                _ = self.cancel.cancelled() => break,
                ev = events.recv() => match ev {
                    Some(ev) => ev,
                    None => break,
                },
            };
            match self.handle(&event).await {
                ReconcileOutcome::Skipped { reason } => {
                    debug!("{:?} event skipped: {}", event.kind, reason)
                }
                outcome => info!("{:?} event handled: {:?}", event.kind, outcome),
            }
        }
        info!("Score reconciler stopped");
    }

    pub async fn handle(&self, event: &GameEvent) -> ReconcileOutcome {
        match event.kind {
            GameEventKind::Decided => self.apply_result(event).await,
            GameEventKind::Live => self.toggle(&event.snapshot).await,
            GameEventKind::Started => skipped("nothing to do on game start"),
        }
    }

    async fn apply_result(&self, event: &GameEvent) -> ReconcileOutcome {
        if !self.settings.tasks.is_active(Task::UpdateScore) {
            return skipped("score updates disabled");
        }
        if event.previous.is_none() {
            return skipped("no earlier sample of this game");
        }
        let snapshot = &event.snapshot;

        // Solo matches repeat the same pairing in every set, so a re-delivered
        // event would otherwise land in the next undecided one.
        let mut last_applied = self.last_applied.lock().await;
        if matches!(&*last_applied, Some((at, seen)) if *at == event.detected_at && seen == snapshot)
        {
            return skipped("result already applied");
        }

        let matcher = self.matcher.read().await;
        let mut registry = self.registry.write().await;
        let Some(m) = registry.active_mut() else {
            return skipped("no active match");
        };

        let candidates = matcher.resolve_candidates(snapshot, m, false);
        let Some(target) = candidates
            .iter()
            .find(|c| m.map_score(c.set_index) == Some(0))
        else {
            return skipped("no undecided set with these players");
        };

        let value = if target.in_order {
            snapshot.result.set_score()
        } else {
            -snapshot.result.set_score()
        };
        if value == 0 || !m.set_score(target.set_index, value, false) {
            return skipped("result not writable");
        }
        info!(
            "Set {} decided by live game: {} ({}, detected {})",
            target.set_index + 1,
            snapshot.describe(),
            value,
            event.detected_at.format("%H:%M:%S")
        );
        *last_applied = Some((event.detected_at, snapshot.clone()));
        let advanced = m.format().all_kill && m.all_kill_advance();

        ReconcileOutcome::ScoreApplied {
            set_index: target.set_index,
            value,
            advanced,
        }
    }

    fn is_blacklisted(&self, snapshot: &LiveSnapshot) -> bool {
        !snapshot.is_replay
            && snapshot
                .players()
                .iter()
                .any(|p| self.settings.blacklist.iter().any(|b| b == p))
    }

    async fn wait_for_focus(&self) -> bool {
        for _ in 0..self.settings.focus_max_attempts {
            if self.cancel.is_cancelled() || !self.settings.tasks.toggling() {
                return false;
            }
            if self.injector.is_game_focused().await {
                return true;
            }
            tokio::time::sleep(self.settings.focus_poll_interval).await;
        }
        false
    }

    async fn toggle(&self, snapshot: &LiveSnapshot) -> ReconcileOutcome {
        let tasks = &self.settings.tasks;
        if !tasks.toggling() {
            return skipped("toggling disabled");
        }
        if self.is_blacklisted(snapshot) {
            info!("Not toggling: blacklisted player in {}", snapshot.describe());
            return skipped("blacklisted player");
        }
        if !self.injector.is_supported() {
            return skipped("input injection unsupported");
        }
        if !self.wait_for_focus().await {
            return skipped("game window not focused");
        }

        let mut outcome = skipped("production tab only");
        if tasks.is_active(Task::ToggleScore) {
            outcome = self.toggle_score(snapshot).await;
        }
        if tasks.is_active(Task::ToggleProduction) {
            if let Err(e) = self.injector.toggle_production_tab().await {
                warn!("Failed to toggle production tab: {:#}", e);
            }
        }
        outcome
    }

    async fn toggle_score(&self, snapshot: &LiveSnapshot) -> ReconcileOutcome {
        if self.settings.toggle_player_names {
            if let Err(e) = self.injector.toggle_player_names().await {
                debug!("Failed to toggle player names: {:#}", e);
            }
        }

        // Read what we need and release the lock before OCR and keystrokes.
        let (resolution, score, best_of) = {
            let matcher = self.matcher.read().await;
            let registry = self.registry.read().await;
            let Some(m) = registry.active() else {
                return skipped("no active match");
            };
            (matcher.resolve_set(snapshot, m, true), m.score(), m.best_of())
        };

        let swapped_on_screen = self.screen_order_swapped(snapshot, score).await;

        let (team1, team2) = match resolution {
            Some(SetResolution { in_order, .. }) => {
                let mut in_order = in_order;
                if swapped_on_screen {
                    if self.settings.swap_in_client {
                        if let Err(e) = self.injector.swap_player_order().await {
                            warn!("Failed to swap player order: {:#}", e);
                        }
                    } else {
                        in_order = !in_order;
                    }
                }
                if in_order {
                    score
                } else {
                    (score.1, score.0)
                }
            }
            None => (0, 0),
        };

        if let Err(e) = self.injector.apply_score(team1, team2, best_of).await {
            warn!("Failed to apply score in client: {:#}", e);
            return skipped("keystrokes failed");
        }
        ReconcileOutcome::Toggled {
            set_index: resolution.map(|r| r.set_index),
            score: (team1, team2),
            best_of,
            swapped_on_screen,
        }
    }

    /// OCR tie-break on the on-screen player order. A tied score reads the
    /// same either way round, so it is only checked when forced.
    async fn screen_order_swapped(&self, snapshot: &LiveSnapshot, score: (u32, u32)) -> bool {
        if !self.settings.use_ocr {
            return false;
        }
        if score.0 == score.1 && !self.settings.force_ocr {
            return false;
        }

        let players = snapshot.players();
        for region in crop_regions(self.settings.toggle_player_names) {
            let detection = tokio::time::timeout(
                self.settings.ocr_timeout,
                self.detector.detect_order(players, region),
            )
            .await;
            match detection {
                Ok(Ok(d)) if d.found => {
                    info!("OCR found players in {:?} (swapped={})", region, d.swapped);
                    return d.swapped;
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!("OCR failed: {:#}", e),
                Err(_) => debug!("OCR timed out after {:?}", self.settings.ocr_timeout),
            }
        }
        info!("OCR did not find {} and {}", players[0], players[1]);
        false
    }
}
