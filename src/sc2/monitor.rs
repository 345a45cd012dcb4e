//! Background poller for the local game client.
//!
//! ```text
//!   Idle ──reachable──▶ Polling ──two players──▶ TwoPlayerGame
//!    ▲                    ▲                           │
//!    └──── unreachable ───┴──── players left ─────────┘
//! ```
//!
//! Every cycle in `TwoPlayerGame` feeds the sample to a [`SnapshotTracker`],
//! which turns phase changes into [`GameEvent`]s on an mpsc channel. The loop
//! ends (state `Stopped`) once the cancellation token fires or every task in
//! the shared [`TaskFlags`] is switched off.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::client::GameStateSource;
use super::snapshot::LiveSnapshot;
use super::tasks::TaskFlags;

/// Granularity of stop checks while sleeping.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MonitorState {
    Idle,
    Polling,
    TwoPlayerGame,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GameEventKind {
    Started,
    Live,
    Decided,
}

#[derive(Debug, Clone)]
pub struct GameEvent {
    pub kind: GameEventKind,
    pub snapshot: LiveSnapshot,
    /// Last processed sample before this one; `None` on the first sample seen.
    pub previous: Option<LiveSnapshot>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub backoff: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        MonitorSettings {
            poll_interval: Duration::from_secs(1),
            backoff: Duration::from_secs(10),
        }
    }
}

/// Edge detection over consecutive samples.
#[derive(Debug, Default)]
pub struct SnapshotTracker {
    last: Option<LiveSnapshot>,
    last_live: bool,
}

impl SnapshotTracker {
    /// Events for `snapshot`. A sample is processed only if it differs from
    /// the last processed one or its live classification flipped (e.g. the
    /// loading screen closed).
    pub fn observe(&mut self, snapshot: LiveSnapshot) -> Vec<GameEvent> {
        let live = snapshot.is_live();
        let changed = self.last.as_ref() != Some(&snapshot);
        if !changed && live == self.last_live {
            return Vec::new();
        }

        let previous = self.last.replace(snapshot.clone());
        self.last_live = live;

        let mut kinds = Vec::with_capacity(2);
        if snapshot.is_decided() {
            kinds.push(GameEventKind::Decided);
        } else if live {
            if snapshot.is_starting() {
                kinds.push(GameEventKind::Started);
            }
            kinds.push(GameEventKind::Live);
        }

        let detected_at = Utc::now();
        kinds
            .into_iter()
            .map(|kind| GameEvent {
                kind,
                snapshot: snapshot.clone(),
                previous: previous.clone(),
                detected_at,
            })
            .collect()
    }
}

pub struct MonitorHandle {
    pub events: mpsc::Receiver<GameEvent>,
    pub state: watch::Receiver<MonitorState>,
    pub task: JoinHandle<()>,
}

/// Spawn the polling loop.
pub fn start_game_monitor(
    source: Arc<dyn GameStateSource>,
    settings: MonitorSettings,
    tasks: TaskFlags,
    cancel: CancellationToken,
) -> MonitorHandle {
    let (tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (state_tx, state) = watch::channel(MonitorState::Idle);

    let task = tokio::spawn(async move {
        info!(
            "Game monitor started ({}, interval={:?}, backoff={:?})",
            source.name(),
            settings.poll_interval,
            settings.backoff
        );
        let mut tracker = SnapshotTracker::default();

        loop {
            if cancel.is_cancelled() || !tasks.any_active() {
                break;
            }

            let fetched = tokio::select! {
                _ = cancel.cancelled() => break,
                res = source.fetch_snapshot() => res,
            };

            let delay = match fetched {
                Err(e) => {
                    set_state(&state_tx, MonitorState::Idle);
                    debug!("Game client unavailable: {:#}", e);
                    settings.backoff
                }
                Ok(None) => {
                    set_state(&state_tx, MonitorState::Polling);
                    settings.poll_interval
                }
                Ok(Some(snapshot)) => {
                    set_state(&state_tx, MonitorState::TwoPlayerGame);
                    for event in tracker.observe(snapshot) {
                        debug!("{:?}: {}", event.kind, event.snapshot.describe());
                        let sent = tokio::select! {
                            _ = cancel.cancelled() => false,
                            res = tx.send(event) => res.is_ok(),
                        };
                        if !sent {
                            set_state(&state_tx, MonitorState::Stopped);
                            info!("Game monitor stopped");
                            return;
                        }
                    }
                    settings.poll_interval
                }
            };

            if !pause(delay, &tasks, &cancel).await {
                break;
            }
        }

        set_state(&state_tx, MonitorState::Stopped);
        info!("Game monitor stopped");
    });

    MonitorHandle {
        events,
        state,
        task,
    }
}

fn set_state(tx: &watch::Sender<MonitorState>, next: MonitorState) {
    let changed = tx.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
    if changed {
        info!("Game monitor state: {:?}", next);
    }
}

/// Sleep for `delay`, waking early (and returning `false`) when the monitor
/// should stop.
async fn pause(delay: Duration, tasks: &TaskFlags, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if !tasks.any_active() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        let step = (deadline - now).min(STOP_CHECK_INTERVAL);
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(step) => {}
        }
    }
}
