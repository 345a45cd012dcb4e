pub mod client;
pub mod input;
pub mod matcher;
pub mod monitor;
pub mod reconciler;
pub mod snapshot;
pub mod tasks;

pub use client::HttpGameClient;
pub use input::{InputInjector, OrderDetector};
pub use matcher::PlayerMatcher;
pub use monitor::{start_game_monitor, MonitorSettings, MonitorState};
pub use reconciler::{ReconcilerSettings, ScoreReconciler};
pub use tasks::{Task, TaskFlags};
