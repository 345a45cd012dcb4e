pub mod format;
pub mod model;
pub mod presets;
pub mod registry;
pub mod store;

pub use format::FormatConfig;
pub use model::{Match, Provider, Race, TBD};
pub use registry::{MatchId, SharedRegistry};
