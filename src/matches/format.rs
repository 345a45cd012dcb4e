//! Best-of-N set arithmetic.
//!
//! A match has a block of regular sets followed by an ace block. Without an
//! explicit ace extension the ace block is the single trailing set that breaks
//! a tie, so the total is always odd. With an extension of `k` sets the regular
//! block is the best-of rounded down to an even count and the ace block is a
//! mini best-of-`k` of its own.

use serde::{Deserialize, Serialize};

/// Upper bound on the number of sets a match may hold.
pub const MAX_SETS: usize = 21;

/// Format parameters of a match. Replaced wholesale, never patched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatConfig {
    pub best_of: u32,
    pub all_kill: bool,
    pub solo: bool,
    /// Number of ace sets; 0 means a single implicit tie-break set.
    pub ace_extension: u32,
    pub veto_count: u32,
}

impl Default for FormatConfig {
    fn default() -> Self {
        FormatConfig {
            best_of: 5,
            all_kill: false,
            solo: false,
            ace_extension: 0,
            veto_count: 0,
        }
    }
}

impl FormatConfig {
    pub fn layout(&self) -> SetLayout {
        compute_sets(self.best_of, self.ace_extension)
    }
}

/// Result of [`compute_sets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetLayout {
    pub total_sets: usize,
    pub ace_start: usize,
}

impl SetLayout {
    pub fn regular_sets(&self) -> usize {
        self.ace_start
    }

    pub fn ace_sets(&self) -> usize {
        self.total_sets - self.ace_start
    }
}

/// Compute the number of sets and where the ace block starts.
pub fn compute_sets(best_of: u32, ace_extension: u32) -> SetLayout {
    let best_of = (best_of.max(1) as usize).min(MAX_SETS);
    let ace = ace_extension as usize;

    let total_sets = if ace > 0 {
        let regular = best_of - best_of % 2;
        regular + ace
    } else if best_of % 2 == 1 {
        best_of
    } else {
        best_of + 1
    };
    let total_sets = total_sets.min(MAX_SETS);
    let ace_start = total_sets.saturating_sub(ace.max(1));

    SetLayout {
        total_sets,
        ace_start,
    }
}

/// Minimum number of sets that will be played, in `[1, total_sets]`.
///
/// A sweep of the regular block ends the match, so an ace block never raises
/// the minimum: the regular block is `best_of` rounded down to even, which
/// needs the same `best_of / 2 + 1` wins.
pub fn compute_min_sets(total_sets: usize, best_of: u32) -> usize {
    let min_sets = best_of.max(1) as usize / 2 + 1;
    min_sets.clamp(1, total_sets.max(1))
}

pub fn label_for(index: usize, ace_start: usize, total_sets: usize) -> String {
    if index < ace_start {
        return format!("Map {}", index + 1);
    }
    if total_sets.saturating_sub(ace_start) <= 1 {
        "Ace Map".to_string()
    } else {
        format!("Ace Map {}", index - ace_start + 1)
    }
}

pub fn labels(layout: SetLayout) -> Vec<String> {
    (0..layout.total_sets)
        .map(|idx| label_for(idx, layout.ace_start, layout.total_sets))
        .collect()
}
