//! Aggregate queries over a run's outcomes
//!
//! Everything here is a pure function of the outcome slice. Counters are
//! recomputed on every call rather than tracked incrementally.

use crate::outcome::ConversionOutcome;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Run-level counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub modified: usize,
    pub unchanged: usize,
}

impl RunSummary {
    pub fn line(&self) -> String {
        format!(
            "Total: {}, Succeeded: {}, Failed: {}, Modified: {}, Unchanged: {}",
            self.total, self.succeeded, self.failed, self.modified, self.unchanged
        )
    }
}

/// Count outcomes
pub fn summarize(outcomes: &[ConversionOutcome]) -> RunSummary {
    let total = outcomes.len();
    let succeeded = outcomes.iter().filter(|o| o.succeeded()).count();
    let modified = outcomes
        .iter()
        .filter(|o| o.succeeded() && o.changed())
        .count();

    RunSummary {
        total,
        succeeded,
        failed: total - succeeded,
        modified,
        unchanged: succeeded - modified,
    }
}

/// Outcomes that did not succeed, in run order
pub fn failures(outcomes: &[ConversionOutcome]) -> Vec<&ConversionOutcome> {
    outcomes.iter().filter(|o| !o.succeeded()).collect()
}

/// Paths of files whose content changed, in run order
pub fn modified_paths(outcomes: &[ConversionOutcome]) -> Vec<&Path> {
    outcomes
        .iter()
        .filter(|o| o.changed())
        .map(|o| o.path())
        .collect()
}
