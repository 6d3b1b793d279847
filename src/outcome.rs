//! Per-file conversion outcome

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which stage produced the content an outcome reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Primary,
    Enhancement,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Primary => write!(f, "primary"),
            StageKind::Enhancement => write!(f, "enhancement"),
        }
    }
}

/// Result of one conversion attempt on one file
///
/// Outcomes are built once and never modified; `changed` is derived at
/// construction so it cannot drift from the two content snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutcome {
    path: PathBuf,
    succeeded: bool,
    original_content: String,
    produced_content: String,
    changed: bool,
    diagnostic: Option<String>,
    stage: Option<StageKind>,
}

impl ConversionOutcome {
    /// A completed conversion, optionally carrying a non-fatal warning
    pub fn success(
        path: PathBuf,
        original_content: String,
        produced_content: String,
        stage: StageKind,
        warning: Option<String>,
    ) -> Self {
        let changed = content_changed(&original_content, &produced_content);
        Self {
            path,
            succeeded: true,
            original_content,
            produced_content,
            changed,
            diagnostic: warning,
            stage: Some(stage),
        }
    }

    /// A failed conversion; never counts as changed
    pub fn failure(
        path: PathBuf,
        original_content: String,
        produced_content: String,
        stage: Option<StageKind>,
        diagnostic: String,
    ) -> Self {
        Self {
            path,
            succeeded: false,
            original_content,
            produced_content,
            changed: false,
            diagnostic: Some(diagnostic),
            stage,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn original_content(&self) -> &str {
        &self.original_content
    }

    pub fn produced_content(&self) -> &str {
        &self.produced_content
    }

    /// Warning on success, error text on failure
    pub fn diagnostic(&self) -> Option<&str> {
        self.diagnostic.as_deref()
    }

    /// Stage whose content the outcome surfaces
    pub fn stage(&self) -> Option<StageKind> {
        self.stage
    }
}

/// Compare two file snapshots, ignoring trailing whitespace only
pub fn content_changed(before: &str, after: &str) -> bool {
    before.trim_end() != after.trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_changed_ignores_trailing_whitespace() {
        assert!(!content_changed("x = 1\n", "x = 1"));
        assert!(!content_changed("x = 1", "x = 1\n\n  \t"));
        assert!(content_changed("  x = 1", "x = 1"));
        assert!(content_changed("print 'a'\n", "print('a')\n"));
    }

    #[test]
    fn test_success_derives_changed() {
        let changed = ConversionOutcome::success(
            "a.py".into(),
            "print 'a'\n".into(),
            "print('a')\n".into(),
            StageKind::Primary,
            None,
        );
        assert!(changed.succeeded());
        assert!(changed.changed());
        assert_eq!(changed.stage(), Some(StageKind::Primary));

        let same = ConversionOutcome::success(
            "b.py".into(),
            "print('b')\n".into(),
            "print('b')".into(),
            StageKind::Enhancement,
            Some("warning".into()),
        );
        assert!(!same.changed());
        assert_eq!(same.diagnostic(), Some("warning"));
    }

    #[test]
    fn test_failure_is_never_changed() {
        let outcome = ConversionOutcome::failure(
            "c.py".into(),
            "old".into(),
            "half written".into(),
            Some(StageKind::Primary),
            "2to3 failed: bad input".into(),
        );
        assert!(!outcome.succeeded());
        assert!(!outcome.changed());
        assert_eq!(outcome.diagnostic(), Some("2to3 failed: bad input"));
    }
}
