//! Conversion stages
//!
//! A stage rewrites one file in place and reports what it produced.
//! Two adapters are provided:
//! - [`ExternalTool`]: runs a discovered converter executable or module
//! - [`InProcessStage`]: applies a Rust text transform directly

pub mod discovery;
pub mod tool;

pub use discovery::{DiscoveryStrategy, ResolvedTool, ToolDiscovery, ToolLocation};
pub use tool::ExternalTool;

use crate::error::Result;
use std::fs;
use std::path::Path;
use tracing::debug;

/// What a single stage invocation produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub succeeded: bool,
    /// File content after the stage ran
    pub produced_content: String,
    pub diagnostic: Option<String>,
}

impl StageResult {
    pub fn success(produced_content: String) -> Self {
        Self {
            succeeded: true,
            produced_content,
            diagnostic: None,
        }
    }

    pub fn failure(produced_content: String, diagnostic: String) -> Self {
        Self {
            succeeded: false,
            produced_content,
            diagnostic: Some(diagnostic),
        }
    }
}

/// One in-place transformation of a file
///
/// `Ok` with `succeeded == false` is a tool-level failure (bad input, non-zero
/// exit). `Err` means the stage could not run at all.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, path: &Path) -> Result<StageResult>;
}

/// Signature of an in-process transform: source text in, converted text out
pub type TransformFn = dyn Fn(&str) -> std::result::Result<String, String> + Send + Sync;

/// Stage backed by a Rust function instead of an external process
pub struct InProcessStage {
    name: String,
    transform: Box<TransformFn>,
}

impl InProcessStage {
    pub fn new<F>(name: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<String, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            transform: Box::new(transform),
        }
    }
}

impl std::fmt::Debug for InProcessStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessStage")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Stage for InProcessStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, path: &Path) -> Result<StageResult> {
        let source = fs::read_to_string(path)?;
        match (self.transform)(&source) {
            Ok(converted) => {
                if converted != source {
                    fs::write(path, &converted)?;
                }
                debug!(stage = %self.name, path = %path.display(), "In-process stage finished");
                Ok(StageResult::success(converted))
            }
            Err(message) => Ok(StageResult::failure(
                source,
                format!("{} failed: {}", self.name, message),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_in_process_stage_rewrites_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.py");
        fs::write(&file, "print 'hi'\n").unwrap();

        let stage = InProcessStage::new("quote", |s: &str| Ok(s.replace('\'', "\"")));
        let result = stage.run(&file).unwrap();

        assert!(result.succeeded);
        assert_eq!(result.produced_content, "print \"hi\"\n");
        assert_eq!(fs::read_to_string(&file).unwrap(), "print \"hi\"\n");
    }

    #[test]
    fn test_in_process_stage_failure_keeps_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.py");
        fs::write(&file, "def (\n").unwrap();

        let stage = InProcessStage::new("strict", |_: &str| Err("bad input: line 1".to_string()));
        let result = stage.run(&file).unwrap();

        assert!(!result.succeeded);
        assert_eq!(result.diagnostic.as_deref(), Some("strict failed: bad input: line 1"));
        assert_eq!(fs::read_to_string(&file).unwrap(), "def (\n");
    }

    #[test]
    fn test_in_process_stage_missing_file_is_error() {
        let dir = tempdir().unwrap();
        let stage = InProcessStage::new("noop", |s: &str| Ok(s.to_string()));
        assert!(stage.run(&dir.path().join("gone.py")).is_err());
    }
}
