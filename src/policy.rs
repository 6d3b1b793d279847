//! Two-stage conversion policy
//!
//! The primary stage must succeed for a file to succeed. The enhancement
//! stage only ever improves on the primary result: when it fails, the file
//! is put back to the primary output and the failure becomes a warning.

use crate::config::Config;
use crate::error::{Error, error_chain};
use crate::outcome::{ConversionOutcome, StageKind};
use crate::stage::{ExternalTool, Stage, StageResult, ToolDiscovery};
use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Composes a primary stage with an optional enhancement stage
pub struct ConversionPolicy {
    primary: Box<dyn Stage>,
    enhancement: Option<Box<dyn Stage>>,
}

impl ConversionPolicy {
    pub fn new(primary: Box<dyn Stage>, enhancement: Option<Box<dyn Stage>>) -> Self {
        Self {
            primary,
            enhancement,
        }
    }

    /// Policy over the configured external tools
    pub fn from_config(config: &Config) -> Self {
        let discovery = Arc::new(ToolDiscovery::new(config.interpreter.as_deref()));
        let timeout = config.tool_timeout();

        let primary = ExternalTool::new(config.primary.clone(), Arc::clone(&discovery), timeout);
        let enhancement = config.enhancement.then(|| {
            Box::new(ExternalTool::new(
                config.enhancement_tool.clone(),
                Arc::clone(&discovery),
                timeout,
            )) as Box<dyn Stage>
        });

        Self::new(Box::new(primary), enhancement)
    }

    /// Convert one file in place; never panics and never returns an error
    pub fn convert(&self, path: &Path) -> ConversionOutcome {
        let original = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                return ConversionOutcome::failure(
                    path.to_path_buf(),
                    String::new(),
                    String::new(),
                    None,
                    converting_error(path, &error_chain(&Error::Io(e))),
                );
            }
        };

        let primary = match run_stage(self.primary.as_ref(), path) {
            Ok(result) if result.succeeded => result,
            Ok(result) => {
                let diagnostic = result
                    .diagnostic
                    .unwrap_or_else(|| format!("{} failed", self.primary.name()));
                return ConversionOutcome::failure(
                    path.to_path_buf(),
                    original,
                    result.produced_content,
                    Some(StageKind::Primary),
                    diagnostic,
                );
            }
            Err(text) => {
                // a fault carries the original content, so the disk must match it
                if let Err(e) = reinstate(path, &original) {
                    warn!(path = %path.display(), error = %e, "Could not put original content back");
                }
                let produced = original.clone();
                return ConversionOutcome::failure(
                    path.to_path_buf(),
                    original,
                    produced,
                    None,
                    converting_error(path, &text),
                );
            }
        };

        let Some(enhancement) = self.enhancement.as_deref() else {
            return ConversionOutcome::success(
                path.to_path_buf(),
                original,
                primary.produced_content,
                StageKind::Primary,
                None,
            );
        };

        let reason = match run_stage(enhancement, path) {
            Ok(result) if result.succeeded => {
                debug!(path = %path.display(), stage = enhancement.name(), "Enhancement applied");
                return ConversionOutcome::success(
                    path.to_path_buf(),
                    original,
                    result.produced_content,
                    StageKind::Enhancement,
                    None,
                );
            }
            Ok(result) => result
                .diagnostic
                .unwrap_or_else(|| format!("{} failed", enhancement.name())),
            Err(text) => text,
        };

        // the enhancement may have written before failing
        if let Err(e) = reinstate(path, &primary.produced_content) {
            return ConversionOutcome::failure(
                path.to_path_buf(),
                original,
                primary.produced_content,
                Some(StageKind::Primary),
                converting_error(
                    path,
                    &format!("could not restore {} output: {}", self.primary.name(), e),
                ),
            );
        }

        let warning = format!(
            "{} enhancement skipped, kept {} output: {}",
            enhancement.name(),
            self.primary.name(),
            reason
        );
        warn!(path = %path.display(), %warning, "Enhancement failed, using primary result");

        ConversionOutcome::success(
            path.to_path_buf(),
            original,
            primary.produced_content,
            StageKind::Primary,
            Some(warning),
        )
    }
}

impl std::fmt::Debug for ConversionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionPolicy")
            .field("primary", &self.primary.name())
            .field("enhancement", &self.enhancement.as_ref().map(|s| s.name()))
            .finish()
    }
}

/// Run a stage, turning an error or a panic into its diagnostic text
fn run_stage(stage: &dyn Stage, path: &Path) -> Result<StageResult, String> {
    match panic::catch_unwind(AssertUnwindSafe(|| stage.run(path))) {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(error_chain(&e)),
        Err(payload) => Err(format!(
            "{} panicked: {}",
            stage.name(),
            panic_message(payload.as_ref())
        )),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Put `content` back on disk unless it is already there
fn reinstate(path: &Path, content: &str) -> std::io::Result<()> {
    match fs::read(path) {
        Ok(current) if current == content.as_bytes() => Ok(()),
        _ => fs::write(path, content),
    }
}

fn converting_error(path: &Path, detail: &str) -> String {
    format!("Error converting {}: {}", path.display(), detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use crate::stage::InProcessStage;
    use tempfile::tempdir;

    fn modernize() -> Box<dyn Stage> {
        Box::new(InProcessStage::new("primary", |s: &str| {
            if s.contains("def (") {
                Err("bad input: (1, 4)".to_string())
            } else {
                Ok(s.replace("print 'a'", "print('a')"))
            }
        }))
    }

    fn sort_fixer() -> Box<dyn Stage> {
        Box::new(InProcessStage::new("enhance", |s: &str| {
            Ok(s.replace("sort(cmp)", "sort(key=cmp_to_key(cmp))"))
        }))
    }

    /// Scribbles on the file, then reports failure
    struct Scribbler;

    impl Stage for Scribbler {
        fn name(&self) -> &str {
            "scribbler"
        }

        fn run(&self, path: &Path) -> Result<StageResult> {
            fs::write(path, "garbage")?;
            Ok(StageResult::failure("garbage".into(), "scribbler failed: oops".into()))
        }
    }

    /// Cannot run at all
    struct Missing;

    impl Stage for Missing {
        fn name(&self) -> &str {
            "missing"
        }

        fn run(&self, _path: &Path) -> Result<StageResult> {
            Err(Error::ToolNotFound {
                tool: "missing".into(),
                tried: vec!["search path: missing".into()],
            })
        }
    }

    struct Panicker;

    impl Stage for Panicker {
        fn name(&self) -> &str {
            "panicker"
        }

        fn run(&self, path: &Path) -> Result<StageResult> {
            fs::write(path, "garbage")?;
            panic!("stage blew up")
        }
    }

    fn file_with(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.py");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_primary_only() {
        let (_dir, path) = file_with("print 'a'\n");
        let outcome = ConversionPolicy::new(modernize(), None).convert(&path);
        assert!(outcome.succeeded());
        assert!(outcome.changed());
        assert_eq!(outcome.stage(), Some(StageKind::Primary));
        assert_eq!(fs::read_to_string(&path).unwrap(), "print('a')\n");
    }

    #[test]
    fn test_enhancement_supersedes_primary() {
        let (_dir, path) = file_with("print 'a'\nxs.sort(cmp)\n");
        let outcome = ConversionPolicy::new(modernize(), Some(sort_fixer())).convert(&path);
        assert!(outcome.succeeded());
        assert_eq!(outcome.stage(), Some(StageKind::Enhancement));
        assert_eq!(
            outcome.produced_content(),
            "print('a')\nxs.sort(key=cmp_to_key(cmp))\n"
        );
        assert!(outcome.diagnostic().is_none());
    }

    #[test]
    fn test_primary_failure_fails_file() {
        let (_dir, path) = file_with("def (\n");
        let outcome = ConversionPolicy::new(modernize(), Some(sort_fixer())).convert(&path);
        assert!(!outcome.succeeded());
        assert!(!outcome.changed());
        assert_eq!(outcome.stage(), Some(StageKind::Primary));
        assert_eq!(outcome.diagnostic(), Some("primary failed: bad input: (1, 4)"));
    }

    #[test]
    fn test_enhancement_failure_keeps_primary_output() {
        let (_dir, path) = file_with("print 'a'\n");
        let outcome = ConversionPolicy::new(modernize(), Some(Box::new(Scribbler))).convert(&path);

        assert!(outcome.succeeded());
        assert!(outcome.changed());
        assert_eq!(outcome.stage(), Some(StageKind::Primary));
        assert_eq!(outcome.produced_content(), "print('a')\n");
        assert!(outcome.diagnostic().unwrap().contains("scribbler failed: oops"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "print('a')\n");
    }

    #[test]
    fn test_missing_enhancement_tool_is_warning() {
        let (_dir, path) = file_with("print 'a'\n");
        let outcome = ConversionPolicy::new(modernize(), Some(Box::new(Missing))).convert(&path);
        assert!(outcome.succeeded());
        assert!(outcome.diagnostic().unwrap().contains("Could not find missing"));
    }

    #[test]
    fn test_missing_primary_tool_fails_with_locations() {
        let (_dir, path) = file_with("print 'a'\n");
        let outcome = ConversionPolicy::new(Box::new(Missing), None).convert(&path);
        assert!(!outcome.succeeded());
        assert_eq!(outcome.produced_content(), "print 'a'\n");
        let diagnostic = outcome.diagnostic().unwrap();
        assert!(diagnostic.starts_with("Error converting"));
        assert!(diagnostic.contains("search path: missing"));
    }

    #[test]
    fn test_primary_panic_fails_and_keeps_original() {
        let (_dir, path) = file_with("print 'a'\n");
        let outcome = ConversionPolicy::new(Box::new(Panicker), None).convert(&path);
        assert!(!outcome.succeeded());
        assert_eq!(outcome.produced_content(), "print 'a'\n");
        assert!(outcome.diagnostic().unwrap().contains("panicker panicked: stage blew up"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "print 'a'\n");
    }

    #[test]
    fn test_enhancement_panic_keeps_primary_output() {
        let (_dir, path) = file_with("print 'a'\n");
        let outcome = ConversionPolicy::new(modernize(), Some(Box::new(Panicker))).convert(&path);
        assert!(outcome.succeeded());
        assert!(outcome.changed());
        assert_eq!(outcome.stage(), Some(StageKind::Primary));
        assert_eq!(outcome.produced_content(), "print('a')\n");
        assert!(outcome.diagnostic().unwrap().contains("panicker panicked: stage blew up"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "print('a')\n");
    }

    #[test]
    fn test_unreadable_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin1.py");
        fs::write(&path, [b'#', 0xe9, b'\n']).unwrap();
        let outcome = ConversionPolicy::new(modernize(), None).convert(&path);
        assert!(!outcome.succeeded());
        assert_eq!(outcome.stage(), None);
    }
}
