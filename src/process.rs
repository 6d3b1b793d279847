//! Batch orchestration
//!
//! Handles the core loop of a run:
//! - Locating source files under the root
//! - Snapshotting each file before it is touched
//! - Running the conversion policy and recording its outcome
//! - Reporting progress once per file, then a final 100%
//!
//! File-level failures are recorded and the loop moves on. Only a bad root
//! escapes [`Processor::convert_tree`].

use crate::backup::BackupManager;
use crate::config::Config;
use crate::error::{Error, Result, error_chain};
use crate::locate::FileLocator;
use crate::outcome::ConversionOutcome;
use crate::policy::{ConversionPolicy, panic_message};
use crate::report::{Reporter, RunReport};
use crate::summary::{self, RunSummary};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::{Level, debug, error, info, span, warn};

/// One progress notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub label: String,
    /// 0..=100
    pub percent: u8,
}

impl ProgressEvent {
    fn complete() -> Self {
        Self {
            label: "Conversion complete".to_string(),
            percent: 100,
        }
    }
}

/// Receives progress from the orchestrator's worker
///
/// Called synchronously on the worker thread once per file and once at the
/// end. Implementations must hand the event off quickly.
pub trait ProgressSink: Send {
    fn progress(&self, event: ProgressEvent);
}

impl ProgressSink for Sender<ProgressEvent> {
    fn progress(&self, event: ProgressEvent) {
        // a receiver that went away just stops listening
        let _ = self.send(event);
    }
}

/// Default sink: progress goes to the debug log only
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn progress(&self, event: ProgressEvent) {
        debug!(label = %event.label, percent = event.percent, "Progress");
    }
}

/// Cooperative stop flag, checked between files
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drives the conversion policy over a tree
pub struct Processor {
    locator: FileLocator,
    backups: BackupManager,
    policy: ConversionPolicy,
    progress: Box<dyn ProgressSink>,
    cancel: CancelToken,
    results: Vec<ConversionOutcome>,
}

impl Processor {
    /// Create a processor using the configured external tools
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_policy(config, ConversionPolicy::from_config(config)))
    }

    /// Create a processor around an already-built policy
    pub fn with_policy(config: &Config, policy: ConversionPolicy) -> Self {
        Self {
            locator: FileLocator::from_config(config),
            backups: BackupManager::new(&config.backup_suffix),
            policy,
            progress: Box::new(LogProgress),
            cancel: CancelToken::new(),
            results: Vec::new(),
        }
    }

    pub fn set_progress(&mut self, sink: Box<dyn ProgressSink>) {
        self.progress = sink;
    }

    /// Handle that stops the run before the next file
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Convert every located file under `root`
    ///
    /// Replaces the outcomes of any previous run. Returns one outcome per
    /// located file, in locator order.
    pub fn convert_tree(&mut self, root: &Path, with_backup: bool) -> Result<&[ConversionOutcome]> {
        let _span = span!(Level::INFO, "conversion_run", root = %root.display()).entered();
        self.results.clear();

        info!("Scanning source tree...");
        let files = self.locator.locate(root)?;
        info!(count = files.len(), "Found source files");

        let total = files.len();
        let mut announced_cancel = false;

        for (index, path) in files.iter().enumerate() {
            let outcome = if self.cancel.is_cancelled() {
                if !announced_cancel {
                    warn!(remaining = total - index, "Run cancelled, skipping remaining files");
                    announced_cancel = true;
                }
                cancelled(path)
            } else {
                self.convert_one(path, with_backup)
            };

            self.results.push(outcome);

            let processed = index + 1;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.progress.progress(ProgressEvent {
                label: format!("Converted {name}"),
                percent: (processed * 100 / total) as u8,
            });
        }

        self.progress.progress(ProgressEvent::complete());

        info!("{}", self.summary().line());
        Ok(&self.results)
    }

    /// [`Processor::convert_tree`] followed by building the run record
    pub fn run(&mut self, reporter: &Reporter, root: &Path, with_backup: bool) -> Result<RunReport> {
        self.convert_tree(root, with_backup)?;
        Ok(reporter.finish(root, &self.results))
    }

    fn convert_one(&self, path: &Path, with_backup: bool) -> ConversionOutcome {
        let _span = span!(Level::DEBUG, "convert_file", path = %path.display()).entered();

        if with_backup && let Err(e) = self.backups.snapshot(path) {
            error!(path = %path.display(), error = %e, "Backup failed, file skipped");
            let original = fs::read_to_string(path).unwrap_or_default();
            return ConversionOutcome::failure(
                path.to_path_buf(),
                original.clone(),
                original,
                None,
                format!("Error converting {}: {}", path.display(), error_chain(&e)),
            );
        }

        let outcome = self.policy.convert(path);
        if outcome.succeeded() {
            debug!(path = %path.display(), changed = outcome.changed(), "Converted");
        } else {
            error!(
                path = %path.display(),
                error = outcome.diagnostic().unwrap_or_default(),
                "Conversion failed"
            );
        }
        outcome
    }

    /// Outcomes of the last run
    pub fn results(&self) -> &[ConversionOutcome] {
        &self.results
    }

    pub fn into_results(self) -> Vec<ConversionOutcome> {
        self.results
    }

    pub fn summary(&self) -> RunSummary {
        summary::summarize(&self.results)
    }

    pub fn failures(&self) -> Vec<&ConversionOutcome> {
        summary::failures(&self.results)
    }

    /// Move every backup under `root` back over its original
    pub fn restore_all(&self, root: &Path) -> Result<Vec<PathBuf>> {
        self.backups.restore_all(root)
    }
}

fn cancelled(path: &Path) -> ConversionOutcome {
    ConversionOutcome::failure(
        path.to_path_buf(),
        String::new(),
        String::new(),
        None,
        format!("Conversion of {} cancelled", path.display()),
    )
}

/// Everything a finished background run hands back
#[derive(Debug)]
pub struct CompletedRun {
    pub outcomes: Vec<ConversionOutcome>,
    pub report: RunReport,
}

/// A run executing on its own worker thread
pub struct ConversionJob {
    pub events: Receiver<ProgressEvent>,
    pub cancel: CancelToken,
    handle: JoinHandle<Result<CompletedRun>>,
}

impl ConversionJob {
    /// Wait for the worker and collect its result
    pub fn join(self) -> Result<CompletedRun> {
        self.handle
            .join()
            .map_err(|payload| Error::WorkerPanicked(panic_message(payload.as_ref())))?
    }
}

/// Start a run on a dedicated worker thread
///
/// Progress arrives on [`ConversionJob::events`]; the channel disconnects
/// once the worker is done.
pub fn spawn_conversion(
    mut processor: Processor,
    reporter: Reporter,
    root: PathBuf,
    with_backup: bool,
) -> ConversionJob {
    let (tx, rx) = mpsc::channel();
    processor.set_progress(Box::new(tx));
    let cancel = processor.cancel_token();

    let handle = thread::spawn(move || {
        let report = processor.run(&reporter, &root, with_backup)?;
        Ok(CompletedRun {
            outcomes: processor.into_results(),
            report,
        })
    });

    ConversionJob {
        events: rx,
        cancel,
        handle,
    }
}
