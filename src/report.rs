//! Run reporter and persisted run record
//!
//! Each run owns a [`Reporter`] whose timestamp names both the log file and
//! the JSON report, so the two artifacts of one run can be paired up later.

use crate::error::Result;
use crate::outcome::ConversionOutcome;
use crate::summary::summarize;
use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::info;

/// Matches the `(line, column)` location converters print in parse errors
static LOCATION_PATTERN: OnceLock<Regex> = OnceLock::new();

fn location_pattern() -> &'static Regex {
    LOCATION_PATTERN.get_or_init(|| Regex::new(r"\((\d+),\s*\d+\)").unwrap())
}

/// Line number embedded in a diagnostic, if any
pub fn extract_line(diagnostic: &str) -> Option<u32> {
    location_pattern()
        .captures(diagnostic)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Per-run reporter with its own timestamped identity
#[derive(Debug, Clone)]
pub struct Reporter {
    timestamp: String,
    started: DateTime<Local>,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter {
    pub fn new() -> Self {
        let started = Local::now();
        Self {
            timestamp: started.format("%Y%m%d_%H%M%S").to_string(),
            started,
        }
    }

    /// `YYYYmmdd_HHMMSS` identity of this run
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// File name for this run's log
    pub fn log_file_name(&self) -> String {
        format!("conversion_{}.log", self.timestamp)
    }

    /// Close the run and build its record from the outcomes
    pub fn finish(&self, root: &Path, outcomes: &[ConversionOutcome]) -> RunReport {
        let summary = summarize(outcomes);
        let display = |path: &Path| {
            path.strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .into_owned()
        };

        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut file_details = Vec::with_capacity(outcomes.len());

        for outcome in outcomes {
            let file = display(outcome.path());
            match (outcome.succeeded(), outcome.diagnostic()) {
                (false, Some(text)) => errors.push(ReportError {
                    file: file.clone(),
                    error: text.to_string(),
                    line: extract_line(text),
                }),
                (true, Some(text)) => warnings.push(ReportWarning {
                    file: file.clone(),
                    warning: text.to_string(),
                }),
                _ => {}
            }

            file_details.push(FileDetail {
                file_path: file,
                success: outcome.succeeded(),
                changes_made: outcome.changed(),
                error: (!outcome.succeeded())
                    .then(|| outcome.diagnostic().map(str::to_string))
                    .flatten(),
            });
        }

        RunReport {
            timestamp: self.timestamp.clone(),
            source_directory: root.to_string_lossy().into_owned(),
            start_time: self.started,
            end_time: Local::now(),
            total_files: summary.total,
            successful_conversions: summary.succeeded,
            failed_conversions: summary.failed,
            files_modified: summary.modified,
            files_unchanged: summary.unchanged,
            errors,
            warnings,
            file_details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportError {
    pub file: String,
    pub error: String,
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWarning {
    pub file: String,
    pub warning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDetail {
    pub file_path: String,
    pub success: bool,
    pub changes_made: bool,
    pub error: Option<String>,
}

/// Durable record of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: String,
    pub source_directory: String,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub total_files: usize,
    pub successful_conversions: usize,
    pub failed_conversions: usize,
    pub files_modified: usize,
    pub files_unchanged: usize,
    pub errors: Vec<ReportError>,
    pub warnings: Vec<ReportWarning>,
    pub file_details: Vec<FileDetail>,
}

impl RunReport {
    /// Write `report_<timestamp>.json` under `dir`, returning its path
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("report_{}.json", self.timestamp));

        // Write to a temporary file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        drop(writer);

        fs::rename(&temp_path, &path)?;

        info!(path = %path.display(), "Saved run report");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::StageKind;
    use tempfile::tempdir;

    fn outcomes(root: &Path) -> Vec<ConversionOutcome> {
        vec![
            ConversionOutcome::success(
                root.join("a.py"),
                "print 'a'\n".into(),
                "print('a')\n".into(),
                StageKind::Enhancement,
                None,
            ),
            ConversionOutcome::success(
                root.join("pkg/b.py"),
                "x = 1\n".into(),
                "x = 1\n".into(),
                StageKind::Primary,
                Some("fissix enhancement skipped".into()),
            ),
            ConversionOutcome::failure(
                root.join("pkg/c.py"),
                "def (\n".into(),
                "def (\n".into(),
                Some(StageKind::Primary),
                "2to3 failed: ParseError: bad input: type=7, value='(', context=('', (3, 4))".into(),
            ),
        ]
    }

    #[test]
    fn test_extract_line() {
        assert_eq!(extract_line("bad input ('', (12, 0))"), Some(12));
        assert_eq!(extract_line("at (3,  9)"), Some(3));
        assert_eq!(extract_line("no location here"), None);
    }

    #[test]
    fn test_identity_names_artifacts() {
        let reporter = Reporter::new();
        assert_eq!(reporter.timestamp().len(), "20240101_120000".len());
        assert_eq!(
            reporter.log_file_name(),
            format!("conversion_{}.log", reporter.timestamp())
        );
    }

    #[test]
    fn test_finish_builds_record() {
        let root = Path::new("/tree");
        let reporter = Reporter::new();
        let report = reporter.finish(root, &outcomes(root));

        assert_eq!(report.total_files, 3);
        assert_eq!(report.successful_conversions, 2);
        assert_eq!(report.failed_conversions, 1);
        assert_eq!(report.files_modified, 1);
        assert_eq!(report.files_unchanged, 1);
        assert!(report.end_time >= report.start_time);

        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].file, Path::new("pkg/c.py").to_string_lossy());
        assert_eq!(report.errors[0].line, Some(3));
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].warning, "fissix enhancement skipped");

        let details: Vec<_> = report
            .file_details
            .iter()
            .map(|d| (d.success, d.changes_made, d.error.is_some()))
            .collect();
        assert_eq!(
            details,
            vec![(true, true, false), (true, false, false), (false, false, true)]
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let root = Path::new("/tree");
        let reporter = Reporter::new();
        let report = reporter.finish(root, &outcomes(root));

        let logs = dir.path().join("logs");
        let path = report.save(&logs).unwrap();
        assert_eq!(
            path,
            logs.join(format!("report_{}.json", reporter.timestamp()))
        );
        assert!(!path.with_extension("tmp").exists());

        let loaded: RunReport = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, report);
    }
}
