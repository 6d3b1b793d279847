//! dialect-lift - Batch source dialect conversion
//!
//! This library converts a tree of source files in place by running
//! external converters over each file, with support for:
//! - Pruned, deterministic discovery of source files
//! - Byte-exact backup sidecars and a restore that undoes a run
//! - Tool discovery across the search path, install locations and an
//!   interpreter module fallback
//! - A primary stage with an optional enhancement stage that never
//!   regresses the primary result
//! - Background runs with progress events, cancellation and JSON reports

pub mod backup;
pub mod cli;
pub mod config;
pub mod error;
pub mod locate;
pub mod outcome;
pub mod policy;
pub mod process;
pub mod report;
pub mod stage;
pub mod summary;

pub use backup::BackupManager;
pub use cli::Cli;
pub use config::{Config, ConfigError, ToolConfig};
pub use error::{Error, Result};
pub use locate::FileLocator;
pub use outcome::{ConversionOutcome, StageKind};
pub use policy::ConversionPolicy;
pub use process::{
    CancelToken, CompletedRun, ConversionJob, ProgressEvent, ProgressSink, Processor,
    spawn_conversion,
};
pub use report::{Reporter, RunReport};
pub use stage::{ExternalTool, InProcessStage, Stage, StageResult, ToolDiscovery};
pub use summary::RunSummary;
