//! Error types for dialect-lift

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for dialect-lift operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for dialect-lift
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Source root not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("Source root is not a directory: {path}")]
    RootNotDirectory { path: PathBuf },

    #[error("Failed to back up {path}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not find {tool}. Locations tried:\n{}", .tried.join("\n"))]
    ToolNotFound { tool: String, tried: Vec<String> },

    #[error("Failed to launch {tool}: {source}")]
    ToolLaunch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {limit:?}")]
    ToolTimeout { tool: String, limit: Duration },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Invalid location pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Conversion worker panicked: {0}")]
    WorkerPanicked(String),
}

impl Error {
    /// Whether this error concerns the whole tree rather than a single file
    pub fn is_discovery(&self) -> bool {
        matches!(self, Error::RootNotFound { .. } | Error::RootNotDirectory { .. })
    }
}

/// Render an error together with every `source()` below it
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        let cause_text = cause.to_string();
        // thiserror variants often embed the source text already
        if !message.contains(&cause_text) {
            message.push_str("\n  caused by: ");
            message.push_str(&cause_text);
        }
        current = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_not_found_lists_locations() {
        let err = Error::ToolNotFound {
            tool: "2to3".into(),
            tried: vec!["search path: 2to3".into(), "/usr/bin/2to3".into()],
        };
        let text = err.to_string();
        assert!(text.contains("Could not find 2to3"));
        assert!(text.contains("/usr/bin/2to3"));
    }

    #[test]
    fn test_error_chain_includes_source() {
        let err = Error::ToolLaunch {
            tool: "fissix".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let chain = error_chain(&err);
        assert!(chain.starts_with("Failed to launch fissix"));
        assert!(chain.contains("denied"));
    }

    #[test]
    fn test_timeout_keeps_sub_second_limits() {
        let err = Error::ToolTimeout {
            tool: "2to3".into(),
            limit: Duration::from_millis(200),
        };
        assert_eq!(err.to_string(), "2to3 timed out after 200ms");

        let err = Error::ToolTimeout {
            tool: "2to3".into(),
            limit: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "2to3 timed out after 30s");
    }

    #[test]
    fn test_is_discovery() {
        assert!(Error::RootNotFound { path: "/nope".into() }.is_discovery());
        assert!(!Error::Config("bad".into()).is_discovery());
    }
}
