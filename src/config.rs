//! Configuration types for dialect-lift

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How one external conversion tool is found and invoked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Display name used in logs and diagnostics
    pub name: String,

    /// Canonical executable name looked up on the search path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,

    /// Well-known install locations on unix-like systems (globs allowed)
    #[serde(default)]
    pub unix_locations: Vec<String>,

    /// Well-known install locations on Windows (globs allowed)
    #[serde(default)]
    pub windows_locations: Vec<String>,

    /// Interpreter module run with `-m` when no executable is found
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_module: Option<String>,

    /// Arguments placed before the absolute file path
    #[serde(default = "default_tool_args")]
    pub args: Vec<String>,
}

fn default_tool_args() -> Vec<String> {
    vec!["-w".into(), "--no-diffs".into()]
}

impl ToolConfig {
    /// The stock primary converter: `2to3`, falling back to `lib2to3`
    pub fn two_to_three() -> Self {
        Self {
            name: "2to3".into(),
            executable: Some("2to3".into()),
            unix_locations: vec![
                "/usr/bin/2to3".into(),
                "/usr/local/bin/2to3".into(),
                "/Library/Frameworks/Python.framework/Versions/*/bin/2to3".into(),
            ],
            windows_locations: vec![
                r"{interpreter_dir}\Scripts\2to3.exe".into(),
                r"{interpreter_dir}\Tools\scripts\2to3.py".into(),
                r"C:\Python*\Scripts\2to3.exe".into(),
                r"C:\Python*\Tools\scripts\2to3.py".into(),
            ],
            fallback_module: Some("lib2to3".into()),
            args: default_tool_args(),
        }
    }

    /// The stock enhancement converter: the `fissix` module
    pub fn fissix() -> Self {
        Self {
            name: "fissix".into(),
            executable: None,
            unix_locations: vec![],
            windows_locations: vec![],
            fallback_module: Some("fissix".into()),
            args: default_tool_args(),
        }
    }

    /// Known locations for the platform this binary runs on
    pub fn platform_locations(&self) -> &[String] {
        if cfg!(windows) {
            &self.windows_locations
        } else {
            &self.unix_locations
        }
    }
}

/// Configuration for dialect-lift
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Extension (without the dot) of files handed to the converters
    pub source_extension: String,

    /// Extension appended to a file's name to form its backup sidecar
    pub backup_suffix: String,

    /// Directory names that are never descended into
    #[serde(default)]
    pub exclude_dirs: Vec<String>,

    /// Snapshot each file before converting it
    pub backup: bool,

    /// Run the enhancement stage after a successful primary stage
    pub enhancement: bool,

    /// Interpreter used for module fallbacks and `.py` tool scripts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<PathBuf>,

    /// Per-invocation time limit for external tools, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_timeout_secs: Option<u64>,

    /// Directory receiving log files and run reports
    pub log_dir: PathBuf,

    /// Persist a JSON run report after each conversion
    pub write_report: bool,

    /// Primary conversion tool
    pub primary: ToolConfig,

    /// Enhancement conversion tool
    pub enhancement_tool: ToolConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_extension: "py".into(),
            backup_suffix: "py2bak".into(),
            exclude_dirs: vec![
                ".git".into(),
                "__pycache__".into(),
                ".pytest_cache".into(),
                "venv".into(),
                "env".into(),
            ],
            backup: true,
            enhancement: true,
            interpreter: None,
            tool_timeout_secs: None,
            log_dir: PathBuf::from("logs"),
            write_report: true,
            primary: ToolConfig::two_to_three(),
            enhancement_tool: ToolConfig::fissix(),
        }
    }
}

impl Config {
    /// Per-invocation tool time limit, if one is configured
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Check that the configuration can drive a run
    pub fn validate(&self) -> crate::Result<()> {
        if self.source_extension.trim_start_matches('.').is_empty() {
            return Err(crate::Error::Config("source_extension must not be empty".into()));
        }
        if self.backup_suffix.trim_start_matches('.').is_empty() {
            return Err(crate::Error::Config("backup_suffix must not be empty".into()));
        }
        if self.backup_suffix.trim_start_matches('.')
            == self.source_extension.trim_start_matches('.')
        {
            return Err(crate::Error::Config(
                "backup_suffix must differ from source_extension".into(),
            ));
        }
        for tool in [&self.primary, &self.enhancement_tool] {
            if tool.executable.is_none()
                && tool.fallback_module.is_none()
                && tool.platform_locations().is_empty()
            {
                return Err(crate::Error::Config(format!(
                    "tool '{}' has no executable, location or fallback module",
                    tool.name
                )));
            }
        }
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            source: e,
        })?;

        fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Generate a sample configuration file content
    pub fn sample_config() -> String {
        r#"# dialect-lift configuration file
# This file uses TOML format (https://toml.io)

# Files whose names end with this extension are converted
source_extension = "py"

# Backups are written next to each file as <name>.<backup_suffix>
backup_suffix = "py2bak"

# Directory names that are never descended into
exclude_dirs = [".git", "__pycache__", ".pytest_cache", "venv", "env"]

# Snapshot every file before it is converted
backup = true

# Run the enhancement tool after the primary tool succeeds
enhancement = true

# Interpreter for module fallbacks (defaults to python3, then python, on PATH)
# interpreter = "/usr/bin/python3"

# Kill a tool invocation that runs longer than this many seconds
# tool_timeout_secs = 120

# Where logs and JSON run reports go
log_dir = "logs"
write_report = true

[primary]
name = "2to3"
executable = "2to3"
unix_locations = [
    "/usr/bin/2to3",
    "/usr/local/bin/2to3",
    "/Library/Frameworks/Python.framework/Versions/*/bin/2to3",
]
windows_locations = [
    '{interpreter_dir}\Scripts\2to3.exe',
    '{interpreter_dir}\Tools\scripts\2to3.py',
    'C:\Python*\Scripts\2to3.exe',
    'C:\Python*\Tools\scripts\2to3.py',
]
fallback_module = "lib2to3"
args = ["-w", "--no-diffs"]

[enhancement_tool]
name = "fissix"
fallback_module = "fissix"
args = ["-w", "--no-diffs"]
"#
        .to_string()
    }
}

/// Errors that can occur when loading or saving configuration
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read configuration file
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse configuration file
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
    /// Failed to write configuration file
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to serialize configuration
    SerializeError {
        source: toml::ser::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError { path, source } => {
                write!(f, "Failed to read config file '{}': {}", path.display(), source)
            }
            ConfigError::ParseError { path, source } => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), source)
            }
            ConfigError::WriteError { path, source } => {
                write!(f, "Failed to write config file '{}': {}", path.display(), source)
            }
            ConfigError::SerializeError { source } => {
                write!(f, "Failed to serialize config: {}", source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
            ConfigError::WriteError { source, .. } => Some(source),
            ConfigError::SerializeError { source } => Some(source),
        }
    }
}
