//! Converter discovery
//!
//! A tool is looked up by an ordered chain of strategies; the first one
//! that yields a usable location wins:
//! 1. The canonical executable name on the search path
//! 2. Well-known install locations for this platform (globs expanded)
//! 3. The tool's module, hosted by a Python interpreter
//!
//! Every location tried is recorded so a miss can explain itself.

use crate::config::ToolConfig;
use crate::error::{Error, Result};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, trace};

/// Interpreter names tried when none is configured
const INTERPRETER_CANDIDATES: &[&str] = &["python3", "python"];

/// Placeholder in known locations replaced by the interpreter's directory
const INTERPRETER_DIR: &str = "{interpreter_dir}";

/// Where a converter was found and how it must be launched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolLocation {
    /// Native executable, run directly
    Executable(PathBuf),
    /// Python script, run through the interpreter
    Script { interpreter: PathBuf, script: PathBuf },
    /// Module run with `interpreter -m module`
    Module { interpreter: PathBuf, module: String },
}

impl fmt::Display for ToolLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolLocation::Executable(path) => write!(f, "{}", path.display()),
            ToolLocation::Script {
                interpreter,
                script,
            } => write!(f, "{} {}", interpreter.display(), script.display()),
            ToolLocation::Module {
                interpreter,
                module,
            } => write!(f, "{} -m {}", interpreter.display(), module),
        }
    }
}

/// A converter ready to be invoked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTool {
    pub name: String,
    pub location: ToolLocation,
}

impl ResolvedTool {
    /// Command with the program and any launcher arguments already set
    pub fn command(&self) -> Command {
        match &self.location {
            ToolLocation::Executable(path) => Command::new(path),
            ToolLocation::Script {
                interpreter,
                script,
            } => {
                let mut cmd = Command::new(interpreter);
                cmd.arg(script);
                cmd
            }
            ToolLocation::Module {
                interpreter,
                module,
            } => {
                let mut cmd = Command::new(interpreter);
                cmd.arg("-m").arg(module);
                cmd
            }
        }
    }
}

/// One link of the discovery chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStrategy {
    SearchPath,
    KnownLocations,
    InterpreterModule,
}

impl DiscoveryStrategy {
    pub const DEFAULT_CHAIN: [DiscoveryStrategy; 3] = [
        DiscoveryStrategy::SearchPath,
        DiscoveryStrategy::KnownLocations,
        DiscoveryStrategy::InterpreterModule,
    ];

    fn lookup(
        self,
        tool: &ToolConfig,
        discovery: &ToolDiscovery,
        tried: &mut Vec<String>,
    ) -> Option<ToolLocation> {
        match self {
            DiscoveryStrategy::SearchPath => lookup_search_path(tool, discovery, tried),
            DiscoveryStrategy::KnownLocations => lookup_known_locations(tool, discovery, tried),
            DiscoveryStrategy::InterpreterModule => lookup_module(tool, discovery, tried),
        }
    }
}

/// Resolves converters against one environment
#[derive(Debug, Clone)]
pub struct ToolDiscovery {
    strategies: Vec<DiscoveryStrategy>,
    search_path: Option<OsString>,
    interpreter: Option<PathBuf>,
    interpreter_tried: Vec<String>,
}

impl ToolDiscovery {
    /// Discovery against the process search path
    pub fn new(interpreter: Option<&Path>) -> Self {
        Self::build(None, interpreter)
    }

    /// Discovery against an explicit search path instead of `PATH`
    pub fn with_search_path(search_path: impl Into<OsString>, interpreter: Option<&Path>) -> Self {
        Self::build(Some(search_path.into()), interpreter)
    }

    /// Replace the strategy chain
    pub fn with_strategies(mut self, strategies: Vec<DiscoveryStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    fn build(search_path: Option<OsString>, interpreter: Option<&Path>) -> Self {
        let mut discovery = Self {
            strategies: DiscoveryStrategy::DEFAULT_CHAIN.to_vec(),
            search_path,
            interpreter: None,
            interpreter_tried: Vec::new(),
        };
        discovery.interpreter = discovery.find_interpreter(interpreter);
        discovery
    }

    /// Interpreter used for scripts and module fallbacks, if one was found
    pub fn interpreter(&self) -> Option<&Path> {
        self.interpreter.as_deref()
    }

    /// Walk the strategy chain for `tool`
    pub fn discover(&self, tool: &ToolConfig) -> Result<ResolvedTool> {
        let mut tried = Vec::new();
        let location = self
            .strategies
            .iter()
            .find_map(|strategy| strategy.lookup(tool, self, &mut tried));

        match location {
            Some(location) => {
                debug!(tool = %tool.name, %location, "Resolved conversion tool");
                Ok(ResolvedTool {
                    name: tool.name.clone(),
                    location,
                })
            }
            None => {
                tried.extend(self.interpreter_tried.iter().cloned());
                Err(Error::ToolNotFound {
                    tool: tool.name.clone(),
                    tried,
                })
            }
        }
    }

    fn which(&self, name: &str) -> Option<PathBuf> {
        match &self.search_path {
            Some(paths) => {
                let cwd = std::env::current_dir().ok()?;
                which::which_in(name, Some(paths), cwd).ok()
            }
            None => which::which(name).ok(),
        }
    }

    fn find_interpreter(&mut self, configured: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = configured {
            // bare names go through the search path like any other tool
            if path.components().count() == 1
                && let Some(found) = path.to_str().and_then(|name| self.which(name))
            {
                return Some(found);
            }
            if path.is_file() {
                return Some(path.to_path_buf());
            }
            self.interpreter_tried
                .push(format!("interpreter: {} (not found)", path.display()));
            return None;
        }

        for name in INTERPRETER_CANDIDATES {
            if let Some(found) = self.which(name) {
                return Some(found);
            }
        }
        self.interpreter_tried.push(format!(
            "interpreter: {} (none on search path)",
            INTERPRETER_CANDIDATES.join(", ")
        ));
        None
    }
}

fn lookup_search_path(
    tool: &ToolConfig,
    discovery: &ToolDiscovery,
    tried: &mut Vec<String>,
) -> Option<ToolLocation> {
    let name = tool.executable.as_deref()?;

    let mut names = vec![name.to_string()];
    let suffix = std::env::consts::EXE_SUFFIX;
    if !suffix.is_empty() && !name.ends_with(suffix) {
        names.push(format!("{name}{suffix}"));
    }

    for candidate in names {
        trace!(tool = %tool.name, %candidate, "Probing search path");
        if let Some(path) = discovery.which(&candidate) {
            return Some(ToolLocation::Executable(path));
        }
        tried.push(format!("search path: {candidate}"));
    }
    None
}

fn lookup_known_locations(
    tool: &ToolConfig,
    discovery: &ToolDiscovery,
    tried: &mut Vec<String>,
) -> Option<ToolLocation> {
    for raw in tool.platform_locations() {
        let pattern = if raw.contains(INTERPRETER_DIR) {
            let Some(dir) = discovery.interpreter().and_then(Path::parent) else {
                tried.push(format!("{raw} (no interpreter directory)"));
                continue;
            };
            raw.replace(INTERPRETER_DIR, &dir.to_string_lossy())
        } else {
            raw.clone()
        };

        let Some(path) = expand_location(&pattern, tried) else {
            continue;
        };

        if is_script(&path) {
            match discovery.interpreter() {
                Some(interpreter) => {
                    return Some(ToolLocation::Script {
                        interpreter: interpreter.to_path_buf(),
                        script: path,
                    });
                }
                None => {
                    tried.push(format!("{} (script, no interpreter)", path.display()));
                    continue;
                }
            }
        }
        return Some(ToolLocation::Executable(path));
    }
    None
}

/// First existing file matching a literal path or glob pattern
fn expand_location(pattern: &str, tried: &mut Vec<String>) -> Option<PathBuf> {
    if !pattern.contains(['*', '?', '[']) {
        let path = PathBuf::from(pattern);
        if path.is_file() {
            return Some(path);
        }
        tried.push(pattern.to_string());
        return None;
    }

    match glob::glob(pattern) {
        Ok(paths) => {
            let mut matches: Vec<PathBuf> = paths
                .filter_map(|entry| entry.ok())
                .filter(|p| p.is_file())
                .collect();
            matches.sort();
            if matches.is_empty() {
                tried.push(pattern.to_string());
            }
            matches.into_iter().next()
        }
        Err(e) => {
            tried.push(format!("{pattern} ({})", Error::from(e)));
            None
        }
    }
}

fn lookup_module(
    tool: &ToolConfig,
    discovery: &ToolDiscovery,
    tried: &mut Vec<String>,
) -> Option<ToolLocation> {
    let module = tool.fallback_module.as_deref()?;
    let Some(interpreter) = discovery.interpreter() else {
        tried.push(format!("module: {module} (no interpreter)"));
        return None;
    };

    if module_available(interpreter, module) {
        return Some(ToolLocation::Module {
            interpreter: interpreter.to_path_buf(),
            module: module.to_string(),
        });
    }
    tried.push(format!("module: {} -m {module}", interpreter.display()));
    None
}

/// Ask the interpreter whether it can import `module`
fn module_available(interpreter: &Path, module: &str) -> bool {
    Command::new(interpreter)
        .arg("-c")
        .arg("import importlib.util, sys; sys.exit(0 if importlib.util.find_spec(sys.argv[1]) else 1)")
        .arg(module)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

fn is_script(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("py"))
}
