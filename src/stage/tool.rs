//! External converter stage

use super::discovery::{ResolvedTool, ToolDiscovery};
use super::{Stage, StageResult};
use crate::config::ToolConfig;
use crate::error::{Error, Result};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};
use wait_timeout::ChildExt;

/// Runs a discovered converter as `<tool> <args...> <absolute path>`
///
/// Discovery happens on first use and is cached for the life of the stage,
/// including a miss, so a tree of files never searches the filesystem twice.
pub struct ExternalTool {
    config: ToolConfig,
    discovery: Arc<ToolDiscovery>,
    timeout: Option<Duration>,
    resolved: OnceLock<std::result::Result<ResolvedTool, Vec<String>>>,
}

impl ExternalTool {
    pub fn new(config: ToolConfig, discovery: Arc<ToolDiscovery>, timeout: Option<Duration>) -> Self {
        Self {
            config,
            discovery,
            timeout,
            resolved: OnceLock::new(),
        }
    }

    /// Locate the converter, reusing an earlier lookup
    pub fn resolve(&self) -> Result<&ResolvedTool> {
        let cached = self.resolved.get_or_init(|| {
            self.discovery.discover(&self.config).map_err(|e| match e {
                Error::ToolNotFound { tried, .. } => tried,
                other => vec![other.to_string()],
            })
        });

        cached.as_ref().map_err(|tried| Error::ToolNotFound {
            tool: self.config.name.clone(),
            tried: tried.clone(),
        })
    }

    /// Wait for the child, killing it once the time limit passes
    ///
    /// `Ok(None)` means the limit was hit.
    fn wait(&self, child: &mut std::process::Child) -> Result<Option<ExitStatus>> {
        let Some(limit) = self.timeout else {
            return Ok(Some(child.wait()?));
        };

        match child.wait_timeout(limit)? {
            Some(status) => Ok(Some(status)),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for ExternalTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalTool")
            .field("name", &self.config.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Stage for ExternalTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn run(&self, path: &Path) -> Result<StageResult> {
        let tool = self.resolve()?;
        let target = std::path::absolute(path)?;

        let mut cmd = tool.command();
        cmd.args(&self.config.args)
            .arg(&target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(tool = %tool.name, location = %tool.location, path = %target.display(), "Running converter");

        let mut child = cmd.spawn().map_err(|e| Error::ToolLaunch {
            tool: tool.name.clone(),
            source: e,
        })?;

        // drain both pipes so a chatty tool cannot block on a full buffer
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let Some(status) = self.wait(&mut child)? else {
            // grandchildren may still hold the pipes; leave the readers detached
            let limit = self.timeout.unwrap_or_default();
            warn!(tool = %tool.name, path = %target.display(), "Converter timed out, killed");
            let diagnostic = Error::ToolTimeout {
                tool: tool.name.clone(),
                limit,
            }
            .to_string();
            return Ok(StageResult::failure(read_lossy(path), diagnostic));
        };

        let stdout = collect(stdout);
        let stderr = collect(stderr);

        for line in stdout.lines() {
            trace!(tool = %tool.name, "{}", line);
        }

        if status.success() {
            return Ok(StageResult::success(fs::read_to_string(path)?));
        }

        let detail = match stderr.trim() {
            "" => match status.code() {
                Some(code) => format!("exit code {code}"),
                None => "terminated by signal".to_string(),
            },
            text => text.to_string(),
        };
        debug!(tool = %tool.name, path = %target.display(), %detail, "Converter reported failure");

        Ok(StageResult::failure(
            read_lossy(path),
            format!("{} failed: {}", tool.name, detail),
        ))
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

/// Current file content for a failure report; unreadable bytes are replaced
fn read_lossy(path: &Path) -> String {
    fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}
