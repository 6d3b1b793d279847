//! Source file discovery

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Finds convertible source files under a root directory
#[derive(Debug, Clone)]
pub struct FileLocator {
    /// File name suffix including the leading dot, e.g. `.py`
    suffix: String,
    excluded: HashSet<OsString>,
}

impl FileLocator {
    pub fn new<S: AsRef<str>>(extension: &str, exclude_dirs: &[S]) -> Self {
        Self {
            suffix: format!(".{}", extension.trim_start_matches('.')),
            excluded: exclude_dirs
                .iter()
                .map(|d| OsString::from(d.as_ref()))
                .collect(),
        }
    }

    pub fn from_config(config: &crate::Config) -> Self {
        Self::new(&config.source_extension, &config.exclude_dirs)
    }

    /// Collect every source file under `root` in stable traversal order
    ///
    /// Excluded directories are pruned before descent, so nothing below
    /// them is visited. Unreadable entries are logged and skipped.
    pub fn locate(&self, root: &Path) -> Result<Vec<PathBuf>> {
        ensure_root(root)?;

        let mut files = Vec::new();
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.is_excluded_dir(e))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if entry.file_type().is_file() && self.is_source_file(entry.path()) {
                files.push(entry.into_path());
            }
        }

        debug!(root = %root.display(), count = files.len(), "Located source files");
        Ok(files)
    }

    /// Whether a path names a source file by its suffix
    pub fn is_source_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.ends_with(&self.suffix))
    }

    fn is_excluded_dir(&self, entry: &DirEntry) -> bool {
        // the root itself is never pruned, even if its name matches
        entry.depth() > 0
            && entry.file_type().is_dir()
            && self.excluded.contains(entry.file_name())
    }
}

/// Fail unless `root` is an existing directory
pub(crate) fn ensure_root(root: &Path) -> Result<()> {
    if !root.exists() {
        return Err(Error::RootNotFound {
            path: root.to_path_buf(),
        });
    }
    if !root.is_dir() {
        return Err(Error::RootNotDirectory {
            path: root.to_path_buf(),
        });
    }
    Ok(())
}
