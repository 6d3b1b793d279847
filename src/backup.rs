//! Backup sidecars: snapshot before conversion, restore on demand
//!
//! A backup lives next to its source file as `<name>.<suffix>`. Snapshots
//! are written to a temporary file and renamed into place, so a failed
//! snapshot never leaves a truncated sidecar behind.

use crate::error::{Error, Result};
use crate::locate::ensure_root;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Creates and restores backup sidecars
#[derive(Debug, Clone)]
pub struct BackupManager {
    /// Sidecar suffix including the leading dot, e.g. `.py2bak`
    suffix: String,
}

impl BackupManager {
    pub fn new(suffix: &str) -> Self {
        Self {
            suffix: format!(".{}", suffix.trim_start_matches('.')),
        }
    }

    /// Sidecar path for a source file
    pub fn backup_path(&self, path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(&self.suffix);
        PathBuf::from(name)
    }

    /// Original path for a sidecar, or `None` if `path` is not a sidecar
    pub fn original_path(&self, path: &Path) -> Option<PathBuf> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_suffix(&self.suffix)?;
        if stem.is_empty() {
            return None;
        }
        Some(path.with_file_name(stem))
    }

    /// Copy `path` byte-for-byte to its sidecar
    ///
    /// An existing sidecar is replaced, so the sidecar always holds the
    /// content the file had right before this conversion attempt.
    pub fn snapshot(&self, path: &Path) -> Result<PathBuf> {
        let dest = self.backup_path(path);
        let mut temp_name = OsString::from(dest.as_os_str());
        temp_name.push(".tmp");
        let temp = PathBuf::from(temp_name);

        let written = copy_file(path, &temp).and_then(|()| {
            preserve_mtime(path, &temp);
            fs::rename(&temp, &dest)
        });

        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(Error::Backup {
                path: path.to_path_buf(),
                source: e,
            });
        }

        debug!(source = %path.display(), backup = %dest.display(), "Created backup");
        Ok(dest)
    }

    /// Move every sidecar under `root` back over its original
    ///
    /// Returns the restored original paths. A sidecar that cannot be moved
    /// is logged and left in place; the walk continues.
    pub fn restore_all(&self, root: &Path) -> Result<Vec<PathBuf>> {
        ensure_root(root)?;

        let mut restored = Vec::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry during restore");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(original) = self.original_path(entry.path()) else {
                continue;
            };

            match move_file(entry.path(), &original) {
                Ok(()) => {
                    debug!(path = %original.display(), "Restored from backup");
                    restored.push(original);
                }
                Err(e) => {
                    warn!(
                        backup = %entry.path().display(),
                        error = %e,
                        "Failed to restore backup, skipping"
                    );
                }
            }
        }

        info!(root = %root.display(), count = restored.len(), "Restore complete");
        Ok(restored)
    }
}

/// Rename, falling back to copy + delete when rename is refused
fn move_file(source: &Path, dest: &Path) -> std::io::Result<()> {
    if fs::rename(source, dest).is_ok() {
        return Ok(());
    }
    copy_file(source, dest)?;
    preserve_mtime(source, dest);
    fs::remove_file(source)
}

/// Copy file with buffered I/O
fn copy_file(source: &Path, dest: &Path) -> std::io::Result<()> {
    let mut reader = BufReader::with_capacity(64 * 1024, File::open(source)?);
    let mut writer = BufWriter::with_capacity(64 * 1024, File::create(dest)?);

    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
    }

    writer.flush()
}

fn preserve_mtime(source: &Path, dest: &Path) {
    if let Ok(metadata) = fs::metadata(source)
        && let Ok(mtime) = metadata.modified()
    {
        let _ = filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(mtime));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_backup_path_round_trip() {
        let manager = BackupManager::new("py2bak");
        let source = Path::new("/tree/pkg/mod.py");
        let backup = manager.backup_path(source);
        assert_eq!(backup, PathBuf::from("/tree/pkg/mod.py.py2bak"));
        assert_eq!(manager.original_path(&backup), Some(source.to_path_buf()));
        assert_eq!(manager.original_path(source), None);
        assert_eq!(manager.original_path(Path::new("/tree/.py2bak")), None);
    }

    #[test]
    fn test_snapshot_is_byte_exact() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("bin.py");
        let bytes: Vec<u8> = (0u8..=255).chain([0xff, 0xfe, b'\r', b'\n']).collect();
        fs::write(&file, &bytes).unwrap();

        let manager = BackupManager::new(".py2bak");
        let backup = manager.snapshot(&file).unwrap();

        assert_eq!(fs::read(&backup).unwrap(), bytes);
        assert_eq!(fs::read(&file).unwrap(), bytes);
        assert!(!dir.path().join("bin.py.py2bak.tmp").exists());
    }

    #[test]
    fn test_snapshot_replaces_stale_backup() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.py");
        let manager = BackupManager::new("py2bak");
        fs::write(manager.backup_path(&file), "stale").unwrap();
        fs::write(&file, "fresh").unwrap();

        manager.snapshot(&file).unwrap();
        assert_eq!(fs::read_to_string(manager.backup_path(&file)).unwrap(), "fresh");
    }

    #[test]
    fn test_snapshot_failure_leaves_source_untouched() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.py");
        fs::write(&file, "print 'x'\n").unwrap();

        let manager = BackupManager::new("py2bak");
        // a directory squatting on the sidecar path makes the rename fail
        fs::create_dir(manager.backup_path(&file)).unwrap();

        let err = manager.snapshot(&file).unwrap_err();
        assert!(matches!(err, Error::Backup { .. }));
        assert_eq!(fs::read_to_string(&file).unwrap(), "print 'x'\n");
        assert!(!dir.path().join("a.py.py2bak.tmp").exists());
    }

    #[test]
    fn test_snapshot_missing_source() {
        let dir = tempdir().unwrap();
        let manager = BackupManager::new("py2bak");
        assert!(manager.snapshot(&dir.path().join("gone.py")).is_err());
        assert!(!dir.path().join("gone.py.py2bak").exists());
    }

    #[test]
    fn test_restore_all_restores_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("pkg")).unwrap();
        let a = root.join("a.py");
        let b = root.join("pkg/b.py");
        let untouched = root.join("pkg/c.py");
        fs::write(&a, "original a").unwrap();
        fs::write(&b, "original b").unwrap();
        fs::write(&untouched, "no backup").unwrap();

        let manager = BackupManager::new("py2bak");
        manager.snapshot(&a).unwrap();
        manager.snapshot(&b).unwrap();
        fs::write(&a, "converted a").unwrap();
        fs::write(&b, "converted b").unwrap();

        let restored = manager.restore_all(root).unwrap();
        assert_eq!(restored, vec![a.clone(), b.clone()]);
        assert_eq!(fs::read_to_string(&a).unwrap(), "original a");
        assert_eq!(fs::read_to_string(&b).unwrap(), "original b");
        assert_eq!(fs::read_to_string(&untouched).unwrap(), "no backup");
        assert!(!manager.backup_path(&a).exists());

        let again = manager.restore_all(root).unwrap();
        assert!(again.is_empty());
        assert_eq!(fs::read_to_string(&a).unwrap(), "original a");
    }

    #[test]
    fn test_restore_all_skips_failures() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let manager = BackupManager::new("py2bak");

        // original path is a non-empty directory, so the move cannot land
        fs::create_dir_all(root.join("blocked.py/inner")).unwrap();
        fs::write(root.join("blocked.py.py2bak"), "backup").unwrap();
        fs::write(root.join("ok.py.py2bak"), "restored").unwrap();

        let restored = manager.restore_all(root).unwrap();
        assert_eq!(restored, vec![root.join("ok.py")]);
        assert_eq!(fs::read_to_string(root.join("ok.py")).unwrap(), "restored");
        assert!(root.join("blocked.py.py2bak").exists());
    }

    #[test]
    fn test_restore_all_missing_root() {
        let manager = BackupManager::new("py2bak");
        let dir = tempdir().unwrap();
        assert!(manager.restore_all(&dir.path().join("nope")).is_err());
    }
}
