//! Exclusive access to the monitoring log via rename
//!
//! The monitoring application appends to `<path>` and recreates it when it
//! is missing. Renaming it to `<path>.locked` hands the current contents to
//! this pass while the producer starts a fresh file. The locked file is
//! deleted once the pass has read it.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

pub const LOCK_SUFFIX: &str = ".locked";

/// Lock protocol failures. All of them end the pass.
#[derive(Debug)]
pub enum GateError {
    /// `<path>.locked` already exists, left behind by an earlier pass
    StaleLock { path: PathBuf },
    Rename { path: PathBuf, source: io::Error },
    Open { path: PathBuf, source: io::Error },
    Remove { path: PathBuf, source: io::Error },
}

impl std::fmt::Display for GateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateError::StaleLock { path } => {
                write!(f, "stale lock file {} from an earlier pass", path.display())
            }
            GateError::Rename { path, source } => {
                write!(f, "failed to lock {}: {}", path.display(), source)
            }
            GateError::Open { path, source } => {
                write!(f, "failed to open {}: {}", path.display(), source)
            }
            GateError::Remove { path, source } => {
                write!(f, "failed to remove {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for GateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GateError::StaleLock { .. } => None,
            GateError::Rename { source, .. }
            | GateError::Open { source, .. }
            | GateError::Remove { source, .. } => Some(source),
        }
    }
}

/// Path of the lock file for a monitoring log
pub fn locked_path(path: &Path) -> PathBuf {
    let mut locked = path.as_os_str().to_owned();
    locked.push(LOCK_SUFFIX);
    PathBuf::from(locked)
}

#[derive(Debug, Clone)]
pub struct FileGate {
    path: PathBuf,
    locked_path: PathBuf,
}

impl FileGate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let locked_path = locked_path(&path);
        Self { path, locked_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn locked_path(&self) -> &Path {
        &self.locked_path
    }

    /// Take possession of the log file.
    ///
    /// Returns `Ok(None)` when there is no file to process. A file that
    /// fails to open after the rename stays at the locked path so the next
    /// pass reports it instead of discarding unread data.
    pub fn acquire(&self) -> Result<Option<LockedFile>, GateError> {
        match self.path.try_exists() {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(source) => {
                return Err(GateError::Rename {
                    path: self.path.clone(),
                    source,
                })
            }
        }

        // rename(2) silently replaces an existing target
        if self.locked_path.exists() {
            return Err(GateError::StaleLock {
                path: self.locked_path.clone(),
            });
        }

        if let Err(source) = std::fs::rename(&self.path, &self.locked_path) {
            // The producer may have removed the file between the check and the rename
            if source.kind() == io::ErrorKind::NotFound {
                return Ok(None);
            }
            return Err(GateError::Rename {
                path: self.path.clone(),
                source,
            });
        }

        let file = File::open(&self.locked_path).map_err(|source| GateError::Open {
            path: self.locked_path.clone(),
            source,
        })?;

        log::debug!("🔒 Locked {}", self.locked_path.display());

        Ok(Some(LockedFile {
            path: self.locked_path.clone(),
            file: Some(file),
            released: false,
        }))
    }
}

/// A log file held by the current pass.
///
/// Call [`LockedFile::release`] when done. Dropping it unreleased deletes
/// the file too, logging any failure, so early returns never leave a lock.
#[derive(Debug)]
pub struct LockedFile {
    path: PathBuf,
    file: Option<File>,
    released: bool,
}

impl LockedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the read handle. Dropping it early is fine; release still deletes the file.
    pub fn take_reader(&mut self) -> Option<File> {
        self.file.take()
    }

    /// Close the handle and delete the locked file
    pub fn release(mut self) -> Result<(), GateError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), GateError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        drop(self.file.take());

        std::fs::remove_file(&self.path).map_err(|source| GateError::Remove {
            path: self.path.clone(),
            source,
        })?;

        log::debug!("🔓 Released {}", self.path.display());
        Ok(())
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            log::error!("❌ {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn write_log(dir: &Path, contents: &str) -> PathBuf {
        let path = dir.join("HardwareMonitoring.hml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_locked_path_appends_suffix() {
        assert_eq!(
            locked_path(Path::new("/logs/HardwareMonitoring.hml")),
            PathBuf::from("/logs/HardwareMonitoring.hml.locked")
        );
    }

    #[test]
    fn test_absent_file_is_not_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let gate = FileGate::new(temp_dir.path().join("missing.hml"));

        assert!(gate.acquire().unwrap().is_none());
        assert!(!gate.locked_path().exists());
    }

    #[test]
    fn test_acquire_renames_and_release_deletes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_log(temp_dir.path(), "01,_,GPU1\n");
        let gate = FileGate::new(&path);

        let mut locked = gate.acquire().unwrap().unwrap();
        assert!(!path.exists());
        assert!(gate.locked_path().exists());

        let mut contents = String::new();
        locked.take_reader().unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "01,_,GPU1\n");

        locked.release().unwrap();
        assert!(!gate.locked_path().exists());
    }

    #[test]
    fn test_producer_can_recreate_file_while_locked() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_log(temp_dir.path(), "old\n");
        let gate = FileGate::new(&path);

        let locked = gate.acquire().unwrap().unwrap();
        std::fs::write(&path, "new\n").unwrap();
        locked.release().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new\n");
    }

    #[test]
    fn test_stale_lock_is_fatal_and_not_overwritten() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_log(temp_dir.path(), "fresh\n");
        let gate = FileGate::new(&path);
        std::fs::write(gate.locked_path(), "stale\n").unwrap();

        let result = gate.acquire();
        assert!(matches!(result, Err(GateError::StaleLock { .. })));

        // Neither file was touched
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "fresh\n");
        assert_eq!(std::fs::read_to_string(gate.locked_path()).unwrap(), "stale\n");
    }

    #[test]
    fn test_drop_releases_lock() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_log(temp_dir.path(), "x\n");
        let gate = FileGate::new(&path);

        {
            let _locked = gate.acquire().unwrap().unwrap();
            assert!(gate.locked_path().exists());
        }
        assert!(!gate.locked_path().exists());
    }

    #[test]
    fn test_release_failure_is_reported() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = write_log(temp_dir.path(), "x\n");
        let gate = FileGate::new(&path);

        let locked = gate.acquire().unwrap().unwrap();
        std::fs::remove_file(gate.locked_path()).unwrap();

        assert!(matches!(locked.release(), Err(GateError::Remove { .. })));
    }
}
