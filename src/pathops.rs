//! Path and atomic I/O primitives
//!
//! Small filesystem helpers the pipelines are built from: shared directory
//! creation, write-then-rename publishes, mtime stamping, advisory file
//! locks with a timeout, and globbing. Every destructive publish in the
//! crate goes through [`write_file`] so partially written files are never
//! visible at their final location.

use crate::error::{HolotreeError, Result};
use filetime::FileTime;
use fs4::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Poll interval while waiting on a contended lock
const LOCK_RETRY: Duration = Duration::from_millis(100);
/// How long to wait silently before telling the user about a lock
const LOCK_PATIENCE: Duration = Duration::from_secs(2);

/// Create a directory tree with shared mode bits
///
/// Equivalent to `mkdir -p`; the leaf directory is widened so that other
/// users of a shared holotree can create entries under it.
pub fn make_shared_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

/// Write bytes to a file atomically with the given mode
///
/// The content lands in a temporary file in the same directory and is
/// renamed over the final path, so concurrent readers see either the old
/// file or the complete new one.
pub fn write_file(path: &Path, content: &[u8], mode: u32) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| HolotreeError::internal(format!("no parent directory for {:?}", path)))?;
    fs::create_dir_all(parent)?;
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    set_mode(temp.path(), mode)?;
    temp.persist(path)
        .map_err(|err| HolotreeError::Io(err.error))?;
    Ok(())
}

/// Set POSIX mode bits on a path
#[cfg(unix)]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

/// Set POSIX mode bits on a path (no-op beyond readonly on non-unix)
#[cfg(not(unix))]
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_readonly(mode & 0o200 == 0);
    fs::set_permissions(path, perms)?;
    Ok(())
}

/// Create the file if missing, then set its mtime
pub fn touch_when(path: &Path, unix_time: i64) -> Result<()> {
    if !path.exists() {
        File::create(path)?;
    }
    filetime::set_file_mtime(path, FileTime::from_unix_time(unix_time, 0))?;
    Ok(())
}

/// Touch that tolerates concurrent creators
///
/// Usage sentinels are force-touched from many parallel restores; creation
/// races are benign, the last mtime wins.
pub fn force_touch_when(path: &Path, unix_time: i64) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let created = OpenOptions::new().create(true).write(true).open(path);
    match created {
        Ok(_) => {
            if let Err(err) = filetime::set_file_mtime(path, FileTime::from_unix_time(unix_time, 0))
            {
                warn!("Could not touch {:?}: {}", path, err);
            }
        }
        Err(err) => warn!("Could not create touch file {:?}: {}", path, err),
    }
}

/// Modification time of a path in seconds since the Unix epoch
pub fn modtime(path: &Path) -> Result<i64> {
    let meta = fs::symlink_metadata(path)?;
    Ok(FileTime::from_last_modification_time(&meta).unix_seconds())
}

/// Whether the path exists and is a regular file
pub fn is_file(path: &Path) -> bool {
    path.is_file()
}

/// Whether the path exists at all
pub fn file_exists(path: &Path) -> bool {
    path.exists()
}

/// Non-recursive glob inside one directory
///
/// Returns matches of `pattern` directly under `dir`, sorted. Unreadable
/// entries are skipped.
pub fn glob_files(dir: &Path, pattern: &str) -> Vec<PathBuf> {
    let full = dir.join(pattern);
    let Some(full) = full.to_str() else {
        return Vec::new();
    };
    let mut found: Vec<PathBuf> = match glob::glob(full) {
        Ok(paths) => paths.filter_map(|entry| entry.ok()).collect(),
        Err(_) => Vec::new(),
    };
    found.sort();
    found
}

/// Create a symlink (cross-platform)
#[cfg(unix)]
pub fn create_symlink(target: &str, link: &Path) -> Result<()> {
    use std::os::unix::fs::symlink;
    symlink(target, link)?;
    Ok(())
}

/// Create a symlink (Windows)
#[cfg(windows)]
pub fn create_symlink(target: &str, link: &Path) -> Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};

    let resolved = link.parent().map(|p| p.join(target));
    if resolved.map(|p| p.is_dir()).unwrap_or(false) {
        symlink_dir(target, link)?;
    } else {
        symlink_file(target, link)?;
    }
    Ok(())
}

/// RAII guard over an advisory file lock
///
/// Dropping the guard releases the lock. The lock file itself is left in
/// place for the next taker.
#[derive(Debug)]
pub struct Locker {
    file: File,
    path: PathBuf,
}

impl Locker {
    /// Acquire an exclusive advisory lock on `path` within `timeout`
    ///
    /// With `shared` set, the lock file is opened with permissions wide
    /// enough for other users of the holotree to contend on it. Acquisition
    /// past [`LOCK_PATIENCE`] logs a waiting message once; exceeding the
    /// timeout fails with [`HolotreeError::LockTimeout`].
    pub fn acquire(path: &Path, timeout: Duration, shared: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        if shared {
            let _ = set_mode(path, 0o666);
        }

        let started = Instant::now();
        let mut announced = false;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    })
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {}
                Err(err) if err.raw_os_error() == fs4::lock_contended_error().raw_os_error() => {}
                Err(err) => return Err(err.into()),
            }
            if started.elapsed() >= timeout {
                return Err(HolotreeError::LockTimeout(path.to_path_buf()));
            }
            if !announced && started.elapsed() >= LOCK_PATIENCE {
                info!("Waiting for lock on {:?}", path);
                announced = true;
            }
            std::thread::sleep(LOCK_RETRY);
        }
    }

    /// Path of the underlying lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Locker {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_file_is_atomic_publish() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("nested").join("out.txt");

        write_file(&target, b"payload", 0o644).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"payload");

        // overwrite keeps the path readable throughout
        write_file(&target, b"second", 0o644).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");
    }

    #[test]
    fn test_touch_when_creates_and_stamps() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("stamp");

        touch_when(&target, 1610000000).unwrap();
        assert!(target.is_file());
        assert_eq!(modtime(&target).unwrap(), 1610000000);

        touch_when(&target, 1620000000).unwrap();
        assert_eq!(modtime(&target).unwrap(), 1620000000);
    }

    #[test]
    fn test_force_touch_when_tolerates_missing_parent() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("used").join("sentinel");
        force_touch_when(&target, 1610000000);
        assert!(target.is_file());
    }

    #[test]
    fn test_glob_files_filters_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["aav12.linux", "bbv12.linux", "bbv12.linux.info", "zz.txt"] {
            fs::write(temp_dir.path().join(name), b"x").unwrap();
        }
        let found = glob_files(temp_dir.path(), "[0-9a-f]*v12.*");
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["aav12.linux", "bbv12.linux", "bbv12.linux.info"]);
    }

    #[test]
    fn test_locker_excludes_second_taker() {
        let temp_dir = TempDir::new().unwrap();
        let lock_path = temp_dir.path().join("space.lck");

        let held = Locker::acquire(&lock_path, Duration::from_millis(200), false).unwrap();
        let denied = Locker::acquire(&lock_path, Duration::from_millis(200), false);
        assert!(matches!(denied, Err(HolotreeError::LockTimeout(_))));

        drop(held);
        Locker::acquire(&lock_path, Duration::from_millis(200), false).unwrap();
    }
}
