//! Filesystem primitives underpinning every mutation
//!
//! All marker files, logs, and published outputs go through these helpers:
//! - `atomic_write` / `atomic_copy` - sibling temp file + rename
//! - `FileLock` - sentinel-file lock with polling and a deadline
//! - `safe_rmtree` - recursive delete with bounded retries
//! - `copy_dir_recursive` - mode-preserving directory mirror

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use uuid::Uuid;

/// Retries for `safe_rmtree` when the filesystem reports transient errors.
pub const DEFAULT_RMTREE_RETRIES: u32 = 3;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock file {} still held after {timeout:?}", .path.display())]
    Timeout { path: PathBuf, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn sibling_temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    target.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

/// Write `content` to `target` atomically: write a sibling temporary file in
/// the same directory, then rename it onto the target. Parent directories are
/// created as needed; the temporary is removed on any error.
pub fn atomic_write(target: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = sibling_temp_path(target);
    if let Err(err) = fs::write(&tmp, content) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }

    match fs::rename(&tmp, target) {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            Err(err)
        }
    }
}

/// Copy `src` onto `target` atomically. The copy lands in a sibling temporary
/// inside the target's directory first, so the rename never crosses a
/// filesystem boundary even when `src` lives on another one.
pub fn atomic_copy(src: &Path, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = sibling_temp_path(target);
    if let Err(err) = fs::copy(src, &tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }

    match fs::rename(&tmp, target) {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&tmp);
            Err(err)
        }
    }
}

/// Exclusive advisory lock backed by a sentinel file.
///
/// Acquisition atomically creates the sentinel (`create_new`), polling with a
/// short backoff until it succeeds or the deadline passes. The sentinel is
/// removed on drop, so the lock is released on every exit path.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let deadline = Instant::now() + timeout;
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(file) => {
                    use std::io::Write as _;
                    let mut file = file;
                    let _ = writeln!(file, "{}", std::process::id());
                    debug!(path = %path.display(), "acquired file lock");
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(LockError::Timeout {
                            path: path.to_path_buf(),
                            timeout,
                        });
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(err) => return Err(LockError::Io(err)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to release file lock");
            }
        }
    }
}

/// Recursively delete `path`, retrying up to `max_retries` times on transient
/// failures. A non-existent path is a no-op.
pub fn safe_rmtree(path: &Path, max_retries: u32) -> io::Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let mut attempt = 0;
    loop {
        match fs::remove_dir_all(path) {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                attempt += 1;
                if attempt >= max_retries {
                    return Err(err);
                }
                debug!(
                    path = %path.display(),
                    attempt,
                    "retrying recursive delete"
                );
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

/// Mirror the contents of `src` into `dst`, creating `dst` as needed.
/// File permission bits are preserved (`fs::copy` carries them), which keeps
/// `run.sh` executable inside a staging directory.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    if !src.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source directory not found: {}", src.display()),
        ));
    }

    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
