//! Single-instance lock file
//!
//! The lock is a file created with `create_new` that holds the owner's PID.
//! A lock left behind by a process that no longer exists is replaced. Two
//! daemons starting together may both judge the same lock stale, so the
//! replacement only removes the exact content that was judged, never retries
//! a lost `create_new`, and reads the PID back before claiming ownership.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Held lock; the file is removed on drop
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Take the lock at `path`
    ///
    /// # Returns
    ///
    /// - `Ok(InstanceLock)`: This process owns the lock
    /// - `Err`: Another live process holds it, or the file cannot be written
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {}", parent.display()))?;
        }

        match Self::create(&path) {
            Ok(lock) => Ok(lock),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let judged = fs::read_to_string(&path).unwrap_or_default();
                let holder = judged.trim().parse::<u32>().ok();

                if let Some(pid) = holder
                    && process_alive(pid)
                {
                    anyhow::bail!(
                        "Another wemod (PID {}) holds {}. Stop it first.",
                        pid,
                        path.display()
                    );
                }

                warn!("Replacing stale lock {} (holder {:?})", path.display(), holder);
                Self::replace_stale(&path, &judged)
            }
            Err(e) => {
                Err(e).with_context(|| format!("Cannot create lock {}", path.display()))
            }
        }
    }

    /// Swap a stale lock whose content was `judged` for one of our own
    fn replace_stale(path: &Path, judged: &str) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(current) if current != judged => anyhow::bail!(
                "Lock {} changed while being replaced; another wemod is starting",
                path.display()
            ),
            Ok(_) => match fs::remove_file(path) {
                Err(e) if e.kind() != ErrorKind::NotFound => {
                    return Err(e)
                        .with_context(|| format!("Cannot remove stale lock {}", path.display()));
                }
                _ => {}
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Cannot read stale lock {}", path.display()));
            }
        }

        match write_pid(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => anyhow::bail!(
                "Another wemod took {} while the stale lock was replaced",
                path.display()
            ),
            Err(e) => {
                return Err(e).with_context(|| format!("Cannot create lock {}", path.display()));
            }
        }

        let owner = fs::read_to_string(path).unwrap_or_default();
        if owner.trim() != std::process::id().to_string() {
            anyhow::bail!(
                "Another wemod took {} while the stale lock was replaced",
                path.display()
            );
        }

        info!("Acquired instance lock {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn create(path: &Path) -> std::io::Result<Self> {
        write_pid(path)?;
        info!("Acquired instance lock {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Cannot remove lock {}: {}", self.path.display(), e);
        }
    }
}

/// Create `path` exclusively and write our PID into it
fn write_pid(path: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "{}", std::process::id())
}

/// Whether a process with `pid` exists
///
/// Only Linux can answer this without extra dependencies; elsewhere every
/// holder is assumed alive.
fn process_alive(pid: u32) -> bool {
    if cfg!(target_os = "linux") {
        Path::new("/proc").join(pid.to_string()).exists()
    } else {
        true
    }
}
