//! Single-run guard.
//!
//! `RunGuard` is the in-process Idle/Running state shared between the
//! orchestrator and anything that wants to trigger a run. `RunLock` is the
//! cross-process equivalent, an exclusive lock on a file under home.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};

use anyhow::{Context, Result};
use fs2::FileExt;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

/// Observable state of the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Idle,
    Running,
}

/// Atomic Idle/Running state
#[derive(Debug, Default)]
pub struct RunGuard {
    state: AtomicU8,
}

impl RunGuard {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
        }
    }

    /// Move Idle -> Running. Returns `None` if a run is already in progress.
    ///
    /// The guard returns to Idle when the ticket is dropped, on every exit path.
    pub fn try_start(&self) -> Option<RunTicket<'_>> {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunTicket { guard: self })
    }

    pub fn state(&self) -> GuardState {
        match self.state.load(Ordering::Acquire) {
            RUNNING => GuardState::Running,
            _ => GuardState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == GuardState::Running
    }
}

/// Proof that the holder owns the current run
#[derive(Debug)]
pub struct RunTicket<'a> {
    guard: &'a RunGuard,
}

impl Drop for RunTicket<'_> {
    fn drop(&mut self) {
        self.guard.state.store(IDLE, Ordering::Release);
    }
}

/// Exclusive lock file held for the duration of a run
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Try to take the lock. Returns `Ok(None)` if another process holds it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create lock directory: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path: path.to_path_buf(),
            })),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to lock {}", path.display())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_start_is_refused() {
        let guard = RunGuard::new();

        let ticket = guard.try_start().expect("idle guard should start");
        assert!(guard.is_running());
        assert!(guard.try_start().is_none());

        drop(ticket);
        assert_eq!(guard.state(), GuardState::Idle);
        assert!(guard.try_start().is_some());
    }

    #[test]
    fn test_ticket_released_on_panic() {
        let guard = RunGuard::new();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ticket = guard.try_start().unwrap();
            panic!("stage blew up");
        }));

        assert!(result.is_err());
        assert!(!guard.is_running());
    }

    #[test]
    fn test_lock_file_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("pipeline.lock");

        let lock = RunLock::try_acquire(&path).unwrap().expect("first lock");
        assert_eq!(lock.path(), path.as_path());
        assert!(RunLock::try_acquire(&path).unwrap().is_none());

        drop(lock);
        assert!(RunLock::try_acquire(&path).unwrap().is_some());
    }
}
