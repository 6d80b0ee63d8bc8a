//! Exclusive lock over a configuration directory.
//!
//! The lock is a marker file inside the configuration directory holding an
//! exclusive advisory `flock` and the PID of its owner. The kernel drops the
//! advisory lock when its owner exits, so a marker left behind by a dead
//! process is simply locked again by the next caller. The marker is removed
//! when the [`ExecutionLock`] is dropped.

use std::fmt;
use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use thiserror::Error;
use tracing::{debug, info, warn};

use std::os::unix::fs::{DirBuilderExt, MetadataExt, OpenOptionsExt};

const LOCK_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lock");

/// Name of the lock file inside the configuration directory.
pub const LOCK_FILE: &str = "cluster.lock";

/// Attempts made when the marker is replaced between opening and locking it.
const ACQUIRE_ATTEMPTS: usize = 3;

/// Errors raised while taking the execution lock.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another live process holds the lock.
    #[error(
        "another process is using '{}' (lock held by {}); stop it before retrying",
        dir.display(),
        holder_label(*pid)
    )]
    Contention {
        /// Configuration directory being guarded.
        dir: PathBuf,
        /// PID recorded by the holder, when readable.
        pid: Option<u32>,
    },
    /// The configuration directory could not be created.
    #[error("failed to create directory '{path}': {source}")]
    Directory {
        /// Directory path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Creating or writing the lock file failed.
    #[error("failed to create lock file '{path}': {source}")]
    Create {
        /// Lock file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The advisory lock could not be requested.
    #[error("failed to lock '{path}': {source}")]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// Errno reported by `flock`.
        #[source]
        source: Errno,
    },
}

fn holder_label(pid: Option<u32>) -> String {
    pid.map_or_else(|| "an unknown process".to_owned(), |pid| format!("pid {pid}"))
}

/// Held lock over a configuration directory.
pub struct ExecutionLock {
    dir: PathBuf,
    path: PathBuf,
    _file: Flock<File>,
}

impl fmt::Debug for ExecutionLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionLock")
            .field("dir", &self.dir)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ExecutionLock {
    /// Takes the lock for `dir`, creating the directory when needed.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Contention`] when another live process holds the
    /// lock.
    pub fn acquire(dir: &Path) -> Result<Self, LockError> {
        ensure_directory(dir)?;
        let path = dir.join(LOCK_FILE);
        let file = acquire_file(dir, &path)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            path,
            _file: file,
        })
    }

    /// Directory guarded by this lock.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ExecutionLock {
    // Runs before `_file` unlocks, so the marker never outlives the lock.
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(
                target: LOCK_TARGET,
                file = %self.path.display(),
                "released execution lock"
            ),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => warn!(
                target: LOCK_TARGET,
                file = %self.path.display(),
                error = %error,
                "failed to remove lock file"
            ),
        }
    }
}

fn ensure_directory(dir: &Path) -> Result<(), LockError> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    builder.mode(0o700);
    builder.create(dir).map_err(|source| LockError::Directory {
        path: dir.to_path_buf(),
        source,
    })
}

fn acquire_file(dir: &Path, path: &Path) -> Result<Flock<File>, LockError> {
    let create_error = |source| LockError::Create {
        path: path.to_path_buf(),
        source,
    };
    for _ in 0..ACQUIRE_ATTEMPTS {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(path)
            .map_err(create_error)?;
        let mut locked = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(locked) => locked,
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                let pid = read_pid(path);
                info!(
                    target: LOCK_TARGET,
                    pid,
                    file = %path.display(),
                    "execution lock held by a live process"
                );
                return Err(LockError::Contention {
                    dir: dir.to_path_buf(),
                    pid,
                });
            }
            Err((_, source)) => {
                return Err(LockError::Lock {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        // The previous holder may have removed the marker between our open
        // and lock; the lock then guards an unlinked file.
        if !is_current_marker(&*locked, path).map_err(create_error)? {
            debug!(
                target: LOCK_TARGET,
                file = %path.display(),
                "lock file replaced while locking; retrying"
            );
            continue;
        }
        if let Some(pid) = read_pid(path) {
            warn!(
                target: LOCK_TARGET,
                pid,
                file = %path.display(),
                "lock holder no longer running; reclaiming stale lock"
            );
        }
        record_holder(&mut *locked).map_err(create_error)?;
        info!(
            target: LOCK_TARGET,
            file = %path.display(),
            "acquired execution lock"
        );
        return Ok(locked);
    }
    Err(LockError::Contention {
        dir: dir.to_path_buf(),
        pid: read_pid(path),
    })
}

fn is_current_marker(file: &File, path: &Path) -> io::Result<bool> {
    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(current.dev() == held.dev() && current.ino() == held.ino()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error),
    }
}

fn record_holder(file: &mut File) -> io::Result<()> {
    file.set_len(0)?;
    writeln!(file, "{}", process::id())?;
    file.sync_all()
}

fn read_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok().filter(|pid| *pid != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use rstest::rstest;
    use tempfile::TempDir;

    // PIDs above the kernel's pid_max never belong to a live process.
    const DEAD_PID: &str = "2147483000\n";

    #[test]
    fn second_acquisition_is_refused_while_held() {
        let dir = TempDir::new().expect("temp dir");
        let held = ExecutionLock::acquire(dir.path()).expect("first lock");
        let error = ExecutionLock::acquire(dir.path()).expect_err("second lock must fail");
        match error {
            LockError::Contention { pid, .. } => assert_eq!(pid, Some(process::id())),
            other => panic!("unexpected error: {other}"),
        }
        drop(held);
        ExecutionLock::acquire(dir.path()).expect("lock should be free after release");
    }

    #[test]
    fn release_removes_the_lock_file() {
        let dir = TempDir::new().expect("temp dir");
        let lock = ExecutionLock::acquire(dir.path()).expect("lock");
        let path = lock.path().to_path_buf();
        assert!(path.exists());
        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn creates_missing_directory() {
        let dir = TempDir::new().expect("temp dir");
        let nested = dir.path().join("nested").join("config");
        let lock = ExecutionLock::acquire(&nested).expect("lock");
        assert_eq!(lock.dir(), nested.as_path());
    }

    #[rstest]
    #[case(DEAD_PID)]
    #[case("")]
    #[case("not-a-pid\n")]
    fn unlocked_marker_is_reclaimed(#[case] content: &str) {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join(LOCK_FILE), content).expect("write stale lock");
        let lock = ExecutionLock::acquire(dir.path()).expect("stale lock should be reclaimed");
        let recorded = fs::read_to_string(lock.path()).expect("read lock");
        assert_eq!(recorded.trim(), process::id().to_string());
    }

    #[test]
    fn holder_still_writing_its_pid_is_contention() {
        let dir = TempDir::new().expect("temp dir");
        let marker = File::create(dir.path().join(LOCK_FILE)).expect("create marker");
        let _holder = Flock::lock(marker, FlockArg::LockExclusiveNonblock)
            .map_err(|(_, errno)| errno)
            .expect("lock marker");

        let error = ExecutionLock::acquire(dir.path()).expect_err("lock must be refused");
        assert!(matches!(error, LockError::Contention { pid: None, .. }));
    }

    #[test]
    fn concurrent_acquisition_has_one_winner() {
        let dir = Arc::new(TempDir::new().expect("temp dir"));
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let dir = Arc::clone(&dir);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    ExecutionLock::acquire(dir.path())
                })
            })
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread panicked"))
            .collect();
        let winners = results.iter().filter(|result| result.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(
            results
                .iter()
                .filter_map(|result| result.as_ref().err())
                .all(|error| matches!(error, LockError::Contention { .. }))
        );
    }

    #[test]
    fn racing_reclaims_of_a_stale_lock_never_overlap() {
        const CONTENDERS: usize = 8;
        for _ in 0..50 {
            let dir = Arc::new(TempDir::new().expect("temp dir"));
            fs::write(dir.path().join(LOCK_FILE), DEAD_PID).expect("write stale lock");
            let barrier = Arc::new(Barrier::new(CONTENDERS));
            let holders = Arc::new(AtomicUsize::new(0));
            let overlaps = Arc::new(AtomicUsize::new(0));
            let handles: Vec<_> = (0..CONTENDERS)
                .map(|_| {
                    let dir = Arc::clone(&dir);
                    let barrier = Arc::clone(&barrier);
                    let holders = Arc::clone(&holders);
                    let overlaps = Arc::clone(&overlaps);
                    thread::spawn(move || {
                        barrier.wait();
                        let Ok(lock) = ExecutionLock::acquire(dir.path()) else {
                            return false;
                        };
                        if holders.fetch_add(1, Ordering::SeqCst) > 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(Duration::from_millis(5));
                        holders.fetch_sub(1, Ordering::SeqCst);
                        drop(lock);
                        true
                    })
                })
                .collect();
            let winners = handles
                .into_iter()
                .map(|handle| handle.join().expect("thread panicked"))
                .filter(|won| *won)
                .count();
            assert!(winners >= 1, "someone must reclaim the stale lock");
            assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        }
    }
}
