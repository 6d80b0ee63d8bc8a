//! Process-wide inputs shared by every workflow.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cluster_config::DEFAULT_CONFIG_FILE;

/// Attempts allowed for a yes/no question before it counts as "no".
const PROMPT_ATTEMPTS: usize = 3;

/// Values resolved once from the command line and environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessContext {
    config_dir: PathBuf,
    config_path: PathBuf,
    force: bool,
    bootstrap: Option<String>,
    leave: bool,
    allocation: String,
    env_secret: Option<String>,
}

impl ProcessContext {
    /// Builds the context for `config_dir`.
    #[must_use]
    pub fn new(config_dir: PathBuf, allocation: impl Into<String>) -> Self {
        let config_path = config_dir.join(DEFAULT_CONFIG_FILE);
        Self {
            config_dir,
            config_path,
            force: false,
            bootstrap: None,
            leave: false,
            allocation: allocation.into(),
            env_secret: None,
        }
    }

    /// Skips confirmations and overwrite checks.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Joins the cluster through `address` instead of the configured peers.
    #[must_use]
    pub fn with_bootstrap(mut self, address: Option<String>) -> Self {
        self.bootstrap = address;
        self
    }

    /// Leaves the peer set on shutdown.
    #[must_use]
    pub fn with_leave(mut self, leave: bool) -> Self {
        self.leave = leave;
        self
    }

    /// Secret supplied through the environment.
    #[must_use]
    pub fn with_env_secret(mut self, secret: Option<String>) -> Self {
        self.env_secret = secret.filter(|value| !value.trim().is_empty());
        self
    }

    /// Configuration directory.
    #[must_use]
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Location of `service.json`.
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Whether `--force` was given.
    #[must_use]
    pub const fn force(&self) -> bool {
        self.force
    }

    /// Bootstrap address, when given.
    #[must_use]
    pub fn bootstrap(&self) -> Option<&str> {
        self.bootstrap.as_deref()
    }

    /// Whether `--leave` was given.
    #[must_use]
    pub const fn leave(&self) -> bool {
        self.leave
    }

    /// Allocation strategy name.
    #[must_use]
    pub fn allocation(&self) -> &str {
        &self.allocation
    }

    /// Secret supplied through the environment, when non-empty.
    #[must_use]
    pub fn env_secret(&self) -> Option<&str> {
        self.env_secret.as_deref()
    }
}

/// Standard streams used by workflows.
pub struct IoStreams<'a, R: BufRead, W: Write, E: Write> {
    pub(crate) stdin: &'a mut R,
    pub(crate) stdout: &'a mut W,
    pub(crate) stderr: &'a mut E,
}

impl<'a, R: BufRead, W: Write, E: Write> IoStreams<'a, R, W, E> {
    /// Bundles the streams.
    pub fn new(stdin: &'a mut R, stdout: &'a mut W, stderr: &'a mut E) -> Self {
        Self {
            stdin,
            stdout,
            stderr,
        }
    }

    /// Asks a yes/no question on stderr and reads the answer from stdin.
    ///
    /// `y` accepts; `n` or an empty line declines. Any other answer is
    /// retried up to three times in total before counting as a decline, as
    /// does end of input.
    ///
    /// # Errors
    ///
    /// Propagates stream failures.
    pub fn confirm(&mut self, question: &str) -> io::Result<bool> {
        for _ in 0..PROMPT_ATTEMPTS {
            write!(self.stderr, "{question} ")?;
            self.stderr.flush()?;
            let mut answer = String::new();
            if self.stdin.read_line(&mut answer)? == 0 {
                return Ok(false);
            }
            match answer.trim() {
                "y" | "Y" => return Ok(true),
                "n" | "N" | "" => return Ok(false),
                _ => writeln!(self.stderr, "Please press either 'y' or 'n'")?,
            }
        }
        Ok(false)
    }

    /// Prints `prompt` on stderr and reads one trimmed line from stdin.
    ///
    /// # Errors
    ///
    /// Propagates stream failures.
    pub fn read_value(&mut self, prompt: &str) -> io::Result<String> {
        write!(self.stderr, "{prompt}")?;
        self.stderr.flush()?;
        let mut value = String::new();
        self.stdin.read_line(&mut value)?;
        Ok(value.trim().to_owned())
    }
}

/// Cancellation flag handed to peer assembly.
///
/// Cancelled when the process tears down, so long-running constructors can
/// stop early.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    cancelled: Arc<AtomicBool>,
}

impl ExecutionContext {
    /// Fresh, active context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the context.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether the context has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Guard cancelling the context when dropped.
    #[must_use]
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop(self.clone())
    }
}

/// Cancels its [`ExecutionContext`] when dropped.
#[derive(Debug)]
pub struct CancelOnDrop(ExecutionContext);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
