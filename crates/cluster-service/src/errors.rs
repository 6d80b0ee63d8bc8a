//! Error types surfaced by the service workflows.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use cluster_config::{ConfigError, MultiaddrParseError, SecretError};

use crate::assembler::AssemblyError;
use crate::lock::LockError;
use crate::snapshot::SnapshotError;
use crate::strategy::StrategyError;
use crate::supervisor::SupervisorError;
use crate::telemetry::TelemetryError;
use crate::PROGRAM_NAME;

/// Failures a workflow step can report.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Loading, generating or saving configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// `init` would overwrite an existing configuration.
    #[error("{source}. Try running: {} -f init", PROGRAM_NAME)]
    ConfigExists {
        /// Underlying refusal.
        #[source]
        source: ConfigError,
    },
    /// Another process holds the configuration directory.
    #[error(transparent)]
    Lock(#[from] LockError),
    /// A user-supplied secret is invalid.
    #[error(transparent)]
    Secret(#[from] SecretError),
    /// A user-supplied multiaddress is invalid.
    #[error(transparent)]
    Multiaddr(#[from] MultiaddrParseError),
    /// `--bootstrap` was combined with configured peers.
    #[error(
        "the configuration provides cluster.peers. Use -f to ignore and proceed bootstrapping"
    )]
    PeersConfigured,
    /// The allocation strategy name is unknown.
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    /// A snapshot operation failed.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    /// Peer assembly failed.
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    /// Supervision of the running peer failed.
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    /// Logging could not be set up.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// A file named on the command line could not be used.
    #[error("'{path}': {source}")]
    File {
        /// Offending path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Reading or writing the standard streams failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A failed workflow step, displayed as `error <doing>: <cause>`.
#[derive(Debug, Error)]
#[error("error {doing}: {source}")]
pub struct WorkflowError {
    doing: &'static str,
    #[source]
    source: ServiceError,
}

impl WorkflowError {
    /// Wraps `source` as the failure of step `doing`.
    #[must_use]
    pub fn new(doing: &'static str, source: impl Into<ServiceError>) -> Self {
        Self {
            doing,
            source: source.into(),
        }
    }

    /// Step that failed.
    #[must_use]
    pub const fn doing(&self) -> &'static str {
        self.doing
    }

    /// Underlying failure.
    #[must_use]
    pub const fn cause(&self) -> &ServiceError {
        &self.source
    }
}

/// Labels a fallible step of a workflow.
pub(crate) trait Doing<T> {
    fn doing(self, doing: &'static str) -> Result<T, WorkflowError>;
}

impl<T, E> Doing<T> for Result<T, E>
where
    E: Into<ServiceError>,
{
    fn doing(self, doing: &'static str) -> Result<T, WorkflowError> {
        self.map_err(|source| WorkflowError::new(doing, source))
    }
}
