//! Top-level workflows behind each subcommand.
//!
//! Every workflow reports failure as a [`WorkflowError`] naming the step that
//! failed; the caller prints it and exits unsuccessfully.

use std::io::{BufRead, Write};

use cluster_config::{ConfigError, ConfigRegistry};

use crate::components::ComponentFactory;
use crate::context::{IoStreams, ProcessContext};
use crate::errors::WorkflowError;
use crate::health::HealthReporter;
use crate::supervisor::InterruptSource;

mod daemon;
mod init;
mod state;
mod version;

pub(crate) use daemon::daemon;
pub(crate) use init::init;
pub(crate) use state::{cleanup, export, import, print_state_version, upgrade};
pub(crate) use version::print_version;

pub(crate) const WORKFLOW_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::workflow");

/// Collaborators the daemon is built from.
#[derive(Clone, Copy)]
pub(crate) struct Services<'a> {
    pub(crate) factory: &'a dyn ComponentFactory,
    pub(crate) reporter: &'a dyn HealthReporter,
    pub(crate) interrupts: &'a dyn InterruptSource,
}

/// How a successful workflow ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Finished normally.
    Success,
    /// The operator killed the peer during shutdown.
    Killed,
}

/// Result type shared by the workflows.
pub(crate) type WorkflowResult<T = ()> = Result<T, WorkflowError>;

/// Asks for confirmation unless `--force` was given.
pub(crate) fn confirmed<R: BufRead, W: Write, E: Write>(
    context: &ProcessContext,
    io: &mut IoStreams<'_, R, W, E>,
    question: &str,
) -> std::io::Result<bool> {
    if context.force() {
        return Ok(true);
    }
    io.confirm(question)
}

/// Loads `service.json` from the configuration directory.
pub(crate) fn load_configuration(
    context: &ProcessContext,
) -> Result<ConfigRegistry, ConfigError> {
    let mut registry = ConfigRegistry::standard();
    registry.load(context.config_path())?;
    Ok(registry)
}
