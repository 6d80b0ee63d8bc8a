//! Bootstrap and lifecycle supervision for an IPFS Cluster peer.
//!
//! The crate backs the `ipfs-cluster-service` binary. It owns argument
//! parsing, configuration bootstrapping, the execution lock that keeps two
//! processes off the same configuration directory, offline maintenance of the
//! persisted shared state, ordered assembly of the peer's components, and the
//! interrupt-driven shutdown supervisor.
//!
//! Assembly is fail-fast: the first component that cannot be built stops the
//! sequence and everything built before it is closed in reverse order. Health
//! reporting hooks emit structured telemetry at each step.

use std::ffi::OsString;
use std::io::{BufRead, Write};
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use tracing::{error, warn};

use cluster_config::{CLUSTER_SECRET_ENV, default_config_dir};

mod assembler;
mod cli;
mod components;
mod context;
mod errors;
mod health;
mod lock;
mod runtime;
pub mod snapshot;
mod state;
mod strategy;
mod supervisor;
mod telemetry;
mod version;
mod workflows;

pub use assembler::{AssemblyError, AssemblyStep, assemble};
pub use components::{
    BasicMonitor, ClusterHost, Component, ComponentError, ComponentFactory, IpfsConnector,
    LocalComponentFactory, MapPinTracker, PinCounter, RestApi, Sharder, TrackStatus,
};
pub use context::{CancelOnDrop, ExecutionContext, IoStreams, ProcessContext};
pub use errors::{ServiceError, WorkflowError};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use lock::{ExecutionLock, LOCK_FILE, LockError};
pub use runtime::{Cluster, Completion, PeerParts, PeerRuntime, RuntimeError};
pub use state::{MapState, Pin, STATE_VERSION};
pub use strategy::{
    AllocationOrder, Allocator, Candidate, DiskInformer, Informer, InformerKind, Metric,
    NumpinInformer, STRATEGIES, SortingAllocator, StrategyDescriptor, StrategyError, StrategyPair,
    describe, select,
};
pub use supervisor::{
    FORCED_EXIT_CODE, InterruptSource, SHUTDOWN_WARNING, ShutdownSupervisor, SupervisorError,
    SupervisorEvent, SupervisorExit, SupervisorState, SystemInterrupts, Transition, supervise,
};
pub use telemetry::{TelemetryError, TelemetryHandle, TelemetrySettings};
pub use version::VersionError;

use cli::{Cli, Command, StateCommand};
use workflows::{Outcome, Services};

/// Name of the service binary, used in operator-facing hints.
pub const PROGRAM_NAME: &str = "ipfs-cluster-service";

const SERVICE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service");

/// Runs the service with the process environment and system signal handling.
#[must_use]
pub fn run<I, R, W, E>(args: I, stdin: &mut R, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: BufRead,
    W: Write,
    E: Write,
{
    let mut io = IoStreams::new(stdin, stdout, stderr);
    let reporter = StructuredHealthReporter::new();
    let services = Services {
        factory: &LocalComponentFactory,
        reporter: &reporter,
        interrupts: &SystemInterrupts,
    };
    let env_secret = std::env::var(CLUSTER_SECRET_ENV).ok();
    run_with(args, &mut io, env_secret, services)
}

/// Runs the service with injected collaborators.
pub(crate) fn run_with<I, R, W, E>(
    args: I,
    io: &mut IoStreams<'_, R, W, E>,
    env_secret: Option<String>,
    services: Services<'_>,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    R: BufRead,
    W: Write,
    E: Write,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => return usage(&error, io),
    };

    let settings = TelemetrySettings {
        level: cli.loglevel,
        debug: cli.debug,
        format: cli.log_format,
    };
    if let Err(error) = telemetry::initialise(settings) {
        let _ = writeln!(io.stderr, "warning: {error}");
    }

    if !cli.stray.is_empty() {
        warn!(target: SERVICE_TARGET, arguments = ?cli.stray, "unknown subcommand");
        let _ = writeln!(
            io.stderr,
            "unknown subcommand. Run \"{PROGRAM_NAME} help\" for more info"
        );
        return ExitCode::FAILURE;
    }

    let context = process_context(&cli, env_secret);
    let command = cli.command.unwrap_or(Command::Daemon { upgrade: false });
    match dispatch(command, &context, io, services) {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::Killed) => ExitCode::from(FORCED_EXIT_CODE),
        Err(failure) => {
            error!(target: SERVICE_TARGET, doing = failure.doing(), error = %failure.cause());
            let _ = writeln!(io.stderr, "{failure}");
            ExitCode::FAILURE
        }
    }
}

fn dispatch<R, W, E>(
    command: Command,
    context: &ProcessContext,
    io: &mut IoStreams<'_, R, W, E>,
    services: Services<'_>,
) -> Result<Outcome, WorkflowError>
where
    R: BufRead,
    W: Write,
    E: Write,
{
    match command {
        Command::Init {
            custom_secret,
            force,
        } => workflows::init(context, io, custom_secret, force)?,
        Command::Daemon { upgrade } => return workflows::daemon(context, io, services, upgrade),
        Command::State { action } => match action {
            StateCommand::Version => workflows::print_state_version(&mut *io.stdout)?,
            StateCommand::Upgrade => {
                workflows::upgrade(context)?;
            }
            StateCommand::Export { file } => workflows::export(context, io, file.as_deref())?,
            StateCommand::Import { path } => {
                workflows::import(context, io, path.as_deref())?;
            }
            StateCommand::Cleanup => {
                workflows::cleanup(context, io)?;
            }
        },
        Command::Version => workflows::print_version(&mut *io.stdout)?,
    }
    Ok(Outcome::Success)
}

fn process_context(cli: &Cli, env_secret: Option<String>) -> ProcessContext {
    let config_dir = cli.config.clone().unwrap_or_else(default_config_dir);
    let config_dir = std::path::absolute(&config_dir).unwrap_or(config_dir);
    ProcessContext::new(config_dir, cli.alloc.clone())
        .with_force(cli.force)
        .with_bootstrap(cli.bootstrap.clone())
        .with_leave(cli.leave)
        .with_env_secret(env_secret)
}

fn usage<R, W, E>(error: &clap::Error, io: &mut IoStreams<'_, R, W, E>) -> ExitCode
where
    R: BufRead,
    W: Write,
    E: Write,
{
    match error.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            let _ = write!(io.stdout, "{}", error.render());
            ExitCode::SUCCESS
        }
        _ => {
            let _ = write!(io.stderr, "{}", error.render());
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests;
