//! Interrupt handling for a running peer.
//!
//! The first interrupt starts an orderly shutdown in the background. The
//! second only warns the operator. The third ends the process without
//! waiting. Successful completion of the shutdown ends supervision in any
//! state.

use std::io::{self, Write};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::thread;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use strum::Display;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::health::HealthReporter;
use crate::runtime::PeerRuntime;

const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Banner printed when a second interrupt arrives during shutdown.
pub const SHUTDOWN_WARNING: &str = "!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!
Shutdown is taking too long! Press Ctrl-c again to manually kill cluster.
Note that this may corrupt the local cluster state.
!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!";

/// Exit status used when the process is killed by a third interrupt.
pub const FORCED_EXIT_CODE: u8 = 255;

/// States of the shutdown supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SupervisorState {
    /// No interrupt received.
    Running,
    /// Orderly shutdown in progress.
    Stopping,
    /// The operator was warned that shutdown is slow.
    Warned,
    /// The operator asked to end the process.
    Killed,
}

/// Action requested by a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Start the orderly shutdown.
    BeginShutdown,
    /// Print the operator warning.
    WarnOperator,
    /// End the process without waiting.
    ForceExit,
}

/// Interrupt-counting state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSupervisor {
    state: SupervisorState,
}

impl Default for ShutdownSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSupervisor {
    /// Supervisor in [`SupervisorState::Running`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SupervisorState::Running,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SupervisorState {
        self.state
    }

    /// Advances on an interrupt and returns the action to take.
    pub const fn on_interrupt(&mut self) -> Transition {
        let (next, action) = match self.state {
            SupervisorState::Running => (SupervisorState::Stopping, Transition::BeginShutdown),
            SupervisorState::Stopping => (SupervisorState::Warned, Transition::WarnOperator),
            SupervisorState::Warned | SupervisorState::Killed => {
                (SupervisorState::Killed, Transition::ForceExit)
            }
        };
        self.state = next;
        action
    }
}

/// Events consumed by the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// The operator sent an interrupt.
    Interrupt,
    /// The runtime finished shutting down.
    Completed,
    /// The orderly shutdown failed.
    ShutdownFailed(String),
}

/// How supervision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    /// The runtime shut down cleanly.
    Completed,
    /// The operator forced the process to end.
    Killed,
}

/// Errors raised by the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The orderly shutdown reported an error.
    #[error("shutting down cluster: {message}")]
    Shutdown {
        /// Reported failure.
        message: String,
    },
    /// Every event source went away.
    #[error("supervisor event channel closed unexpectedly")]
    EventsClosed,
    /// Writing the operator warning failed.
    #[error("failed to warn operator: {0}")]
    Output(#[source] io::Error),
}

/// Source of operator interrupts.
pub trait InterruptSource: Send + Sync {
    /// Starts forwarding interrupts into `events`.
    fn install(&self, events: Sender<SupervisorEvent>) -> Result<(), SupervisorError>;
}

/// Forwards SIGINT, SIGTERM and SIGHUP as interrupts.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInterrupts;

impl InterruptSource for SystemInterrupts {
    fn install(&self, events: Sender<SupervisorEvent>) -> Result<(), SupervisorError> {
        let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])
            .map_err(|source| SupervisorError::Install { source })?;
        thread::Builder::new()
            .name("signal-forwarder".to_owned())
            .spawn(move || {
                for signal in signals.forever() {
                    info!(target: SUPERVISOR_TARGET, signal, "interrupt received");
                    if events.send(SupervisorEvent::Interrupt).is_err() {
                        break;
                    }
                }
            })
            .map_err(|source| SupervisorError::Install { source })?;
        Ok(())
    }
}

/// Supervises `runtime` until it completes or the operator kills it.
///
/// `events` must receive every interrupt; `sender` feeds the same channel
/// and is used for completion and shutdown results.
///
/// # Errors
///
/// Returns [`SupervisorError::Shutdown`] when the orderly shutdown fails.
pub fn supervise<R, E>(
    runtime: Arc<R>,
    sender: &Sender<SupervisorEvent>,
    events: &Receiver<SupervisorEvent>,
    reporter: &dyn HealthReporter,
    operator: &mut E,
) -> Result<SupervisorExit, SupervisorError>
where
    R: PeerRuntime + ?Sized + 'static,
    E: Write,
{
    watch_completion(Arc::clone(&runtime), sender.clone())?;
    let mut supervisor = ShutdownSupervisor::new();
    loop {
        let event = events.recv().map_err(|_| SupervisorError::EventsClosed)?;
        match event {
            SupervisorEvent::Interrupt => {
                let action = supervisor.on_interrupt();
                reporter.supervisor_transition(supervisor.state());
                match action {
                    Transition::BeginShutdown => {
                        info!(target: SUPERVISOR_TARGET, "shutting down cluster peer");
                        begin_shutdown(Arc::clone(&runtime), sender.clone())?;
                    }
                    Transition::WarnOperator => {
                        warn!(target: SUPERVISOR_TARGET, "shutdown is taking too long");
                        writeln!(operator, "{SHUTDOWN_WARNING}")
                            .and_then(|()| operator.flush())
                            .map_err(SupervisorError::Output)?;
                    }
                    Transition::ForceExit => {
                        error!(target: SUPERVISOR_TARGET, "forced exit requested");
                        writeln!(operator, "exiting cluster NOW")
                            .and_then(|()| operator.flush())
                            .map_err(SupervisorError::Output)?;
                        return Ok(SupervisorExit::Killed);
                    }
                }
            }
            SupervisorEvent::Completed => {
                info!(target: SUPERVISOR_TARGET, "cluster peer stopped");
                return Ok(SupervisorExit::Completed);
            }
            SupervisorEvent::ShutdownFailed(message) => {
                return Err(SupervisorError::Shutdown { message });
            }
        }
    }
}

fn watch_completion<R>(
    runtime: Arc<R>,
    sender: Sender<SupervisorEvent>,
) -> Result<(), SupervisorError>
where
    R: PeerRuntime + ?Sized + 'static,
{
    thread::Builder::new()
        .name("completion-watcher".to_owned())
        .spawn(move || {
            runtime.wait_done();
            // The loop may already have returned; nothing is listening then.
            let _ = sender.send(SupervisorEvent::Completed);
        })
        .map(|_| ())
        .map_err(|source| SupervisorError::Install { source })
}

fn begin_shutdown<R>(runtime: Arc<R>, sender: Sender<SupervisorEvent>) -> Result<(), SupervisorError>
where
    R: PeerRuntime + ?Sized + 'static,
{
    thread::Builder::new()
        .name("orderly-shutdown".to_owned())
        .spawn(move || {
            if let Err(error) = runtime.shutdown() {
                let _ = sender.send(SupervisorEvent::ShutdownFailed(error.to_string()));
            }
        })
        .map(|_| ())
        .map_err(|source| SupervisorError::Install { source })
}
