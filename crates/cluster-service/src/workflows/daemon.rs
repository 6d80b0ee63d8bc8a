//! `daemon`: runs the peer until it is shut down.

use std::io::{BufRead, Write};
use std::sync::{Arc, mpsc};

use tracing::{debug, info};

use cluster_config::{ClusterConfig, ConfigRegistry, Multiaddr, RaftConfig};

use crate::assembler::assemble;
use crate::context::{ExecutionContext, IoStreams, ProcessContext};
use crate::errors::{Doing, ServiceError, WorkflowError};
use crate::lock::ExecutionLock;
use crate::snapshot::SnapshotManager;
use crate::strategy;
use crate::supervisor::{SupervisorExit, supervise};

use super::{Outcome, Services, WORKFLOW_TARGET, WorkflowResult, load_configuration};

/// Starts the peer and supervises it until it stops.
///
/// The execution lock is held for the whole run. With `upgrade`, persisted
/// state is migrated first; a peer without state starts normally.
pub(crate) fn daemon<R: BufRead, W: Write, E: Write>(
    context: &ProcessContext,
    io: &mut IoStreams<'_, R, W, E>,
    services: Services<'_>,
    upgrade: bool,
) -> WorkflowResult<Outcome> {
    info!(
        target: WORKFLOW_TARGET,
        "Initializing. For verbose output run with \"-l debug\". Please wait..."
    );

    let lock = ExecutionLock::acquire(context.config_dir()).doing("acquiring execution lock")?;
    let mut registry = load_configuration(context).doing("loading configuration")?;

    if upgrade {
        upgrade_state(&registry, &lock)?;
    }
    apply_overrides(context, &mut registry)?;
    strategy::describe(context.allocation()).doing("creating informer")?;

    let execution = ExecutionContext::new();
    let _cancel = execution.cancel_on_drop();
    let cluster = assemble(
        &execution,
        &registry,
        context.allocation(),
        services.factory,
        services.reporter,
    )
    .doing("starting cluster")?;
    let cluster = Arc::new(cluster);

    let (sender, events) = mpsc::channel();
    services
        .interrupts
        .install(sender.clone())
        .doing("installing signal handlers")?;
    let exit = supervise(cluster, &sender, &events, services.reporter, &mut *io.stderr)
        .doing("shutting down cluster")?;
    drop(lock);

    Ok(match exit {
        SupervisorExit::Completed => Outcome::Success,
        SupervisorExit::Killed => Outcome::Killed,
    })
}

fn upgrade_state(registry: &ConfigRegistry, lock: &ExecutionLock) -> WorkflowResult {
    let raft = registry.get::<RaftConfig>().doing("upgrading state")?;
    match SnapshotManager::new(raft).upgrade(lock) {
        Ok(outcome) => {
            debug!(target: WORKFLOW_TARGET, ?outcome, "state upgrade finished");
            Ok(())
        }
        Err(error) if error.is_absent() => {
            debug!(target: WORKFLOW_TARGET, "no state to upgrade");
            Ok(())
        }
        Err(error) => Err(WorkflowError::new("upgrading state", error)),
    }
}

/// Applies `--bootstrap` and `--leave` to the loaded cluster section.
pub(crate) fn apply_overrides(
    context: &ProcessContext,
    registry: &mut ConfigRegistry,
) -> WorkflowResult {
    let cluster = registry
        .get_mut::<ClusterConfig>()
        .doing("loading configuration")?;
    if let Some(address) = context.bootstrap() {
        if !cluster.peers.is_empty() && !context.force() {
            return Err(WorkflowError::new(
                "applying bootstrap address",
                ServiceError::PeersConfigured,
            ));
        }
        let address: Multiaddr = address.parse().doing("parsing bootstrap multiaddress")?;
        cluster.bootstrap = vec![address];
        cluster.peers.clear();
    }
    if context.leave() {
        cluster.leave_on_shutdown = true;
    }
    Ok(())
}
