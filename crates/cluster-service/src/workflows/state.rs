//! `state` subcommands: offline maintenance of the persisted shared state.

use std::fs;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{info, warn};

use cluster_config::RaftConfig;

use crate::context::{IoStreams, ProcessContext};
use crate::errors::{Doing, ServiceError, WorkflowError};
use crate::lock::ExecutionLock;
use crate::snapshot::{RotationOutcome, SnapshotManager, UpgradeOutcome};
use crate::state::STATE_VERSION;

use super::{WORKFLOW_TARGET, WorkflowResult, confirmed, load_configuration};

const IMPORT_QUESTION: &str =
    "The peer's state will be replaced.  Run with -h for details.  Continue? [y/n]:";
const CLEANUP_QUESTION: &str = "The peer's state will be removed from the load path.  \
                                Existing pins may be lost.  Continue? [y/n]:";

/// Prints the state format version this build reads and writes.
pub(crate) fn print_state_version<W: Write>(out: &mut W) -> WorkflowResult {
    writeln!(out, "{STATE_VERSION}").doing("printing state version")
}

/// Migrates the newest snapshot to the current format.
pub(crate) fn upgrade(context: &ProcessContext) -> WorkflowResult<UpgradeOutcome> {
    let lock = ExecutionLock::acquire(context.config_dir()).doing("acquiring execution lock")?;
    let snapshots = snapshots(context, "loading configuration")?;
    let outcome = snapshots.upgrade(&lock).doing("upgrading state")?;
    match outcome {
        UpgradeOutcome::AlreadyCurrent => {
            info!(target: WORKFLOW_TARGET, "state is already at the current version");
        }
        UpgradeOutcome::Upgraded { from } => {
            info!(target: WORKFLOW_TARGET, from, to = STATE_VERSION, "state upgraded");
        }
    }
    Ok(outcome)
}

/// Writes the current state as JSON to `file`, or to stdout.
pub(crate) fn export<R: BufRead, W: Write, E: Write>(
    context: &ProcessContext,
    io: &mut IoStreams<'_, R, W, E>,
    file: Option<&Path>,
) -> WorkflowResult {
    let snapshots = snapshots(context, "loading configuration")?;
    let pins = match file {
        Some(path) => export_to_file(&snapshots, path)?,
        None => snapshots.export(&mut *io.stdout).doing("exporting state")?,
    };
    info!(target: WORKFLOW_TARGET, pins, "state export finished");
    Ok(())
}

/// Writes the export beside `path` and moves it into place once complete, so
/// a failed export leaves any existing file untouched.
fn export_to_file(snapshots: &SnapshotManager, path: &Path) -> WorkflowResult<usize> {
    let file_error = |source| ServiceError::File {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut output = NamedTempFile::new_in(dir)
        .map_err(file_error)
        .doing("creating output file")?;
    let pins = {
        let mut writer = BufWriter::new(output.as_file_mut());
        let pins = snapshots.export(&mut writer).doing("exporting state")?;
        writer
            .flush()
            .map_err(file_error)
            .doing("writing output file")?;
        pins
    };
    output
        .persist(path)
        .map_err(|error| file_error(error.error))
        .doing("writing output file")?;
    Ok(pins)
}

/// Replaces the persisted state with an export from `path`, or from stdin.
///
/// Returns `false` when the operator declined.
pub(crate) fn import<R: BufRead, W: Write, E: Write>(
    context: &ProcessContext,
    io: &mut IoStreams<'_, R, W, E>,
    path: Option<&Path>,
) -> WorkflowResult<bool> {
    let lock = ExecutionLock::acquire(context.config_dir()).doing("acquiring execution lock")?;
    if !confirmed(context, io, IMPORT_QUESTION).doing("reading confirmation")? {
        return Ok(false);
    }
    let snapshots = snapshots(context, "loading configuration")?;

    let input = match path {
        Some(path) => fs::read(path)
            .map_err(|source| ServiceError::File {
                path: path.to_path_buf(),
                source,
            })
            .doing("reading import file")?,
        None => {
            info!(target: WORKFLOW_TARGET, "Reading from stdin, Ctrl-D to finish");
            let mut input = Vec::new();
            io.stdin
                .read_to_end(&mut input)
                .doing("reading import file")?;
            input
        }
    };
    snapshots.import(&lock, &input).doing("importing state")?;
    info!(
        target: WORKFLOW_TARGET,
        "the given state has been correctly imported to this peer.  \
         Make sure all peers have consistent states"
    );
    Ok(true)
}

/// Rotates the consensus data folder so the next start is empty.
///
/// Returns `None` when the operator declined.
pub(crate) fn cleanup<R: BufRead, W: Write, E: Write>(
    context: &ProcessContext,
    io: &mut IoStreams<'_, R, W, E>,
) -> WorkflowResult<Option<RotationOutcome>> {
    let lock = ExecutionLock::acquire(context.config_dir()).doing("acquiring execution lock")?;
    if !confirmed(context, io, CLEANUP_QUESTION).doing("reading confirmation")? {
        return Ok(None);
    }
    let snapshots = snapshots(context, "initializing configs")?;
    let outcome = snapshots
        .cleanup(&lock)
        .doing("cleaning up consensus data")?;
    if let RotationOutcome::Rotated { .. } = &outcome {
        warn!(
            target: WORKFLOW_TARGET,
            "the {} folder has been rotated.  Next start will use an empty state",
            snapshots.data_dir().display()
        );
    }
    Ok(Some(outcome))
}

fn snapshots(
    context: &ProcessContext,
    doing: &'static str,
) -> Result<SnapshotManager, WorkflowError> {
    load_configuration(context)
        .and_then(|registry| registry.get::<RaftConfig>().map(SnapshotManager::new))
        .doing(doing)
}
