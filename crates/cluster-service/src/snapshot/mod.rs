//! Persisted shared state: snapshots, migrations, exports, and cleanup.
//!
//! Every operation here except [`SnapshotManager::export`] mutates persisted
//! state and therefore takes a borrowed [`ExecutionLock`] as proof that the
//! caller holds the configuration directory exclusively.

mod migrations;
mod rotation;
mod store;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use cluster_config::RaftConfig;

use crate::lock::ExecutionLock;
use crate::state::{MapState, Pin, STATE_VERSION};
use crate::version::{self, VersionError};

pub use migrations::{MigrationError, migrate};
pub use rotation::{RotationOutcome, generation_path, rotate};
pub use store::{SnapshotEnvelope, SnapshotStore, StoredSnapshot};

pub(crate) const SNAPSHOT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::snapshot");

/// Errors raised by snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// No snapshot exists in the data directory.
    #[error("no state snapshot found in '{}'", dir.display())]
    Absent {
        /// Snapshot directory searched.
        dir: PathBuf,
    },
    /// The snapshot version is not the one this build runs with.
    #[error(transparent)]
    Version(#[from] VersionError),
    /// Migrating an older payload failed.
    #[error(transparent)]
    Migration(#[from] MigrationError),
    /// A snapshot file or directory could not be accessed.
    #[error("failed to access '{path}': {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// A snapshot file could not be decoded.
    #[error("snapshot '{path}' is malformed: {source}")]
    Decode {
        /// Snapshot file.
        path: PathBuf,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
    /// Imported data is not a state export.
    #[error("imported state is malformed: {0}")]
    Input(#[source] serde_json::Error),
    /// A payload at the current version does not decode into pins.
    #[error("state payload is malformed: {0}")]
    Payload(#[source] serde_json::Error),
    /// Encoding a snapshot or export failed.
    #[error("failed to encode state: {0}")]
    Encode(#[source] serde_json::Error),
    /// Writing the export failed.
    #[error("failed to write exported state: {0}")]
    Output(#[source] io::Error),
}

impl SnapshotError {
    /// Whether the error only reports that no snapshot exists yet.
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent { .. })
    }
}

/// Human-readable export format.
#[derive(Debug, Serialize, Deserialize)]
struct ExportDocument<P> {
    version: u32,
    pins: P,
}

/// Result of `state upgrade`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeOutcome {
    /// The snapshot already used the current format.
    AlreadyCurrent,
    /// The snapshot was rewritten from `from` to the current format.
    Upgraded {
        /// Version found on disk.
        from: u32,
    },
}

/// Snapshot operations over the data directory of one peer.
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    data_dir: PathBuf,
    store: SnapshotStore,
    rotation_depth: usize,
}

impl SnapshotManager {
    /// Manager for the data directory described by `raft`.
    #[must_use]
    pub fn new(raft: &RaftConfig) -> Self {
        let data_dir = raft.data_dir();
        let store = SnapshotStore::new(&data_dir, raft.snapshot_retain);
        Self {
            data_dir,
            store,
            rotation_depth: raft.rotation_depth,
        }
    }

    /// Consensus data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Underlying snapshot store.
    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// State held by the newest snapshot, when one exists.
    ///
    /// # Errors
    ///
    /// Fails when the snapshot is unreadable or not at the current version.
    pub fn latest_state(&self) -> Result<Option<MapState>, SnapshotError> {
        let Some(snapshot) = self.store.latest()? else {
            return Ok(None);
        };
        version::check(snapshot.envelope.version)?;
        let state =
            serde_json::from_value(snapshot.envelope.payload).map_err(SnapshotError::Payload)?;
        Ok(Some(state))
    }

    /// Writes `state` as a new snapshot at the current version.
    ///
    /// # Errors
    ///
    /// Fails when encoding or writing the snapshot fails.
    pub fn persist(&self, state: &MapState) -> Result<u64, SnapshotError> {
        let payload = serde_json::to_value(state).map_err(SnapshotError::Encode)?;
        self.store.append(&SnapshotEnvelope {
            version: STATE_VERSION,
            payload,
        })
    }

    /// Writes the current state to `out` in the export format.
    ///
    /// # Errors
    ///
    /// Fails with [`SnapshotError::Absent`] when there is nothing to export
    /// and with [`SnapshotError::Version`] when the snapshot needs upgrading.
    pub fn export<W: Write>(&self, out: &mut W) -> Result<usize, SnapshotError> {
        let state = self.latest_state()?.ok_or_else(|| self.absent())?;
        let pins: Vec<&Pin> = state.pins().collect();
        let document = ExportDocument {
            version: STATE_VERSION,
            pins,
        };
        serde_json::to_writer_pretty(&mut *out, &document).map_err(SnapshotError::Encode)?;
        out.write_all(b"\n").map_err(SnapshotError::Output)?;
        out.flush().map_err(SnapshotError::Output)?;
        info!(
            target: SNAPSHOT_TARGET,
            pins = state.len(),
            "state exported"
        );
        Ok(state.len())
    }

    /// Replaces the persisted state with an export read from `input`.
    ///
    /// Exports written by older versions are migrated first. Nothing is
    /// written unless the whole input decodes.
    ///
    /// # Errors
    ///
    /// Fails when the input is malformed, too new, or cannot be migrated.
    pub fn import(&self, _lock: &ExecutionLock, input: &[u8]) -> Result<usize, SnapshotError> {
        let document: ExportDocument<Value> =
            serde_json::from_slice(input).map_err(SnapshotError::Input)?;
        if document.version > STATE_VERSION {
            return Err(VersionError::TooNew {
                found: document.version,
                supported: STATE_VERSION,
            }
            .into());
        }
        let mut payload = serde_json::Map::new();
        payload.insert("pins".to_owned(), document.pins);
        let payload = migrate(document.version, Value::Object(payload))?;
        let state: MapState = serde_json::from_value(payload).map_err(SnapshotError::Input)?;
        let seq = self.persist(&state)?;
        info!(
            target: SNAPSHOT_TARGET,
            pins = state.len(),
            from_version = document.version,
            seq,
            "state imported"
        );
        Ok(state.len())
    }

    /// Rewrites the newest snapshot in the current format.
    ///
    /// # Errors
    ///
    /// Fails with [`SnapshotError::Absent`] when there is no snapshot and
    /// with [`VersionError::TooNew`] when it was written by a newer build.
    pub fn upgrade(&self, _lock: &ExecutionLock) -> Result<UpgradeOutcome, SnapshotError> {
        let snapshot = self.store.latest()?.ok_or_else(|| self.absent())?;
        let from = snapshot.envelope.version;
        if from > STATE_VERSION {
            return Err(VersionError::TooNew {
                found: from,
                supported: STATE_VERSION,
            }
            .into());
        }
        if from == STATE_VERSION {
            info!(target: SNAPSHOT_TARGET, version = from, "state already up to date");
            return Ok(UpgradeOutcome::AlreadyCurrent);
        }
        let payload = migrate(from, snapshot.envelope.payload)?;
        let state: MapState =
            serde_json::from_value(payload.clone()).map_err(SnapshotError::Payload)?;
        self.store.overwrite(
            snapshot.seq,
            &SnapshotEnvelope {
                version: STATE_VERSION,
                payload,
            },
        )?;
        info!(
            target: SNAPSHOT_TARGET,
            from,
            to = STATE_VERSION,
            pins = state.len(),
            "state upgraded"
        );
        Ok(UpgradeOutcome::Upgraded { from })
    }

    /// Moves the data directory aside so the next start begins empty.
    ///
    /// # Errors
    ///
    /// Fails when a generation cannot be removed or renamed.
    pub fn cleanup(&self, _lock: &ExecutionLock) -> Result<RotationOutcome, SnapshotError> {
        rotate(&self.data_dir, self.rotation_depth)
    }

    fn absent(&self) -> SnapshotError {
        SnapshotError::Absent {
            dir: self.store.dir().to_path_buf(),
        }
    }
}
