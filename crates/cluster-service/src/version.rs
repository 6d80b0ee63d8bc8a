//! Compatibility check between persisted state and this build.

use thiserror::Error;
use tracing::{debug, info};

use cluster_config::{ClusterConfig, RaftConfig};

use crate::snapshot::{SnapshotError, SnapshotStore};
use crate::state::STATE_VERSION;

const VERSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::version");

/// Mismatch between a persisted state version and [`STATE_VERSION`].
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum VersionError {
    /// Written by a newer build.
    #[error(
        "state version {found} is newer than the {supported} supported by this build; \
         upgrade ipfs-cluster-service"
    )]
    TooNew {
        /// Version found on disk.
        found: u32,
        /// Version this build writes.
        supported: u32,
    },
    /// Written by an older build and not yet upgraded.
    #[error(
        "state version {found} is older than the current version {current}; run \
         'ipfs-cluster-service state upgrade' or start the daemon with --upgrade"
    )]
    TooOld {
        /// Version found on disk.
        found: u32,
        /// Version this build writes.
        current: u32,
    },
}

/// Compares `found` with the current state version.
///
/// # Errors
///
/// Returns the direction of the mismatch.
pub const fn check(found: u32) -> Result<(), VersionError> {
    if found > STATE_VERSION {
        Err(VersionError::TooNew {
            found,
            supported: STATE_VERSION,
        })
    } else if found < STATE_VERSION {
        Err(VersionError::TooOld {
            found,
            current: STATE_VERSION,
        })
    } else {
        Ok(())
    }
}

/// Checks the newest snapshot of the peer against this build.
///
/// A data directory without snapshots is a fresh peer and passes. Returns the
/// version found, if any.
///
/// # Errors
///
/// Fails when the snapshot cannot be read or its version does not match.
pub fn validate(cluster: &ClusterConfig, raft: &RaftConfig) -> Result<Option<u32>, SnapshotError> {
    let store = SnapshotStore::new(&raft.data_dir(), raft.snapshot_retain);
    let Some(snapshot) = store.latest()? else {
        debug!(
            target: VERSION_TARGET,
            peer = %cluster.id,
            dir = %store.dir().display(),
            "no snapshot present; starting with fresh state"
        );
        return Ok(None);
    };
    let found = snapshot.envelope.version;
    check(found)?;
    info!(
        target: VERSION_TARGET,
        peer = %cluster.id,
        version = found,
        "persisted state version is current"
    );
    Ok(Some(found))
}
