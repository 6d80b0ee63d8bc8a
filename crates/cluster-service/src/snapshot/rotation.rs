//! Rotation of superseded consensus data directories.
//!
//! `state cleanup` never deletes the live data directory. It moves it aside
//! to `<data dir>.old.0`, shifting older generations up by one and dropping
//! the generation that falls off the end.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{SNAPSHOT_TARGET, SnapshotError};

/// What a rotation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// The data directory did not exist.
    NothingToRotate,
    /// The data directory now lives at `moved_to`.
    Rotated {
        /// New location of the former data directory.
        moved_to: PathBuf,
    },
}

/// Path of generation `index` of `data_dir`.
#[must_use]
pub fn generation_path(data_dir: &Path, index: usize) -> PathBuf {
    let mut name = OsString::from(data_dir.as_os_str());
    name.push(format!(".old.{index}"));
    PathBuf::from(name)
}

/// Moves `data_dir` to generation 0, keeping at most `depth` generations.
///
/// # Errors
///
/// Fails when any removal or rename fails.
pub fn rotate(data_dir: &Path, depth: usize) -> Result<RotationOutcome, SnapshotError> {
    if !data_dir.exists() {
        info!(
            target: SNAPSHOT_TARGET,
            dir = %data_dir.display(),
            "data directory absent; nothing to clean up"
        );
        return Ok(RotationOutcome::NothingToRotate);
    }
    let depth = depth.max(1);

    let oldest = generation_path(data_dir, depth - 1);
    remove_dir(&oldest)?;
    for index in (0..depth - 1).rev() {
        let from = generation_path(data_dir, index);
        if from.exists() {
            let to = generation_path(data_dir, index + 1);
            rename(&from, &to)?;
        }
    }
    let moved_to = generation_path(data_dir, 0);
    rename(data_dir, &moved_to)?;
    info!(
        target: SNAPSHOT_TARGET,
        from = %data_dir.display(),
        to = %moved_to.display(),
        "data directory rotated"
    );
    Ok(RotationOutcome::Rotated { moved_to })
}

fn remove_dir(path: &Path) -> Result<(), SnapshotError> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(target: SNAPSHOT_TARGET, dir = %path.display(), "dropped oldest generation");
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn rename(from: &Path, to: &Path) -> Result<(), SnapshotError> {
    fs::rename(from, to).map_err(|source| SnapshotError::Io {
        path: from.to_path_buf(),
        source,
    })
}
