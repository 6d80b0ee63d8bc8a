//! Sequence-numbered snapshot files inside the consensus data directory.
//!
//! Snapshots live under `<data dir>/snapshots/<seq>.json`. Each file holds an
//! envelope with the format version and the raw payload, so older snapshots
//! can be read back before their payload is understood.

use std::fs::{self, DirBuilder};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::Builder;
use tracing::debug;

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

use super::{SNAPSHOT_TARGET, SnapshotError};

const SNAPSHOT_DIR: &str = "snapshots";
const SNAPSHOT_EXTENSION: &str = "json";

/// On-disk framing of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    /// Format version of `payload`.
    pub version: u32,
    /// Versioned state body.
    pub payload: Value,
}

/// A snapshot read back from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    /// Sequence number taken from the file name.
    pub seq: u64,
    /// File location.
    pub path: PathBuf,
    /// Decoded envelope.
    pub envelope: SnapshotEnvelope,
}

/// Snapshot directory of one data directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    retain: usize,
}

impl SnapshotStore {
    /// Store for `data_dir`, keeping the newest `retain` snapshots on write.
    #[must_use]
    pub fn new(data_dir: &Path, retain: usize) -> Self {
        Self {
            dir: data_dir.join(SNAPSHOT_DIR),
            retain: retain.max(1),
        }
    }

    /// Directory holding the snapshot files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Newest snapshot, or `None` when the directory holds none.
    ///
    /// # Errors
    ///
    /// Fails when the directory or the newest file cannot be read or decoded.
    pub fn latest(&self) -> Result<Option<StoredSnapshot>, SnapshotError> {
        let Some((seq, path)) = self.sequence()?.pop() else {
            return Ok(None);
        };
        let bytes = fs::read(&path).map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })?;
        let envelope =
            serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Decode {
                path: path.clone(),
                source,
            })?;
        Ok(Some(StoredSnapshot {
            seq,
            path,
            envelope,
        }))
    }

    /// Writes a new snapshot after the newest one and prunes old files.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be listed or the file cannot be
    /// written.
    pub fn append(&self, envelope: &SnapshotEnvelope) -> Result<u64, SnapshotError> {
        let next = self
            .sequence()?
            .last()
            .map_or(1, |(seq, _)| seq.saturating_add(1));
        self.write(next, envelope)?;
        self.prune()?;
        Ok(next)
    }

    /// Replaces the contents of snapshot `seq` atomically.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be written.
    pub fn overwrite(&self, seq: u64, envelope: &SnapshotEnvelope) -> Result<(), SnapshotError> {
        self.write(seq, envelope)
    }

    fn path_for(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("{seq:020}.{SNAPSHOT_EXTENSION}"))
    }

    fn write(&self, seq: u64, envelope: &SnapshotEnvelope) -> Result<(), SnapshotError> {
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);
        builder.create(&self.dir).map_err(|source| SnapshotError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(seq);
        let mut bytes = serde_json::to_vec(envelope).map_err(SnapshotError::Encode)?;
        bytes.push(b'\n');
        write_atomically(&self.dir, &path, &bytes).map_err(|source| SnapshotError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(
            target: SNAPSHOT_TARGET,
            seq,
            version = envelope.version,
            file = %path.display(),
            "snapshot written"
        );
        Ok(())
    }

    fn prune(&self) -> Result<(), SnapshotError> {
        let sequence = self.sequence()?;
        let excess = sequence.len().saturating_sub(self.retain);
        for (seq, path) in sequence.into_iter().take(excess) {
            match fs::remove_file(&path) {
                Ok(()) => debug!(target: SNAPSHOT_TARGET, seq, "pruned old snapshot"),
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(SnapshotError::Io { path, source }),
            }
        }
        Ok(())
    }

    /// Snapshot files sorted by ascending sequence number.
    fn sequence(&self) -> Result<Vec<(u64, PathBuf)>, SnapshotError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SnapshotError::Io {
                    path: self.dir.clone(),
                    source,
                });
            }
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SnapshotError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            let Some(seq) = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .and_then(|stem| stem.parse::<u64>().ok())
            else {
                continue;
            };
            files.push((seq, path));
        }
        files.sort_by_key(|(seq, _)| *seq);
        Ok(files)
    }
}

/// Writes `bytes` to `path` through a temporary file in `dir`.
fn write_atomically(dir: &Path, path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut temp = Builder::new().prefix(".snapshot").tempfile_in(dir)?;
    #[cfg(unix)]
    temp.as_file()
        .set_permissions(fs::Permissions::from_mode(0o600))?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|error| error.error)?;
    Ok(())
}
