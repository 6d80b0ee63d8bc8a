use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::defaults::{DEFAULT_DATA_SUBFOLDER, DEFAULT_ROTATION_DEPTH};
use crate::registry::{ComponentConfig, ComponentKey, ConstraintError, Section};

use super::require_positive;

const DEFAULT_WAIT_FOR_LEADER_SECS: u64 = 15;
const DEFAULT_SNAPSHOT_RETAIN: usize = 2;

/// Settings of the consensus layer and its on-disk data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaftConfig {
    /// Data folder; relative paths resolve against the configuration
    /// directory. Defaults to `<config dir>/raft`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_folder: Option<PathBuf>,
    /// How long to wait for a leader before giving up.
    pub wait_for_leader_timeout_secs: u64,
    /// Number of snapshots kept in the data folder.
    pub snapshot_retain: usize,
    /// Number of superseded data folders kept by `state cleanup`.
    #[serde(default = "default_rotation_depth")]
    pub rotation_depth: usize,
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_rotation_depth() -> usize {
    DEFAULT_ROTATION_DEPTH
}

impl RaftConfig {
    /// Directory the configuration was loaded from.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        self.base_dir.as_path()
    }

    /// Resolved consensus data directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_folder {
            Some(folder) if folder.is_absolute() => folder.clone(),
            Some(folder) => self.base_dir.join(folder),
            None => self.base_dir.join(DEFAULT_DATA_SUBFOLDER),
        }
    }
}

impl ComponentConfig for RaftConfig {
    const KEY: ComponentKey = ComponentKey::new(Section::Consensus, "raft");

    fn default_config() -> Result<Self, ConstraintError> {
        Ok(Self {
            data_folder: None,
            wait_for_leader_timeout_secs: DEFAULT_WAIT_FOR_LEADER_SECS,
            snapshot_retain: DEFAULT_SNAPSHOT_RETAIN,
            rotation_depth: DEFAULT_ROTATION_DEPTH,
            base_dir: PathBuf::new(),
        })
    }

    fn validate(&self) -> Result<(), ConstraintError> {
        require_positive(
            "wait_for_leader_timeout_secs",
            self.wait_for_leader_timeout_secs,
        )?;
        require_positive("snapshot_retain", self.snapshot_retain as u64)?;
        require_positive("rotation_depth", self.rotation_depth as u64)
    }

    fn set_base_dir(&mut self, dir: &Path) {
        self.base_dir = dir.to_path_buf();
    }
}
