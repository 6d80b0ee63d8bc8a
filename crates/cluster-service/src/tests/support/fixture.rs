//! Configuration directory fixture.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;

use cluster_config::{ComponentConfig, ConfigRegistry, DEFAULT_CONFIG_FILE, RaftConfig};

use crate::context::ProcessContext;
use crate::snapshot::{SnapshotEnvelope, SnapshotManager};

/// Temporary configuration directory holding a default `service.json`.
#[derive(Debug)]
pub struct ConfigFixture {
    dir: TempDir,
}

impl ConfigFixture {
    /// Writes default configuration into a fresh directory.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temporary config dir");
        let mut registry = ConfigRegistry::standard();
        registry.populate_defaults().expect("populate defaults");
        registry
            .save(&dir.path().join(DEFAULT_CONFIG_FILE), false)
            .expect("save configuration");
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir().join(DEFAULT_CONFIG_FILE)
    }

    /// Registry loaded from the fixture's file.
    pub fn registry(&self) -> ConfigRegistry {
        let mut registry = ConfigRegistry::standard();
        registry
            .load(&self.config_path())
            .expect("load configuration");
        registry
    }

    /// Rewrites one section of the saved configuration.
    pub fn update<T: ComponentConfig>(&self, edit: impl FnOnce(&mut T)) {
        let mut registry = self.registry();
        edit(registry.get_mut::<T>().expect("registered section"));
        registry
            .save(&self.config_path(), true)
            .expect("save configuration");
    }

    /// Snapshot manager over the fixture's data folder.
    pub fn snapshots(&self) -> SnapshotManager {
        let registry = self.registry();
        SnapshotManager::new(registry.get::<RaftConfig>().expect("raft section"))
    }

    /// Stores a raw snapshot written at `version`.
    pub fn write_snapshot(&self, version: u32, payload: Value) -> u64 {
        self.snapshots()
            .store()
            .append(&SnapshotEnvelope { version, payload })
            .expect("append snapshot")
    }

    /// Process context pointing at the fixture.
    pub fn context(&self, allocation: &str) -> ProcessContext {
        ProcessContext::new(self.dir().to_path_buf(), allocation)
    }
}

impl Default for ConfigFixture {
    fn default() -> Self {
        Self::new()
    }
}
