use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::registry::{ComponentConfig, ComponentKey, ConstraintError, Section};

use super::require_positive;

const DEFAULT_METRIC_TTL_SECS: u64 = 30;

/// Quantity reported by the disk informer.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DiskMetric {
    /// Bytes still available on the volume.
    #[default]
    Freespace,
    /// Bytes already used on the volume.
    Reposize,
}

/// Disk informer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskInformerConfig {
    /// Lifetime of each reported metric.
    pub metric_ttl_secs: u64,
    /// Quantity to report.
    #[serde(default)]
    pub metric_type: DiskMetric,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl DiskInformerConfig {
    /// Directory whose volume is measured.
    #[must_use]
    pub fn measured_path(&self) -> &Path {
        if self.base_dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            self.base_dir.as_path()
        }
    }
}

impl ComponentConfig for DiskInformerConfig {
    const KEY: ComponentKey = ComponentKey::new(Section::Informer, "disk");

    fn default_config() -> Result<Self, ConstraintError> {
        Ok(Self {
            metric_ttl_secs: DEFAULT_METRIC_TTL_SECS,
            metric_type: DiskMetric::default(),
            base_dir: PathBuf::new(),
        })
    }

    fn validate(&self) -> Result<(), ConstraintError> {
        require_positive("metric_ttl_secs", self.metric_ttl_secs)
    }

    fn set_base_dir(&mut self, dir: &Path) {
        self.base_dir = dir.to_path_buf();
    }
}

/// Pin-count informer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumpinInformerConfig {
    /// Lifetime of each reported metric.
    pub metric_ttl_secs: u64,
}

impl ComponentConfig for NumpinInformerConfig {
    const KEY: ComponentKey = ComponentKey::new(Section::Informer, "numpin");

    fn default_config() -> Result<Self, ConstraintError> {
        Ok(Self {
            metric_ttl_secs: DEFAULT_METRIC_TTL_SECS,
        })
    }

    fn validate(&self) -> Result<(), ConstraintError> {
        require_positive("metric_ttl_secs", self.metric_ttl_secs)
    }
}
