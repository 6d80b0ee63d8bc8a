//! Configuration types for each peer component.

mod cluster;
mod consensus;
mod informers;
mod services;

pub use cluster::ClusterConfig;
pub use consensus::RaftConfig;
pub use informers::{DiskInformerConfig, DiskMetric, NumpinInformerConfig};
pub use services::{
    IpfsHttpConfig, MapTrackerConfig, MonitorConfig, RestApiConfig, SharderConfig,
};

use crate::registry::ConstraintError;

pub(crate) fn require_positive(field: &str, value: u64) -> Result<(), ConstraintError> {
    if value == 0 {
        return Err(ConstraintError::new(format!(
            "{field} must be greater than zero"
        )));
    }
    Ok(())
}
