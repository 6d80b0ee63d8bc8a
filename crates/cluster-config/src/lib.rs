//! Configuration for a cluster peer.
//!
//! Every component of the peer owns a typed configuration object. The
//! [`ConfigRegistry`] keeps those objects in registration order and moves them
//! to and from the single `service.json` file that lives in the configuration
//! directory. Loading is all-or-nothing: a document that fails to parse, or
//! any section that violates its constraints, leaves every registered entry
//! untouched.
//!
//! The crate also holds the value types shared by the service binary: the
//! cluster secret, multiaddress strings, logging selectors, and the default
//! locations of the configuration and data directories.

mod components;
mod defaults;
mod logging;
mod multiaddr;
mod registry;
mod secret;

pub use components::{
    ClusterConfig, DiskInformerConfig, DiskMetric, IpfsHttpConfig, MapTrackerConfig,
    MonitorConfig, NumpinInformerConfig, RaftConfig, RestApiConfig, SharderConfig,
};
pub use defaults::{
    CLUSTER_SECRET_ENV, CONFIG_PATH_ENV, DEFAULT_ALLOCATION_STRATEGY, DEFAULT_CONFIG_DIR_NAME,
    DEFAULT_CONFIG_FILE, DEFAULT_DATA_SUBFOLDER, DEFAULT_LOG_LEVEL, DEFAULT_ROTATION_DEPTH,
    default_config_dir,
};
pub use logging::{LogFormat, LogLevel, LogSelectorParseError};
pub use multiaddr::{Multiaddr, MultiaddrParseError};
pub use registry::{ComponentConfig, ComponentKey, ConfigError, ConfigRegistry, ConstraintError, Section};
pub use secret::{ClusterSecret, SecretError};
