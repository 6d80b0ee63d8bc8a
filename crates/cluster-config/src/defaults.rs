use std::env;
use std::path::PathBuf;

/// Name of the configuration file inside the configuration directory.
pub const DEFAULT_CONFIG_FILE: &str = "service.json";

/// Directory created under the user's home when no path is given.
pub const DEFAULT_CONFIG_DIR_NAME: &str = ".ipfs-cluster";

/// Environment variable overriding the configuration directory.
pub const CONFIG_PATH_ENV: &str = "IPFS_CLUSTER_PATH";

/// Environment variable supplying the cluster secret to `init`.
pub const CLUSTER_SECRET_ENV: &str = "CLUSTER_SECRET";

/// Subfolder of the configuration directory holding consensus data.
pub const DEFAULT_DATA_SUBFOLDER: &str = "raft";

/// Number of superseded data directories kept by cleanup.
pub const DEFAULT_ROTATION_DEPTH: usize = 5;

/// Log level used when none is requested.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Allocation strategy used when none is requested.
pub const DEFAULT_ALLOCATION_STRATEGY: &str = "disk-freespace";

/// Computes `$HOME/.ipfs-cluster`.
///
/// `HOME` is consulted first so sandboxed packaging that rewrites it keeps
/// working; otherwise the platform home directory is used. When neither is
/// known the directory is placed under the current working directory.
#[must_use]
pub fn default_config_dir() -> PathBuf {
    let home = env::var_os("HOME")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(DEFAULT_CONFIG_DIR_NAME)
}
