//! Command-line interface definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cluster_config::{
    CONFIG_PATH_ENV, DEFAULT_ALLOCATION_STRATEGY, DEFAULT_LOG_LEVEL, LogFormat, LogLevel,
};

/// IPFS Cluster peer.
#[derive(Parser, Debug)]
#[command(
    name = "ipfs-cluster-service",
    version,
    about = "IPFS Cluster node",
    long_about = "Runs and manages an IPFS Cluster peer. Without a subcommand the peer \
                  daemon is started."
)]
pub(crate) struct Cli {
    /// Path to the configuration and data folder.
    #[arg(short = 'c', long = "config", env = CONFIG_PATH_ENV, value_name = "FOLDER")]
    pub(crate) config: Option<PathBuf>,
    /// Forcefully proceed with some actions, such as overwriting configuration.
    #[arg(short = 'f', long)]
    pub(crate) force: bool,
    /// Join a cluster through an existing peer's multiaddress. Overrides the
    /// configured bootstrap peers.
    #[arg(short = 'j', long, value_name = "MULTIADDRESS")]
    pub(crate) bootstrap: Option<String>,
    /// Remove this peer from the cluster on exit.
    #[arg(short = 'x', long, hide = true)]
    pub(crate) leave: bool,
    /// Enable full debug logging (very verbose).
    #[arg(short = 'd', long)]
    pub(crate) debug: bool,
    /// Log level for cluster components [critical, error, warning, info, debug].
    #[arg(short = 'l', long, default_value = DEFAULT_LOG_LEVEL, value_name = "LEVEL")]
    pub(crate) loglevel: LogLevel,
    /// Log output format [compact, json].
    #[arg(long, default_value_t = LogFormat::Compact, value_name = "FORMAT")]
    pub(crate) log_format: LogFormat,
    /// Allocation strategy [disk-freespace, disk-reposize, numpin, pincount].
    #[arg(short = 'a', long, default_value = DEFAULT_ALLOCATION_STRATEGY, value_name = "STRATEGY")]
    pub(crate) alloc: String,
    /// Subcommand to run; `daemon` when omitted.
    #[command(subcommand)]
    pub(crate) command: Option<Command>,
    /// Words that are not subcommands.
    #[arg(hide = true, value_name = "ARGS")]
    pub(crate) stray: Vec<String>,
}

/// Subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// Create a default configuration and exit.
    Init {
        /// Prompt for the cluster secret.
        #[arg(short = 's', long)]
        custom_secret: bool,
        /// Overwrite an existing configuration.
        #[arg(short = 'f', long)]
        force: bool,
    },
    /// Run the IPFS Cluster peer (default).
    Daemon {
        /// Run necessary state migrations before starting.
        #[arg(short = 'u', long)]
        upgrade: bool,
    },
    /// Manage the persisted cluster state.
    State {
        /// State operation.
        #[command(subcommand)]
        action: StateCommand,
    },
    /// Print the ipfs-cluster-service version.
    Version,
}

/// `state` subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum StateCommand {
    /// Display the shared state format version.
    Version,
    /// Upgrade the persisted state to the current version.
    Upgrade,
    /// Save the state as JSON, to stdout by default.
    Export {
        /// Output file for the exported state.
        #[arg(short = 'f', long, value_name = "PATH")]
        file: Option<PathBuf>,
    },
    /// Replace the state with an exported one, read from stdin by default.
    Import {
        /// Exported state file.
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },
    /// Move the persisted state aside so the peer starts afresh.
    Cleanup,
}
