use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::multiaddr::Multiaddr;
use crate::registry::{ComponentConfig, ComponentKey, ConstraintError, Section};
use crate::secret::ClusterSecret;

use super::require_positive;

const DEFAULT_LISTEN: &str = "/ip4/0.0.0.0/tcp/9096";
const DEFAULT_MONITOR_PING_INTERVAL_SECS: u64 = 15;
const PRIVATE_KEY_LEN: usize = 32;
const PEER_ID_LEN: usize = 20;

/// Identity and membership settings of the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Peer identifier announced to the rest of the cluster.
    pub id: String,
    /// Hex-encoded private key of the network host.
    pub private_key: String,
    /// Secret shared by every cluster member.
    pub secret: ClusterSecret,
    /// Known cluster members.
    #[serde(default)]
    pub peers: Vec<Multiaddr>,
    /// Peers contacted to join an existing cluster.
    #[serde(default)]
    pub bootstrap: Vec<Multiaddr>,
    /// Leave the peer set on shutdown.
    #[serde(default)]
    pub leave_on_shutdown: bool,
    /// Address the network host listens on.
    pub listen_multiaddress: Multiaddr,
    /// Minimum number of allocations per pin; `-1` pins everywhere.
    pub replication_factor_min: i32,
    /// Maximum number of allocations per pin; `-1` pins everywhere.
    pub replication_factor_max: i32,
    /// Interval between liveness pings sent to the monitor.
    pub monitor_ping_interval_secs: u64,
}

impl ComponentConfig for ClusterConfig {
    const KEY: ComponentKey = ComponentKey::new(Section::Cluster, "cluster");

    fn default_config() -> Result<Self, ConstraintError> {
        let listen_multiaddress = DEFAULT_LISTEN
            .parse()
            .map_err(|error| ConstraintError::new(format!("default listen address: {error}")))?;
        Ok(Self {
            id: random_hex(PEER_ID_LEN),
            private_key: random_hex(PRIVATE_KEY_LEN),
            secret: ClusterSecret::generate(),
            peers: Vec::new(),
            bootstrap: Vec::new(),
            leave_on_shutdown: false,
            listen_multiaddress,
            replication_factor_min: -1,
            replication_factor_max: -1,
            monitor_ping_interval_secs: DEFAULT_MONITOR_PING_INTERVAL_SECS,
        })
    }

    fn validate(&self) -> Result<(), ConstraintError> {
        if self.id.trim().is_empty() {
            return Err(ConstraintError::new("id must not be empty"));
        }
        let key = hex::decode(&self.private_key)
            .map_err(|error| ConstraintError::new(format!("private_key is not hex: {error}")))?;
        if key.len() != PRIVATE_KEY_LEN {
            return Err(ConstraintError::new(format!(
                "private_key must be {PRIVATE_KEY_LEN} bytes"
            )));
        }
        validate_replication(self.replication_factor_min, self.replication_factor_max)?;
        require_positive("monitor_ping_interval_secs", self.monitor_ping_interval_secs)
    }
}

fn validate_replication(min: i32, max: i32) -> Result<(), ConstraintError> {
    match (min, max) {
        (-1, -1) => Ok(()),
        (-1, _) | (_, -1) => Err(ConstraintError::new(
            "replication_factor_min and replication_factor_max must both be -1 when either is",
        )),
        (min, max) if min <= 0 || max <= 0 => Err(ConstraintError::new(
            "replication factors must be positive or -1",
        )),
        (min, max) if min > max => Err(ConstraintError::new(
            "replication_factor_min must not exceed replication_factor_max",
        )),
        _ => Ok(()),
    }
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0_u8; len];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
