use serde::{Deserialize, Serialize};

use crate::multiaddr::Multiaddr;
use crate::registry::{ComponentConfig, ComponentKey, ConstraintError, Section};

use super::require_positive;

fn address(text: &str) -> Result<Multiaddr, ConstraintError> {
    text.parse()
        .map_err(|error| ConstraintError::new(format!("default address '{text}': {error}")))
}

/// HTTP API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestApiConfig {
    /// Address the API listens on.
    pub http_listen_multiaddress: Multiaddr,
    /// Request read timeout.
    pub read_timeout_secs: u64,
    /// Response write timeout.
    pub write_timeout_secs: u64,
}

impl ComponentConfig for RestApiConfig {
    const KEY: ComponentKey = ComponentKey::new(Section::Api, "restapi");

    fn default_config() -> Result<Self, ConstraintError> {
        Ok(Self {
            http_listen_multiaddress: address("/ip4/127.0.0.1/tcp/9094")?,
            read_timeout_secs: 30,
            write_timeout_secs: 60,
        })
    }

    fn validate(&self) -> Result<(), ConstraintError> {
        require_positive("read_timeout_secs", self.read_timeout_secs)?;
        require_positive("write_timeout_secs", self.write_timeout_secs)
    }
}

/// Settings of the connector to the IPFS daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpfsHttpConfig {
    /// IPFS daemon API address.
    pub node_multiaddress: Multiaddr,
    /// Address of the IPFS proxy endpoint.
    pub proxy_listen_multiaddress: Multiaddr,
    /// Delay before asking IPFS to connect to the other peers' daemons.
    pub connect_swarms_delay_secs: u64,
}

impl ComponentConfig for IpfsHttpConfig {
    const KEY: ComponentKey = ComponentKey::new(Section::IpfsConnector, "ipfshttp");

    fn default_config() -> Result<Self, ConstraintError> {
        Ok(Self {
            node_multiaddress: address("/ip4/127.0.0.1/tcp/5001")?,
            proxy_listen_multiaddress: address("/ip4/127.0.0.1/tcp/9095")?,
            connect_swarms_delay_secs: 7,
        })
    }
}

/// Pin tracker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapTrackerConfig {
    /// Maximum number of queued pin operations.
    pub max_pin_queue_size: u64,
    /// Number of pin operations run at once.
    pub concurrent_pins: u64,
}

impl ComponentConfig for MapTrackerConfig {
    const KEY: ComponentKey = ComponentKey::new(Section::PinTracker, "maptracker");

    fn default_config() -> Result<Self, ConstraintError> {
        Ok(Self {
            max_pin_queue_size: 50_000,
            concurrent_pins: 10,
        })
    }

    fn validate(&self) -> Result<(), ConstraintError> {
        require_positive("max_pin_queue_size", self.max_pin_queue_size)?;
        require_positive("concurrent_pins", self.concurrent_pins)
    }
}

/// Peer monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Interval between metric expiry checks.
    pub check_interval_secs: u64,
}

impl ComponentConfig for MonitorConfig {
    const KEY: ComponentKey = ComponentKey::new(Section::Monitor, "monbasic");

    fn default_config() -> Result<Self, ConstraintError> {
        Ok(Self {
            check_interval_secs: 15,
        })
    }

    fn validate(&self) -> Result<(), ConstraintError> {
        require_positive("check_interval_secs", self.check_interval_secs)
    }
}

/// Sharder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharderConfig {
    /// Target size in bytes of each shard.
    pub alloc_size: u64,
}

impl ComponentConfig for SharderConfig {
    const KEY: ComponentKey = ComponentKey::new(Section::Sharder, "sharder");

    fn default_config() -> Result<Self, ConstraintError> {
        Ok(Self {
            alloc_size: 5_000_000,
        })
    }

    fn validate(&self) -> Result<(), ConstraintError> {
        require_positive("alloc_size", self.alloc_size)
    }
}
