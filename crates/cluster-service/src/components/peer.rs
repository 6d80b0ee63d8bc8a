use tracing::info;

use cluster_config::{ClusterConfig, IpfsHttpConfig, Multiaddr, RestApiConfig};

use super::{COMPONENT_TARGET, Component, ComponentError, Lifecycle};

/// Network host of the peer.
#[derive(Debug)]
pub struct ClusterHost {
    peer_id: String,
    listen: Multiaddr,
    bootstrap: Vec<Multiaddr>,
    lifecycle: Lifecycle,
}

impl ClusterHost {
    const NAME: &'static str = "host";

    /// Opens the host described by `config`.
    ///
    /// # Errors
    ///
    /// Fails when a bootstrap address names this peer itself.
    pub fn new(config: &ClusterConfig) -> Result<Self, ComponentError> {
        if let Some(address) = config
            .bootstrap
            .iter()
            .find(|address| address.peer_id() == Some(config.id.as_str()))
        {
            return Err(ComponentError::new(
                Self::NAME,
                format!("bootstrap address {address} points at this peer"),
            ));
        }
        info!(
            target: COMPONENT_TARGET,
            peer = %config.id,
            listen = %config.listen_multiaddress,
            peers = config.peers.len(),
            "host listening"
        );
        Ok(Self {
            peer_id: config.id.clone(),
            listen: config.listen_multiaddress.clone(),
            bootstrap: config.bootstrap.clone(),
            lifecycle: Lifecycle::new(Self::NAME),
        })
    }

    /// Identity announced to other peers.
    #[must_use]
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Address the host listens on.
    #[must_use]
    pub fn listen_address(&self) -> &Multiaddr {
        &self.listen
    }

    /// Peers contacted when joining.
    #[must_use]
    pub fn bootstrap(&self) -> &[Multiaddr] {
        &self.bootstrap
    }

    /// Whether the host is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.lifecycle.is_closed()
    }
}

impl Component for ClusterHost {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn shutdown(&self) -> Result<(), ComponentError> {
        self.lifecycle.close();
        Ok(())
    }
}

/// Public HTTP API of the peer.
#[derive(Debug)]
pub struct RestApi {
    listen: Multiaddr,
    lifecycle: Lifecycle,
}

impl RestApi {
    const NAME: &'static str = "restapi";

    /// Binds the API to an open host.
    ///
    /// # Errors
    ///
    /// Fails when `host` has already been closed.
    pub fn new(config: &RestApiConfig, host: &ClusterHost) -> Result<Self, ComponentError> {
        if !host.is_open() {
            return Err(ComponentError::new(Self::NAME, "host is closed"));
        }
        info!(
            target: COMPONENT_TARGET,
            listen = %config.http_listen_multiaddress,
            peer = %host.peer_id(),
            "REST API listening"
        );
        Ok(Self {
            listen: config.http_listen_multiaddress.clone(),
            lifecycle: Lifecycle::new(Self::NAME),
        })
    }

    /// Address the API listens on.
    #[must_use]
    pub fn listen_address(&self) -> &Multiaddr {
        &self.listen
    }
}

impl Component for RestApi {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn shutdown(&self) -> Result<(), ComponentError> {
        self.lifecycle.close();
        Ok(())
    }
}

/// Connector to the local IPFS daemon.
#[derive(Debug)]
pub struct IpfsConnector {
    node: Multiaddr,
    proxy: Multiaddr,
    lifecycle: Lifecycle,
}

impl IpfsConnector {
    const NAME: &'static str = "ipfshttp";

    /// Prepares the connector.
    ///
    /// # Errors
    ///
    /// Fails when the proxy would listen on the daemon's own address.
    pub fn new(config: &IpfsHttpConfig) -> Result<Self, ComponentError> {
        if config.node_multiaddress == config.proxy_listen_multiaddress {
            return Err(ComponentError::new(
                Self::NAME,
                format!(
                    "proxy address {} collides with the IPFS daemon address",
                    config.proxy_listen_multiaddress
                ),
            ));
        }
        info!(
            target: COMPONENT_TARGET,
            node = %config.node_multiaddress,
            proxy = %config.proxy_listen_multiaddress,
            "IPFS connector ready"
        );
        Ok(Self {
            node: config.node_multiaddress.clone(),
            proxy: config.proxy_listen_multiaddress.clone(),
            lifecycle: Lifecycle::new(Self::NAME),
        })
    }

    /// IPFS daemon API address.
    #[must_use]
    pub fn node_address(&self) -> &Multiaddr {
        &self.node
    }

    /// Proxy endpoint address.
    #[must_use]
    pub fn proxy_address(&self) -> &Multiaddr {
        &self.proxy
    }
}

impl Component for IpfsConnector {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn shutdown(&self) -> Result<(), ComponentError> {
        self.lifecycle.close();
        Ok(())
    }
}
