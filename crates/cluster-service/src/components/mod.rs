//! Components a peer is assembled from.
//!
//! Each component is built from its own configuration section and can be
//! closed on its own, so a partially assembled peer can be torn down in
//! reverse construction order. Construction goes through the
//! [`ComponentFactory`] seam; [`LocalComponentFactory`] builds the in-process
//! implementations.

mod peer;
mod tracking;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use thiserror::Error;
use tracing::debug;

use cluster_config::{
    ClusterConfig, DiskInformerConfig, IpfsHttpConfig, MapTrackerConfig, MonitorConfig,
    NumpinInformerConfig, RestApiConfig, SharderConfig,
};

use crate::state::MapState;
use crate::strategy::{self, StrategyError, StrategyPair};

pub use peer::{ClusterHost, IpfsConnector, RestApi};
pub use tracking::{BasicMonitor, MapPinTracker, Sharder, TrackStatus};

pub(crate) const COMPONENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::component");

/// A running part of the peer that can be closed independently.
pub trait Component: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Releases the component. Closing twice is a no-op.
    fn shutdown(&self) -> Result<(), ComponentError>;
}

impl fmt::Debug for dyn Component {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// Failure reported by a component while starting or stopping.
#[derive(Debug, Error)]
#[error("{component}: {message}")]
pub struct ComponentError {
    /// Component that failed.
    pub component: &'static str,
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl ComponentError {
    /// Builds an error without an underlying source.
    #[must_use]
    pub fn new(component: &'static str, message: impl Into<String>) -> Self {
        Self {
            component,
            message: message.into(),
            source: None,
        }
    }

    /// Builds an error wrapping an underlying source.
    #[must_use]
    pub fn with_source(
        component: &'static str,
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self {
            component,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Human-readable description of the failure.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Shared count of pins held locally, published by the tracker.
#[derive(Debug, Clone, Default)]
pub struct PinCounter(Arc<AtomicU64>);

impl PinCounter {
    /// Current count.
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn set(&self, value: u64) {
        self.0.store(value, Ordering::Release);
    }
}

/// Open/closed flag shared by component implementations.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    name: &'static str,
    closed: AtomicBool,
}

impl Lifecycle {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self {
            name,
            closed: AtomicBool::new(false),
        }
    }

    /// Marks the component closed, returning `false` if it already was.
    pub(crate) fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            debug!(target: COMPONENT_TARGET, component = self.name, "component closed");
        }
        first
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Builds the components of a peer.
pub trait ComponentFactory {
    /// Network host carrying the peer identity.
    fn host(&self, config: &ClusterConfig) -> Result<Arc<ClusterHost>, ComponentError>;

    /// Public API bound to `host`.
    fn api(&self, config: &RestApiConfig, host: &ClusterHost)
    -> Result<Arc<RestApi>, ComponentError>;

    /// Connector to the IPFS daemon.
    fn connector(&self, config: &IpfsHttpConfig) -> Result<Arc<IpfsConnector>, ComponentError>;

    /// Empty shared state store.
    fn state(&self) -> Result<MapState, ComponentError>;

    /// Pin tracker for the peer `peer_id`.
    fn tracker(
        &self,
        config: &MapTrackerConfig,
        peer_id: &str,
    ) -> Result<Arc<MapPinTracker>, ComponentError>;

    /// Peer monitor.
    fn monitor(&self, config: &MonitorConfig) -> Result<Arc<BasicMonitor>, ComponentError>;

    /// Informer and allocator selected by `name`.
    fn strategy(
        &self,
        name: &str,
        disk: &DiskInformerConfig,
        numpin: &NumpinInformerConfig,
        pins: PinCounter,
    ) -> Result<StrategyPair, StrategyError>;

    /// Content sharder.
    fn sharder(&self, config: &SharderConfig) -> Result<Arc<Sharder>, ComponentError>;
}

/// Factory building the in-process component implementations.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalComponentFactory;

impl ComponentFactory for LocalComponentFactory {
    fn host(&self, config: &ClusterConfig) -> Result<Arc<ClusterHost>, ComponentError> {
        ClusterHost::new(config).map(Arc::new)
    }

    fn api(
        &self,
        config: &RestApiConfig,
        host: &ClusterHost,
    ) -> Result<Arc<RestApi>, ComponentError> {
        RestApi::new(config, host).map(Arc::new)
    }

    fn connector(&self, config: &IpfsHttpConfig) -> Result<Arc<IpfsConnector>, ComponentError> {
        IpfsConnector::new(config).map(Arc::new)
    }

    fn state(&self) -> Result<MapState, ComponentError> {
        Ok(MapState::new())
    }

    fn tracker(
        &self,
        config: &MapTrackerConfig,
        peer_id: &str,
    ) -> Result<Arc<MapPinTracker>, ComponentError> {
        Ok(Arc::new(MapPinTracker::new(config, peer_id)))
    }

    fn monitor(&self, config: &MonitorConfig) -> Result<Arc<BasicMonitor>, ComponentError> {
        Ok(Arc::new(BasicMonitor::new(config)))
    }

    fn strategy(
        &self,
        name: &str,
        disk: &DiskInformerConfig,
        numpin: &NumpinInformerConfig,
        pins: PinCounter,
    ) -> Result<StrategyPair, StrategyError> {
        strategy::select(name, disk, numpin, pins)
    }

    fn sharder(&self, config: &SharderConfig) -> Result<Arc<Sharder>, ComponentError> {
        Ok(Arc::new(Sharder::new(config)))
    }
}
