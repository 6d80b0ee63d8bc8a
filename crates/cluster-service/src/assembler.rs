//! Ordered, fail-fast construction of a cluster peer.
//!
//! Components are built one at a time in dependency order. The first failure
//! stops assembly, closes everything already built in reverse order, and is
//! returned to the caller. Persisted state is checked against this build
//! right after the state store exists and before anything consumes it.

use std::sync::Arc;

use strum::Display;
use thiserror::Error;
use tracing::{debug, warn};

use cluster_config::{
    ClusterConfig, ConfigError, ConfigRegistry, DiskInformerConfig, IpfsHttpConfig,
    MapTrackerConfig, MonitorConfig, NumpinInformerConfig, RaftConfig, RestApiConfig,
    SharderConfig,
};

use crate::components::{Component, ComponentError, ComponentFactory};
use crate::context::ExecutionContext;
use crate::health::HealthReporter;
use crate::runtime::{Cluster, PeerParts, RuntimeError};
use crate::snapshot::{SnapshotError, SnapshotManager};
use crate::strategy::StrategyError;
use crate::version;

const ASSEMBLY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::assembly");

/// Steps of peer assembly, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AssemblyStep {
    /// Network host.
    Host,
    /// Public API.
    Api,
    /// IPFS connector.
    Connector,
    /// Shared state store.
    State,
    /// Persisted state version check.
    VersionCheck,
    /// Pin tracker.
    PinTracker,
    /// Peer monitor.
    Monitor,
    /// Informer and allocator.
    Strategy,
    /// Content sharder.
    Sharder,
    /// Cluster runtime.
    Runtime,
}

/// Errors raised while assembling a peer.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// A configuration section needed by a component is unavailable.
    #[error("configuration is incomplete: {0}")]
    Config(#[from] ConfigError),
    /// The execution context was cancelled.
    #[error("assembly cancelled before {step}")]
    Cancelled {
        /// Step that did not start.
        step: AssemblyStep,
    },
    /// A component constructor failed.
    #[error("failed to create {step}: {source}")]
    Construction {
        /// Failing step.
        step: AssemblyStep,
        /// Reported failure.
        #[source]
        source: ComponentError,
    },
    /// Persisted state cannot be used by this build.
    #[error("{0}")]
    Version(#[source] SnapshotError),
    /// The allocation strategy could not be built.
    #[error(transparent)]
    Strategy(#[from] StrategyError),
    /// The runtime failed to start.
    #[error("failed to start the cluster: {0}")]
    Runtime(#[source] RuntimeError),
}

impl AssemblyError {
    /// Step the error was raised at, when it belongs to one.
    #[must_use]
    pub const fn step(&self) -> Option<AssemblyStep> {
        match self {
            Self::Config(_) => None,
            Self::Cancelled { step } | Self::Construction { step, .. } => Some(*step),
            Self::Version(_) => Some(AssemblyStep::VersionCheck),
            Self::Strategy(_) => Some(AssemblyStep::Strategy),
            Self::Runtime(_) => Some(AssemblyStep::Runtime),
        }
    }
}

/// Components built so far, closed in reverse order when assembly fails.
#[derive(Default)]
struct Built(Vec<Arc<dyn Component>>);

impl Built {
    fn push(&mut self, component: Arc<dyn Component>) {
        self.0.push(component);
    }

    fn close_all(self) {
        for component in self.0.into_iter().rev() {
            match component.shutdown() {
                Ok(()) => debug!(
                    target: ASSEMBLY_TARGET,
                    component = component.name(),
                    "closed partially assembled component"
                ),
                Err(error) => warn!(
                    target: ASSEMBLY_TARGET,
                    component = component.name(),
                    error = %error,
                    "failed to close partially assembled component"
                ),
            }
        }
    }
}

struct Sections<'a> {
    cluster: &'a ClusterConfig,
    api: &'a RestApiConfig,
    connector: &'a IpfsHttpConfig,
    consensus: &'a RaftConfig,
    tracker: &'a MapTrackerConfig,
    monitor: &'a MonitorConfig,
    disk: &'a DiskInformerConfig,
    numpin: &'a NumpinInformerConfig,
    sharder: &'a SharderConfig,
}

impl<'a> Sections<'a> {
    fn from_registry(registry: &'a ConfigRegistry) -> Result<Self, ConfigError> {
        Ok(Self {
            cluster: registry.get()?,
            api: registry.get()?,
            connector: registry.get()?,
            consensus: registry.get()?,
            tracker: registry.get()?,
            monitor: registry.get()?,
            disk: registry.get()?,
            numpin: registry.get()?,
            sharder: registry.get()?,
        })
    }
}

/// Builds and starts a peer from a loaded registry.
///
/// # Errors
///
/// Returns the first failure; components built before it have been closed.
pub fn assemble<F>(
    execution: &ExecutionContext,
    registry: &ConfigRegistry,
    allocation: &str,
    factory: &F,
    reporter: &dyn HealthReporter,
) -> Result<Cluster, AssemblyError>
where
    F: ComponentFactory + ?Sized,
{
    reporter.assembly_starting();
    let mut built = Built::default();
    match build(execution, registry, allocation, factory, reporter, &mut built) {
        Ok(cluster) => {
            reporter.assembly_succeeded(cluster.id());
            Ok(cluster)
        }
        Err(error) => {
            built.close_all();
            reporter.assembly_failed(&error);
            Err(error)
        }
    }
}

fn build<F>(
    execution: &ExecutionContext,
    registry: &ConfigRegistry,
    allocation: &str,
    factory: &F,
    reporter: &dyn HealthReporter,
    built: &mut Built,
) -> Result<Cluster, AssemblyError>
where
    F: ComponentFactory + ?Sized,
{
    let sections = Sections::from_registry(registry)?;
    let step = |step: AssemblyStep| {
        if execution.is_cancelled() {
            Err(AssemblyError::Cancelled { step })
        } else {
            Ok(step)
        }
    };
    let failed = |step: AssemblyStep| {
        move |source: ComponentError| AssemblyError::Construction { step, source }
    };

    let current = step(AssemblyStep::Host)?;
    let host = factory.host(sections.cluster).map_err(failed(current))?;
    built.push(host.clone());
    reporter.step_ready(current);

    let current = step(AssemblyStep::Api)?;
    let api = factory
        .api(sections.api, &host)
        .map_err(failed(current))?;
    built.push(api.clone());
    reporter.step_ready(current);

    let current = step(AssemblyStep::Connector)?;
    let connector = factory
        .connector(sections.connector)
        .map_err(failed(current))?;
    built.push(connector.clone());
    reporter.step_ready(current);

    let current = step(AssemblyStep::State)?;
    let state = factory.state().map_err(failed(current))?;
    reporter.step_ready(current);

    let current = step(AssemblyStep::VersionCheck)?;
    version::validate(sections.cluster, sections.consensus).map_err(AssemblyError::Version)?;
    reporter.step_ready(current);

    let current = step(AssemblyStep::PinTracker)?;
    let tracker = factory
        .tracker(sections.tracker, host.peer_id())
        .map_err(failed(current))?;
    built.push(tracker.clone());
    reporter.step_ready(current);

    let current = step(AssemblyStep::Monitor)?;
    let monitor = factory
        .monitor(sections.monitor)
        .map_err(failed(current))?;
    built.push(monitor.clone());
    reporter.step_ready(current);

    let current = step(AssemblyStep::Strategy)?;
    let strategy = factory.strategy(
        allocation,
        sections.disk,
        sections.numpin,
        tracker.counter(),
    )?;
    built.push(strategy.informer.clone());
    built.push(strategy.allocator.clone());
    reporter.step_ready(current);

    let current = step(AssemblyStep::Sharder)?;
    let sharder = factory
        .sharder(sections.sharder)
        .map_err(failed(current))?;
    built.push(sharder.clone());
    reporter.step_ready(current);

    let current = step(AssemblyStep::Runtime)?;
    let parts = PeerParts {
        host,
        api,
        connector,
        state,
        tracker,
        monitor,
        strategy,
        sharder,
    };
    let cluster = Cluster::start(
        sections.cluster.clone(),
        parts,
        SnapshotManager::new(sections.consensus),
    )
    .map_err(AssemblyError::Runtime)?;
    reporter.step_ready(current);
    Ok(cluster)
}
