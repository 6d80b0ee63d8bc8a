//! Allocation strategies: which informer measures peers and how the
//! allocator orders them.
//!
//! Strategies are looked up by name in a fixed table. `--alloc` accepts only
//! the names listed there.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::statvfs::statvfs;
use thiserror::Error;
use tracing::info;

use cluster_config::{DiskInformerConfig, DiskMetric, NumpinInformerConfig};

use crate::components::{Component, ComponentError, Lifecycle, PinCounter};

const STRATEGY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::strategy");

/// Informer implementation used by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InformerKind {
    /// Measures the volume holding the data directory.
    Disk,
    /// Counts pins held by the local tracker.
    PinCount,
}

/// Order in which the allocator prefers peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationOrder {
    /// Lowest metric first.
    Ascending,
    /// Highest metric first.
    Descending,
}

/// One named allocation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyDescriptor {
    /// Name accepted by `--alloc`.
    pub name: &'static str,
    /// Informer reporting the metric.
    pub informer: InformerKind,
    /// Allocator ordering.
    pub order: AllocationOrder,
}

/// Every accepted strategy.
pub const STRATEGIES: &[StrategyDescriptor] = &[
    StrategyDescriptor {
        name: "disk-freespace",
        informer: InformerKind::Disk,
        order: AllocationOrder::Descending,
    },
    StrategyDescriptor {
        name: "disk-reposize",
        informer: InformerKind::Disk,
        order: AllocationOrder::Ascending,
    },
    StrategyDescriptor {
        name: "numpin",
        informer: InformerKind::PinCount,
        order: AllocationOrder::Ascending,
    },
    StrategyDescriptor {
        name: "pincount",
        informer: InformerKind::PinCount,
        order: AllocationOrder::Ascending,
    },
];

/// Errors raised while selecting a strategy.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The name is not in the table.
    #[error("unknown allocation strategy '{name}'; expected one of: {}", known_names())]
    Unknown {
        /// Rejected name.
        name: String,
    },
    /// The informer could not be built.
    #[error("failed to create informer: {0}")]
    Informer(#[source] ComponentError),
}

fn known_names() -> String {
    STRATEGIES
        .iter()
        .map(|descriptor| descriptor.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Looks up a strategy by name.
///
/// # Errors
///
/// Returns [`StrategyError::Unknown`] for names outside [`STRATEGIES`].
pub fn describe(name: &str) -> Result<&'static StrategyDescriptor, StrategyError> {
    STRATEGIES
        .iter()
        .find(|descriptor| descriptor.name == name)
        .ok_or_else(|| StrategyError::Unknown {
            name: name.to_owned(),
        })
}

/// A metric reported by an informer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metric {
    /// Metric name.
    pub name: &'static str,
    /// Measured value.
    pub value: u64,
    /// How long the value stays valid.
    pub ttl: Duration,
}

/// Source of the metric allocation decisions are based on.
pub trait Informer: Component {
    /// Takes a fresh measurement.
    fn metric(&self) -> Result<Metric, ComponentError>;
}

/// A peer and its last reported metric value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Peer identifier.
    pub peer: String,
    /// Metric value.
    pub value: u64,
}

/// Orders candidate peers for an allocation.
pub trait Allocator: Component {
    /// Candidate peers, most preferred first.
    fn allocate(&self, candidates: &[Candidate]) -> Vec<String>;
}

/// Informer and allocator chosen together.
#[derive(Clone)]
pub struct StrategyPair {
    /// Table entry the pair was built from.
    pub descriptor: &'static StrategyDescriptor,
    /// Metric source.
    pub informer: Arc<dyn Informer>,
    /// Peer ordering.
    pub allocator: Arc<dyn Allocator>,
}

impl fmt::Debug for StrategyPair {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StrategyPair")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Builds the informer and allocator for `name`.
///
/// # Errors
///
/// Fails for unknown names or when the informer rejects its configuration.
pub fn select(
    name: &str,
    disk: &DiskInformerConfig,
    numpin: &NumpinInformerConfig,
    pins: PinCounter,
) -> Result<StrategyPair, StrategyError> {
    let descriptor = describe(name)?;
    let informer: Arc<dyn Informer> = match descriptor.informer {
        InformerKind::Disk => {
            Arc::new(DiskInformer::new(disk.clone()).map_err(StrategyError::Informer)?)
        }
        InformerKind::PinCount => Arc::new(NumpinInformer::new(numpin, pins)),
    };
    let allocator: Arc<dyn Allocator> = Arc::new(SortingAllocator::new(descriptor.order));
    info!(
        target: STRATEGY_TARGET,
        strategy = descriptor.name,
        informer = informer.name(),
        allocator = allocator.name(),
        "allocation strategy selected"
    );
    Ok(StrategyPair {
        descriptor,
        informer,
        allocator,
    })
}

/// Informer reporting free or used space on the data volume.
#[derive(Debug)]
pub struct DiskInformer {
    config: DiskInformerConfig,
    lifecycle: Lifecycle,
}

impl DiskInformer {
    const NAME: &'static str = "disk";

    /// Builds the informer.
    ///
    /// # Errors
    ///
    /// Fails when the metric lifetime is zero.
    pub fn new(config: DiskInformerConfig) -> Result<Self, ComponentError> {
        if config.metric_ttl_secs == 0 {
            return Err(ComponentError::new(Self::NAME, "metric_ttl_secs must be positive"));
        }
        Ok(Self {
            config,
            lifecycle: Lifecycle::new(Self::NAME),
        })
    }
}

impl Component for DiskInformer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn shutdown(&self) -> Result<(), ComponentError> {
        self.lifecycle.close();
        Ok(())
    }
}

impl Informer for DiskInformer {
    fn metric(&self) -> Result<Metric, ComponentError> {
        let path = self.config.measured_path();
        let stats = statvfs(path).map_err(|errno| {
            ComponentError::with_source(
                Self::NAME,
                format!("failed to measure '{}'", path.display()),
                errno,
            )
        })?;
        let fragment = u64::from(stats.fragment_size());
        let (name, blocks) = match self.config.metric_type {
            DiskMetric::Freespace => ("freespace", u64::from(stats.blocks_available())),
            DiskMetric::Reposize => (
                "reposize",
                u64::from(stats.blocks()).saturating_sub(u64::from(stats.blocks_free())),
            ),
        };
        Ok(Metric {
            name,
            value: blocks.saturating_mul(fragment),
            ttl: Duration::from_secs(self.config.metric_ttl_secs),
        })
    }
}

/// Informer reporting the number of pins held locally.
#[derive(Debug)]
pub struct NumpinInformer {
    ttl: Duration,
    pins: PinCounter,
    lifecycle: Lifecycle,
}

impl NumpinInformer {
    const NAME: &'static str = "numpin";

    /// Builds the informer over the tracker's counter.
    #[must_use]
    pub fn new(config: &NumpinInformerConfig, pins: PinCounter) -> Self {
        Self {
            ttl: Duration::from_secs(config.metric_ttl_secs),
            pins,
            lifecycle: Lifecycle::new(Self::NAME),
        }
    }
}

impl Component for NumpinInformer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn shutdown(&self) -> Result<(), ComponentError> {
        self.lifecycle.close();
        Ok(())
    }
}

impl Informer for NumpinInformer {
    fn metric(&self) -> Result<Metric, ComponentError> {
        Ok(Metric {
            name: Self::NAME,
            value: self.pins.get(),
            ttl: self.ttl,
        })
    }
}

/// Allocator ordering peers by metric value, ties broken by peer id.
#[derive(Debug)]
pub struct SortingAllocator {
    order: AllocationOrder,
    lifecycle: Lifecycle,
}

impl SortingAllocator {
    /// Builds an allocator with the given ordering.
    #[must_use]
    pub const fn new(order: AllocationOrder) -> Self {
        let name = match order {
            AllocationOrder::Ascending => "ascendalloc",
            AllocationOrder::Descending => "descendalloc",
        };
        Self {
            order,
            lifecycle: Lifecycle::new(name),
        }
    }

    fn compare(&self, left: &Candidate, right: &Candidate) -> Ordering {
        let by_value = match self.order {
            AllocationOrder::Ascending => left.value.cmp(&right.value),
            AllocationOrder::Descending => right.value.cmp(&left.value),
        };
        by_value.then_with(|| left.peer.cmp(&right.peer))
    }
}

impl Component for SortingAllocator {
    fn name(&self) -> &'static str {
        match self.order {
            AllocationOrder::Ascending => "ascendalloc",
            AllocationOrder::Descending => "descendalloc",
        }
    }

    fn shutdown(&self) -> Result<(), ComponentError> {
        self.lifecycle.close();
        Ok(())
    }
}

impl Allocator for SortingAllocator {
    fn allocate(&self, candidates: &[Candidate]) -> Vec<String> {
        let mut sorted: Vec<&Candidate> = candidates.iter().collect();
        sorted.sort_by(|left, right| self.compare(left, right));
        sorted
            .into_iter()
            .map(|candidate| candidate.peer.clone())
            .collect()
    }
}
