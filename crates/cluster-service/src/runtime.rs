//! The running peer and its orderly shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tracing::{info, warn};

use cluster_config::ClusterConfig;

use crate::components::{
    BasicMonitor, ClusterHost, Component, ComponentError, IpfsConnector, MapPinTracker, RestApi,
    Sharder,
};
use crate::snapshot::{SnapshotError, SnapshotManager};
use crate::state::MapState;
use crate::strategy::StrategyPair;

const RUNTIME_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::runtime");

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Errors raised by the running peer.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Restoring or persisting state failed.
    #[error("state persistence failed: {0}")]
    State(#[from] SnapshotError),
    /// One or more components failed to close.
    #[error("{} component(s) failed to shut down: {}", .0.len(), describe(.0))]
    Shutdown(Vec<ComponentError>),
    /// An informer failed to report.
    #[error(transparent)]
    Component(#[from] ComponentError),
}

fn describe(errors: &[ComponentError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// What the supervisor needs from a running peer.
pub trait PeerRuntime: Send + Sync {
    /// Runs an orderly shutdown. Repeated calls return immediately.
    fn shutdown(&self) -> Result<(), RuntimeError>;

    /// Blocks until shutdown has completed successfully.
    fn wait_done(&self);
}

/// One-shot completion signal.
#[derive(Debug, Clone, Default)]
pub struct Completion {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Completion {
    /// Marks completion and wakes every waiter.
    pub fn signal(&self) {
        let (lock, cvar) = &*self.inner;
        *guard(lock) = true;
        cvar.notify_all();
    }

    /// Blocks until [`Completion::signal`] has been called.
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut done = guard(lock);
        while !*done {
            done = cvar.wait(done).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Whether completion has been signalled.
    #[must_use]
    pub fn is_signalled(&self) -> bool {
        *guard(&self.inner.0)
    }
}

/// Components making up an assembled peer, in construction order.
#[derive(Debug)]
pub struct PeerParts {
    /// Network host.
    pub host: Arc<ClusterHost>,
    /// Public API.
    pub api: Arc<RestApi>,
    /// IPFS connector.
    pub connector: Arc<IpfsConnector>,
    /// Empty state store.
    pub state: MapState,
    /// Pin tracker.
    pub tracker: Arc<MapPinTracker>,
    /// Peer monitor.
    pub monitor: Arc<BasicMonitor>,
    /// Informer and allocator.
    pub strategy: StrategyPair,
    /// Content sharder.
    pub sharder: Arc<Sharder>,
}

/// A fully assembled, running peer.
#[derive(Debug)]
pub struct Cluster {
    config: ClusterConfig,
    parts: PeerParts,
    state: Mutex<MapState>,
    snapshots: SnapshotManager,
    stopping: AtomicBool,
    done: Completion,
}

impl Cluster {
    /// Starts the peer, restoring state from the newest snapshot.
    ///
    /// # Errors
    ///
    /// Fails when the snapshot cannot be read or the informer cannot report.
    pub fn start(
        config: ClusterConfig,
        parts: PeerParts,
        snapshots: SnapshotManager,
    ) -> Result<Self, RuntimeError> {
        let mut state = parts.state.clone();
        if let Some(restored) = snapshots.latest_state()? {
            state = restored;
        }
        for pin in state.pins() {
            parts.tracker.track(pin);
        }
        let metric = parts.strategy.informer.metric()?;
        parts.monitor.log_metric(&config.id, &metric);
        info!(
            target: RUNTIME_TARGET,
            peer = %config.id,
            pins = state.len(),
            strategy = parts.strategy.descriptor.name,
            "cluster peer running"
        );
        Ok(Self {
            config,
            parts,
            state: Mutex::new(state),
            snapshots,
            stopping: AtomicBool::new(false),
            done: Completion::default(),
        })
    }

    /// Identity of the peer.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Components the peer runs.
    #[must_use]
    pub fn parts(&self) -> &PeerParts {
        &self.parts
    }

    /// Copy of the current pin set.
    #[must_use]
    pub fn state(&self) -> MapState {
        guard(&self.state).clone()
    }

    /// Completion signalled once shutdown has finished.
    #[must_use]
    pub fn done(&self) -> Completion {
        self.done.clone()
    }

    fn components_in_shutdown_order(&self) -> [&dyn Component; 8] {
        let parts = &self.parts;
        [
            &*parts.sharder,
            &*parts.strategy.allocator,
            &*parts.strategy.informer,
            &*parts.monitor,
            &*parts.tracker,
            &*parts.connector,
            &*parts.api,
            &*parts.host,
        ]
    }
}

impl PeerRuntime for Cluster {
    fn shutdown(&self) -> Result<(), RuntimeError> {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(target: RUNTIME_TARGET, peer = %self.config.id, "shutting down");

        let persisted = self.snapshots.persist(&guard(&self.state));
        if self.config.leave_on_shutdown {
            info!(
                target: RUNTIME_TARGET,
                peer = %self.config.id,
                "leaving the cluster peer set"
            );
        }

        let mut failures = Vec::new();
        for component in self.components_in_shutdown_order() {
            if let Err(error) = component.shutdown() {
                warn!(
                    target: RUNTIME_TARGET,
                    component = component.name(),
                    error = %error,
                    "component failed to shut down"
                );
                failures.push(error);
            }
        }

        // A failed shutdown is reported by the caller, never as completion.
        let seq = persisted?;
        info!(target: RUNTIME_TARGET, seq, "state snapshot saved");
        if !failures.is_empty() {
            return Err(RuntimeError::Shutdown(failures));
        }
        self.done.signal();
        Ok(())
    }

    fn wait_done(&self) {
        self.done.wait();
    }
}
