use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::debug;

use cluster_config::{MapTrackerConfig, MonitorConfig, SharderConfig};

use crate::state::Pin;
use crate::strategy::Metric;

use super::{COMPONENT_TARGET, Component, ComponentError, Lifecycle, PinCounter};

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Local view of a tracked pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackStatus {
    /// This peer holds the content.
    Pinned,
    /// Other peers hold the content.
    Remote,
}

/// Tracks which pins this peer is responsible for.
#[derive(Debug)]
pub struct MapPinTracker {
    peer_id: String,
    statuses: Mutex<BTreeMap<String, TrackStatus>>,
    counter: PinCounter,
    lifecycle: Lifecycle,
}

impl MapPinTracker {
    const NAME: &'static str = "maptracker";

    /// Tracker for the peer `peer_id`.
    #[must_use]
    pub fn new(config: &MapTrackerConfig, peer_id: &str) -> Self {
        debug!(
            target: COMPONENT_TARGET,
            max_pin_queue_size = config.max_pin_queue_size,
            concurrent_pins = config.concurrent_pins,
            "pin tracker configured"
        );
        Self {
            peer_id: peer_id.to_owned(),
            statuses: Mutex::new(BTreeMap::new()),
            counter: PinCounter::default(),
            lifecycle: Lifecycle::new(Self::NAME),
        }
    }

    /// Counter of locally held pins, read by the pin-count informer.
    #[must_use]
    pub fn counter(&self) -> PinCounter {
        self.counter.clone()
    }

    /// Starts tracking `pin`, returning its local status.
    pub fn track(&self, pin: &Pin) -> TrackStatus {
        let status = if pin.allocations.is_empty()
            || pin.allocations.iter().any(|peer| *peer == self.peer_id)
        {
            TrackStatus::Pinned
        } else {
            TrackStatus::Remote
        };
        let mut statuses = guard(&self.statuses);
        statuses.insert(pin.cid.clone(), status);
        self.publish(&statuses);
        debug!(
            target: COMPONENT_TARGET,
            cid = %pin.cid,
            ?status,
            "pin tracked"
        );
        status
    }

    fn publish(&self, statuses: &BTreeMap<String, TrackStatus>) {
        let pinned = statuses
            .values()
            .filter(|status| **status == TrackStatus::Pinned)
            .count();
        self.counter.set(pinned as u64);
    }
}

impl Component for MapPinTracker {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn shutdown(&self) -> Result<(), ComponentError> {
        if self.lifecycle.close() {
            guard(&self.statuses).clear();
            self.counter.set(0);
        }
        Ok(())
    }
}

/// Keeps the expiry of the latest metric reported by every peer.
#[derive(Debug)]
pub struct BasicMonitor {
    metrics: Mutex<BTreeMap<(&'static str, String), Option<Instant>>>,
    lifecycle: Lifecycle,
}

impl BasicMonitor {
    const NAME: &'static str = "monbasic";

    /// Builds the monitor.
    #[must_use]
    pub fn new(config: &MonitorConfig) -> Self {
        debug!(
            target: COMPONENT_TARGET,
            check_interval_secs = config.check_interval_secs,
            "monitor configured"
        );
        Self {
            metrics: Mutex::new(BTreeMap::new()),
            lifecycle: Lifecycle::new(Self::NAME),
        }
    }

    /// Records `metric` as reported by `peer`.
    ///
    /// A TTL too large to represent never expires.
    pub fn log_metric(&self, peer: &str, metric: &Metric) {
        let expires = Instant::now().checked_add(metric.ttl);
        debug!(
            target: COMPONENT_TARGET,
            peer,
            metric = metric.name,
            value = metric.value,
            expires = expires.is_some(),
            "metric logged"
        );
        guard(&self.metrics).insert((metric.name, peer.to_owned()), expires);
    }

    /// Number of logged metrics that have not expired.
    #[must_use]
    pub fn live_metrics(&self) -> usize {
        let now = Instant::now();
        guard(&self.metrics)
            .values()
            .filter(|expires| expires.is_none_or(|at| at > now))
            .count()
    }
}

impl Component for BasicMonitor {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn shutdown(&self) -> Result<(), ComponentError> {
        if self.lifecycle.close() {
            debug!(
                target: COMPONENT_TARGET,
                live = self.live_metrics(),
                "discarding monitored metrics"
            );
            guard(&self.metrics).clear();
        }
        Ok(())
    }
}

/// Splits large content into shards of a bounded size.
#[derive(Debug)]
pub struct Sharder {
    lifecycle: Lifecycle,
}

impl Sharder {
    const NAME: &'static str = "sharder";

    /// Builds the sharder.
    #[must_use]
    pub fn new(config: &SharderConfig) -> Self {
        debug!(
            target: COMPONENT_TARGET,
            alloc_size = config.alloc_size,
            "sharder configured"
        );
        Self {
            lifecycle: Lifecycle::new(Self::NAME),
        }
    }
}

impl Component for Sharder {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn shutdown(&self) -> Result<(), ComponentError> {
        self.lifecycle.close();
        Ok(())
    }
}
