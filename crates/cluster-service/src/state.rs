//! In-memory shared state: the set of pins the cluster tracks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Format version written by this build into snapshots and exports.
pub const STATE_VERSION: u32 = 4;

/// A content identifier tracked by the cluster together with its placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    /// Content identifier.
    pub cid: String,
    /// Human-readable label.
    #[serde(default)]
    pub name: String,
    /// Minimum number of peers that must hold the content; `-1` means all.
    pub replication_factor_min: i32,
    /// Maximum number of peers that should hold the content; `-1` means all.
    pub replication_factor_max: i32,
    /// Peers the content is allocated to.
    #[serde(default)]
    pub allocations: Vec<String>,
}

impl Pin {
    /// Pin replicated on every peer.
    #[must_use]
    pub fn everywhere(cid: impl Into<String>) -> Self {
        Self {
            cid: cid.into(),
            name: String::new(),
            replication_factor_min: -1,
            replication_factor_max: -1,
            allocations: Vec::new(),
        }
    }
}

/// Serialised body of the state, shared by snapshots and exports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StatePayload {
    pub(crate) pins: Vec<Pin>,
}

/// Pin set keyed by content identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StatePayload", into = "StatePayload")]
pub struct MapState {
    pins: BTreeMap<String, Pin>,
}

impl MapState {
    /// Empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a pin.
    pub fn add(&mut self, pin: Pin) {
        self.pins.insert(pin.cid.clone(), pin);
    }

    /// Removes a pin, returning it when present.
    pub fn remove(&mut self, cid: &str) -> Option<Pin> {
        self.pins.remove(cid)
    }

    /// Looks up a pin.
    #[must_use]
    pub fn get(&self, cid: &str) -> Option<&Pin> {
        self.pins.get(cid)
    }

    /// Pins ordered by content identifier.
    pub fn pins(&self) -> impl Iterator<Item = &Pin> {
        self.pins.values()
    }

    /// Number of pins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pins.len()
    }

    /// Whether the state tracks nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

impl FromIterator<Pin> for MapState {
    fn from_iter<I: IntoIterator<Item = Pin>>(iter: I) -> Self {
        let mut state = Self::new();
        for pin in iter {
            state.add(pin);
        }
        state
    }
}

impl From<StatePayload> for MapState {
    fn from(payload: StatePayload) -> Self {
        payload.pins.into_iter().collect()
    }
}

impl From<MapState> for StatePayload {
    fn from(state: MapState) -> Self {
        Self {
            pins: state.pins.into_values().collect(),
        }
    }
}
