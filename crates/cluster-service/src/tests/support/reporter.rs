//! Health reporter double that records every event.

use std::sync::Mutex;

use crate::assembler::{AssemblyError, AssemblyStep};
use crate::health::HealthReporter;
use crate::supervisor::SupervisorState;

/// Lifecycle events captured by [`RecordingHealthReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    AssemblyStarting,
    StepReady(AssemblyStep),
    AssemblySucceeded(String),
    AssemblyFailed(Option<AssemblyStep>),
    Transition(SupervisorState),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    /// Steps reported ready, in order.
    pub fn ready_steps(&self) -> Vec<AssemblyStep> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::StepReady(step) => Some(step),
                _ => None,
            })
            .collect()
    }

    /// Supervisor states reported, in order.
    pub fn transitions(&self) -> Vec<SupervisorState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::Transition(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn assembly_starting(&self) {
        self.record(HealthEvent::AssemblyStarting);
    }

    fn step_ready(&self, step: AssemblyStep) {
        self.record(HealthEvent::StepReady(step));
    }

    fn assembly_succeeded(&self, peer_id: &str) {
        self.record(HealthEvent::AssemblySucceeded(peer_id.to_owned()));
    }

    fn assembly_failed(&self, error: &AssemblyError) {
        self.record(HealthEvent::AssemblyFailed(error.step()));
    }

    fn supervisor_transition(&self, state: SupervisorState) {
        self.record(HealthEvent::Transition(state));
    }
}
