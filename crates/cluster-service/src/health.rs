//! Structured health reporting for peer lifecycle events.

use std::sync::Arc;

use crate::assembler::{AssemblyError, AssemblyStep};
use crate::supervisor::SupervisorState;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before the first component is built.
    fn assembly_starting(&self);

    /// Invoked after each assembly step completes.
    fn step_ready(&self, step: AssemblyStep);

    /// Invoked once the peer is running.
    fn assembly_succeeded(&self, peer_id: &str);

    /// Invoked when assembly fails, after partial components are closed.
    fn assembly_failed(&self, error: &AssemblyError);

    /// Invoked when the shutdown supervisor changes state.
    fn supervisor_transition(&self, state: SupervisorState);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn assembly_starting(&self) {
        (**self).assembly_starting();
    }

    fn step_ready(&self, step: AssemblyStep) {
        (**self).step_ready(step);
    }

    fn assembly_succeeded(&self, peer_id: &str) {
        (**self).assembly_succeeded(peer_id);
    }

    fn assembly_failed(&self, error: &AssemblyError) {
        (**self).assembly_failed(error);
    }

    fn supervisor_transition(&self, state: SupervisorState) {
        (**self).supervisor_transition(state);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn assembly_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "assembly_starting",
            "assembling cluster peer"
        );
    }

    fn step_ready(&self, step: AssemblyStep) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "step_ready",
            step = %step,
            "assembly step completed"
        );
    }

    fn assembly_succeeded(&self, peer_id: &str) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "assembly_succeeded",
            peer = peer_id,
            "cluster peer assembled"
        );
    }

    fn assembly_failed(&self, error: &AssemblyError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "assembly_failed",
            step = ?error.step(),
            error = %error,
            "cluster peer assembly failed"
        );
    }

    fn supervisor_transition(&self, state: SupervisorState) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "supervisor_transition",
            state = %state,
            "shutdown supervisor changed state"
        );
    }
}
