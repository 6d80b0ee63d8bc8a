//! Interrupt source double.

use std::sync::mpsc::Sender;

use crate::supervisor::{InterruptSource, SupervisorError, SupervisorEvent};

/// Delivers a fixed number of interrupts as soon as it is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptedInterrupts {
    count: usize,
}

impl ScriptedInterrupts {
    pub const fn new(count: usize) -> Self {
        Self { count }
    }
}

impl InterruptSource for ScriptedInterrupts {
    fn install(&self, events: Sender<SupervisorEvent>) -> Result<(), SupervisorError> {
        for _ in 0..self.count {
            events
                .send(SupervisorEvent::Interrupt)
                .map_err(|_| SupervisorError::EventsClosed)?;
        }
        Ok(())
    }
}
