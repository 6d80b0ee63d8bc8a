//! Peer runtime double with scripted shutdown behaviour.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::components::ComponentError;
use crate::runtime::{Completion, PeerRuntime, RuntimeError};

/// What [`StubRuntime::shutdown`] does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownBehaviour {
    /// Finishes immediately and signals completion.
    Complete,
    /// Blocks until [`StubRuntime::release`] is called.
    Hang,
    /// Reports a component failure.
    Fail,
}

/// Runtime whose shutdown follows a [`ShutdownBehaviour`].
#[derive(Debug)]
pub struct StubRuntime {
    behaviour: ShutdownBehaviour,
    shutdowns: AtomicUsize,
    done: Completion,
    released: Completion,
}

impl StubRuntime {
    pub fn new(behaviour: ShutdownBehaviour) -> Self {
        Self {
            behaviour,
            shutdowns: AtomicUsize::new(0),
            done: Completion::default(),
            released: Completion::default(),
        }
    }

    /// Number of shutdown calls received.
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Marks the runtime finished without a shutdown request.
    pub fn finish(&self) {
        self.done.signal();
    }

    /// Unblocks a hanging shutdown.
    pub fn release(&self) {
        self.released.signal();
    }
}

impl PeerRuntime for StubRuntime {
    fn shutdown(&self) -> Result<(), RuntimeError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            ShutdownBehaviour::Complete => {
                self.done.signal();
                Ok(())
            }
            ShutdownBehaviour::Hang => {
                self.released.wait();
                self.done.signal();
                Ok(())
            }
            ShutdownBehaviour::Fail => Err(RuntimeError::Shutdown(vec![ComponentError::new(
                "stub",
                "refused to close",
            )])),
        }
    }

    fn wait_done(&self) {
        self.done.wait();
    }
}
