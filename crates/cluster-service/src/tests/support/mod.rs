//! Test doubles and fixtures shared by the service suites.

mod factory;
mod fixture;
mod interrupts;
mod reporter;
mod runtime;

pub use factory::ScriptedFactory;
pub use fixture::ConfigFixture;
pub use interrupts::ScriptedInterrupts;
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use runtime::{ShutdownBehaviour, StubRuntime};
