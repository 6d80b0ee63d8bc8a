//! Test suites for the cluster service.

mod support;
mod workflow_unit;
