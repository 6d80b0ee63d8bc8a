//! Component factory double that can fail at a chosen step.

use std::sync::{Arc, Mutex};

use cluster_config::{
    ClusterConfig, DiskInformerConfig, IpfsHttpConfig, MapTrackerConfig, MonitorConfig,
    NumpinInformerConfig, RestApiConfig, SharderConfig,
};

use crate::assembler::AssemblyStep;
use crate::components::{
    BasicMonitor, ClusterHost, ComponentError, ComponentFactory, IpfsConnector,
    LocalComponentFactory, MapPinTracker, PinCounter, RestApi, Sharder,
};
use crate::state::MapState;
use crate::strategy::{StrategyError, StrategyPair};

/// Delegates to [`LocalComponentFactory`], recording each call and failing
/// on request.
#[derive(Debug, Default)]
pub struct ScriptedFactory {
    inner: LocalComponentFactory,
    fail_at: Mutex<Option<AssemblyStep>>,
    calls: Mutex<Vec<AssemblyStep>>,
    host: Mutex<Option<Arc<ClusterHost>>>,
}

impl ScriptedFactory {
    /// Makes the constructor for `step` fail.
    pub fn fail_on(&self, step: AssemblyStep) {
        *self.fail_at.lock().expect("factory mutex poisoned") = Some(step);
    }

    /// Constructors invoked so far, in order.
    pub fn calls(&self) -> Vec<AssemblyStep> {
        self.calls.lock().expect("factory mutex poisoned").clone()
    }

    /// Host built by the factory, if any.
    pub fn host(&self) -> Option<Arc<ClusterHost>> {
        self.host.lock().expect("factory mutex poisoned").clone()
    }

    fn enter(&self, step: AssemblyStep) -> Result<(), ComponentError> {
        self.calls.lock().expect("factory mutex poisoned").push(step);
        if *self.fail_at.lock().expect("factory mutex poisoned") == Some(step) {
            return Err(ComponentError::new("scripted", "intentional test failure"));
        }
        Ok(())
    }
}

impl ComponentFactory for ScriptedFactory {
    fn host(&self, config: &ClusterConfig) -> Result<Arc<ClusterHost>, ComponentError> {
        self.enter(AssemblyStep::Host)?;
        let host = self.inner.host(config)?;
        *self.host.lock().expect("factory mutex poisoned") = Some(Arc::clone(&host));
        Ok(host)
    }

    fn api(
        &self,
        config: &RestApiConfig,
        host: &ClusterHost,
    ) -> Result<Arc<RestApi>, ComponentError> {
        self.enter(AssemblyStep::Api)?;
        self.inner.api(config, host)
    }

    fn connector(&self, config: &IpfsHttpConfig) -> Result<Arc<IpfsConnector>, ComponentError> {
        self.enter(AssemblyStep::Connector)?;
        self.inner.connector(config)
    }

    fn state(&self) -> Result<MapState, ComponentError> {
        self.enter(AssemblyStep::State)?;
        self.inner.state()
    }

    fn tracker(
        &self,
        config: &MapTrackerConfig,
        peer_id: &str,
    ) -> Result<Arc<MapPinTracker>, ComponentError> {
        self.enter(AssemblyStep::PinTracker)?;
        self.inner.tracker(config, peer_id)
    }

    fn monitor(&self, config: &MonitorConfig) -> Result<Arc<BasicMonitor>, ComponentError> {
        self.enter(AssemblyStep::Monitor)?;
        self.inner.monitor(config)
    }

    fn strategy(
        &self,
        name: &str,
        disk: &DiskInformerConfig,
        numpin: &NumpinInformerConfig,
        pins: PinCounter,
    ) -> Result<StrategyPair, StrategyError> {
        self.enter(AssemblyStep::Strategy)
            .map_err(StrategyError::Informer)?;
        self.inner.strategy(name, disk, numpin, pins)
    }

    fn sharder(&self, config: &SharderConfig) -> Result<Arc<Sharder>, ComponentError> {
        self.enter(AssemblyStep::Sharder)?;
        self.inner.sharder(config)
    }
}
