pub mod fixture;
pub mod nvidia;
pub mod system;

use crate::config::{BackendConfig, Capabilities};
use crate::error::Result;
use crate::hardware::HardwareNode;

/// Acquisition backend behind a monitoring session.
///
/// Implementations are driven from a single thread at a time.
pub trait SensorSource: Send {
    fn name(&self) -> &'static str;

    /// Initializes the backend and enumerates the enabled subsystems.
    fn open(&mut self, capabilities: &Capabilities) -> Result<Vec<HardwareNode>>;

    /// Called once before every walk over the tree, ahead of any `update`.
    fn begin_refresh(&mut self) {}

    /// Re-reads the values of `node`'s own sensors in place.
    fn update(&mut self, node: &mut HardwareNode);

    fn close(&mut self) {}
}

pub fn build_source(backend: &BackendConfig) -> Box<dyn SensorSource> {
    match backend {
        BackendConfig::Sysinfo { nvidia_smi } => {
            Box::new(system::SysinfoSource::new(*nvidia_smi))
        }
        BackendConfig::Fixture { hardware } => {
            Box::new(fixture::FixtureSource::new(hardware.clone()))
        }
    }
}
