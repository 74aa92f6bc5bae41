use crate::collectors::SensorSource;
use crate::config::Capabilities;
use crate::error::Result;
use crate::hardware::HardwareNode;
use tracing::debug;

/// Serves a fixed hardware tree. Values never change between refreshes.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    hardware: Vec<HardwareNode>,
}

impl FixtureSource {
    pub fn new(hardware: Vec<HardwareNode>) -> Self {
        Self { hardware }
    }
}

impl SensorSource for FixtureSource {
    fn name(&self) -> &'static str {
        "fixture"
    }

    fn open(&mut self, capabilities: &Capabilities) -> Result<Vec<HardwareNode>> {
        Ok(retain_enabled(&self.hardware, capabilities))
    }

    fn update(&mut self, node: &mut HardwareNode) {
        debug!(hardware = %node.identifier, sensors = node.sensors.len(), "fixture refresh");
    }
}

fn retain_enabled(nodes: &[HardwareNode], capabilities: &Capabilities) -> Vec<HardwareNode> {
    nodes
        .iter()
        .filter(|n| capabilities.allows(n.hardware_type))
        .map(|n| HardwareNode {
            sub_hardware: retain_enabled(&n.sub_hardware, capabilities),
            ..n.clone()
        })
        .collect()
}
