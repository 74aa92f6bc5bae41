//! Hardware tree as reported by a sensor backend.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum HardwareType {
    Cpu,
    GpuNvidia,
    GpuAmd,
    GpuIntel,
    Memory,
    Motherboard,
    SuperIO,
    Controller,
    EmbeddedController,
    Storage,
    Network,
    Psu,
    Battery,
}

impl HardwareType {
    pub fn as_str(self) -> &'static str {
        match self {
            HardwareType::Cpu => "Cpu",
            HardwareType::GpuNvidia => "GpuNvidia",
            HardwareType::GpuAmd => "GpuAmd",
            HardwareType::GpuIntel => "GpuIntel",
            HardwareType::Memory => "Memory",
            HardwareType::Motherboard => "Motherboard",
            HardwareType::SuperIO => "SuperIO",
            HardwareType::Controller => "Controller",
            HardwareType::EmbeddedController => "EmbeddedController",
            HardwareType::Storage => "Storage",
            HardwareType::Network => "Network",
            HardwareType::Psu => "Psu",
            HardwareType::Battery => "Battery",
        }
    }
}

impl fmt::Display for HardwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Sensor {
    pub name: String,
    #[serde(default)]
    pub value: Option<f32>,
}

impl Sensor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    pub fn with_value(name: impl Into<String>, value: f32) -> Self {
        Self {
            name: name.into(),
            value: Some(value),
        }
    }
}

/// One logical component, possibly with nested sub-components.
///
/// `identifier` is assigned by the backend and unique within one tree.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HardwareNode {
    pub identifier: String,
    pub name: String,
    pub hardware_type: HardwareType,
    #[serde(default)]
    pub sensors: Vec<Sensor>,
    #[serde(default)]
    pub sub_hardware: Vec<HardwareNode>,
}

impl HardwareNode {
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        hardware_type: HardwareType,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            hardware_type,
            sensors: Vec::new(),
            sub_hardware: Vec::new(),
        }
    }
}

/// Depth-first pre-order listing of every node in `hardware`.
pub fn flatten(hardware: &[HardwareNode]) -> Vec<&HardwareNode> {
    fn visit<'a>(nodes: &'a [HardwareNode], out: &mut Vec<&'a HardwareNode>) {
        for node in nodes {
            out.push(node);
            visit(&node.sub_hardware, out);
        }
    }

    let mut out = Vec::new();
    visit(hardware, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_text_matches_serde_name() {
        let yaml = serde_yaml::to_string(&HardwareType::EmbeddedController).unwrap();
        assert_eq!(yaml.trim(), HardwareType::EmbeddedController.to_string());
        let parsed: HardwareType = serde_yaml::from_str("GpuIntel").unwrap();
        assert_eq!(parsed, HardwareType::GpuIntel);
    }

    #[test]
    fn flatten_is_depth_first_pre_order() {
        let mut board = HardwareNode::new("/mb", "Board", HardwareType::Motherboard);
        let mut superio = HardwareNode::new("/lpc/0", "Nuvoton", HardwareType::SuperIO);
        superio
            .sub_hardware
            .push(HardwareNode::new("/lpc/0/ec", "EC", HardwareType::EmbeddedController));
        board.sub_hardware.push(superio);
        let cpu = HardwareNode::new("/cpu/0", "Cpu", HardwareType::Cpu);
        let tree = vec![board, cpu];

        let ids: Vec<&str> = flatten(&tree)
            .iter()
            .map(|n| n.identifier.as_str())
            .collect();
        assert_eq!(ids, ["/mb", "/lpc/0", "/lpc/0/ec", "/cpu/0"]);
    }
}
