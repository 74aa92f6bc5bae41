use crate::collectors::SensorSource;
use crate::hardware::HardwareNode;

/// Refreshes every node depth-first: a node's own sensors first, then each of
/// its sub-hardware in order.
pub fn refresh(source: &mut dyn SensorSource, hardware: &mut [HardwareNode]) {
    source.begin_refresh();
    for node in hardware.iter_mut() {
        refresh_node(source, node);
    }
}

fn refresh_node(source: &mut dyn SensorSource, node: &mut HardwareNode) {
    source.update(node);
    for child in node.sub_hardware.iter_mut() {
        refresh_node(source, child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Capabilities;
    use crate::error::Result;
    use crate::hardware::{HardwareType, Sensor};

    /// Writes an increasing counter into every sensor and records visit order.
    struct CountingSource {
        visits: Vec<String>,
        tick: f32,
    }

    impl SensorSource for CountingSource {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn open(&mut self, _: &Capabilities) -> Result<Vec<HardwareNode>> {
            Ok(Vec::new())
        }

        fn begin_refresh(&mut self) {
            self.visits.push("begin".to_string());
        }

        fn update(&mut self, node: &mut HardwareNode) {
            self.visits.push(node.identifier.clone());
            for sensor in &mut node.sensors {
                self.tick += 1.0;
                sensor.value = Some(self.tick);
            }
        }
    }

    #[test]
    fn visits_parents_before_children() {
        let mut board = HardwareNode::new("/mb", "Board", HardwareType::Motherboard);
        let mut superio = HardwareNode::new("/lpc/0", "SuperIO", HardwareType::SuperIO);
        superio.sensors.push(Sensor::new("Fan #1"));
        superio
            .sub_hardware
            .push(HardwareNode::new("/lpc/0/ec", "EC", HardwareType::EmbeddedController));
        board.sub_hardware.push(superio);
        let mut cpu = HardwareNode::new("/cpu/0", "Cpu", HardwareType::Cpu);
        cpu.sensors.push(Sensor::new("CPU Total"));
        let mut tree = vec![board, cpu];

        let mut source = CountingSource {
            visits: Vec::new(),
            tick: 0.0,
        };
        refresh(&mut source, &mut tree);

        assert_eq!(source.visits, ["begin", "/mb", "/lpc/0", "/lpc/0/ec", "/cpu/0"]);
        assert_eq!(tree[0].sub_hardware[0].sensors[0].value, Some(1.0));
        assert_eq!(tree[1].sensors[0].value, Some(2.0));

        refresh(&mut source, &mut tree);
        assert_eq!(tree[1].sensors[0].value, Some(4.0));
    }
}
