use crate::collectors::nvidia::{self, SmiField, SmiRow};
use crate::collectors::SensorSource;
use crate::config::Capabilities;
use crate::error::{BridgeError, Result};
use crate::hardware::{HardwareNode, HardwareType, Sensor};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use sysinfo::{ComponentExt, CpuExt, DiskExt, NetworkExt, NetworksExt, System, SystemExt};
use tracing::debug;

const BYTES_PER_GB: f32 = 1024.0 * 1024.0 * 1024.0;
/// Shortest gap between two CPU refreshes that gives sysinfo a usable load.
const CPU_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

/// Where a sensor's value comes from on each refresh.
#[derive(Debug, Clone, PartialEq)]
enum Probe {
    CpuTotalLoad,
    CpuCoreLoad(usize),
    CpuCoreClock(usize),
    MemoryUsed,
    MemoryAvailable,
    MemoryLoad,
    SwapUsed,
    SwapAvailable,
    SwapLoad,
    DiskUsedPercent(PathBuf),
    DiskFree(PathBuf),
    DiskTotal(PathBuf),
    NetUploaded(String),
    NetDownloaded(String),
    NetUploadSpeed(String),
    NetDownloadSpeed(String),
    Temperature(String),
    Smi(String, SmiField),
}

impl Probe {
    fn needs_networks(&self) -> bool {
        matches!(
            self,
            Probe::NetUploaded(_)
                | Probe::NetDownloaded(_)
                | Probe::NetUploadSpeed(_)
                | Probe::NetDownloadSpeed(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ComponentClass {
    Cpu,
    Gpu(HardwareType),
    Board,
}

/// Host sensors read through `sysinfo`, with GPUs from `nvidia-smi` when present.
pub struct SysinfoSource {
    system: System,
    nvidia_smi: bool,
    probes: HashMap<String, Vec<Probe>>,
    smi_rows: Vec<SmiRow>,
    cpu_sampled_at: Option<Instant>,
    networks_refreshed_at: Option<Instant>,
    network_interval_secs: f32,
}

impl SysinfoSource {
    pub fn new(nvidia_smi: bool) -> Self {
        Self {
            system: System::new(),
            nvidia_smi,
            probes: HashMap::new(),
            smi_rows: Vec::new(),
            cpu_sampled_at: None,
            networks_refreshed_at: None,
            network_interval_secs: 0.0,
        }
    }

    fn register(
        &mut self,
        hardware: &mut Vec<HardwareNode>,
        mut node: HardwareNode,
        channels: Vec<(String, Probe)>,
    ) {
        let mut probes = Vec::with_capacity(channels.len());
        for (name, probe) in channels {
            node.sensors.push(Sensor::new(name));
            probes.push(probe);
        }
        self.probes.insert(node.identifier.clone(), probes);
        hardware.push(node);
    }

    fn cpu_node(&self) -> (HardwareNode, Vec<(String, Probe)>) {
        let brand = self
            .system
            .cpus()
            .first()
            .map(|c| c.brand().trim().to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| "Generic CPU".to_string());
        let node = HardwareNode::new("/cpu/0", brand, HardwareType::Cpu);

        let mut channels = cpu_channels(self.system.cpus().len());
        for label in self.component_labels(ComponentClass::Cpu) {
            channels.push((label.clone(), Probe::Temperature(label)));
        }
        (node, channels)
    }

    fn memory_node(&self) -> (HardwareNode, Vec<(String, Probe)>) {
        let node = HardwareNode::new("/ram", "Generic Memory", HardwareType::Memory);
        let channels = vec![
            ("Memory Used".to_string(), Probe::MemoryUsed),
            ("Memory Available".to_string(), Probe::MemoryAvailable),
            ("Memory".to_string(), Probe::MemoryLoad),
            ("Virtual Memory Used".to_string(), Probe::SwapUsed),
            ("Virtual Memory Available".to_string(), Probe::SwapAvailable),
            ("Virtual Memory".to_string(), Probe::SwapLoad),
        ];
        (node, channels)
    }

    fn disk_nodes(&self) -> Vec<(HardwareNode, Vec<(String, Probe)>)> {
        self.system
            .disks()
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let mount = d.mount_point().to_path_buf();
                let device = d.name().to_string_lossy().to_string();
                let name = if device.is_empty() {
                    mount.display().to_string()
                } else {
                    format!("{device} ({})", mount.display())
                };
                let node = HardwareNode::new(format!("/disk/{i}"), name, HardwareType::Storage);
                let channels = vec![
                    ("Used Space".to_string(), Probe::DiskUsedPercent(mount.clone())),
                    ("Free Space".to_string(), Probe::DiskFree(mount.clone())),
                    ("Total Space".to_string(), Probe::DiskTotal(mount)),
                ];
                (node, channels)
            })
            .collect()
    }

    fn network_nodes(&self) -> Vec<(HardwareNode, Vec<(String, Probe)>)> {
        let mut ifaces: Vec<String> = self
            .system
            .networks()
            .iter()
            .map(|(iface, _)| iface.to_string())
            .collect();
        ifaces.sort();

        ifaces
            .into_iter()
            .map(|iface| {
                let node = HardwareNode::new(
                    format!("/nic/{iface}"),
                    iface.clone(),
                    HardwareType::Network,
                );
                let channels = vec![
                    ("Data Uploaded".to_string(), Probe::NetUploaded(iface.clone())),
                    ("Data Downloaded".to_string(), Probe::NetDownloaded(iface.clone())),
                    ("Upload Speed".to_string(), Probe::NetUploadSpeed(iface.clone())),
                    ("Download Speed".to_string(), Probe::NetDownloadSpeed(iface)),
                ];
                (node, channels)
            })
            .collect()
    }

    fn gpu_nodes(&self) -> Vec<(HardwareNode, Vec<(String, Probe)>)> {
        if self.nvidia_smi {
            let rows = nvidia::query();
            if !rows.is_empty() {
                return rows.into_iter().map(smi_node).collect();
            }
            debug!("nvidia-smi reported no GPUs, falling back to temperature components");
        }

        let mut by_type: Vec<(HardwareType, Vec<String>)> = Vec::new();
        for c in self.system.components() {
            let label = c.label().to_string();
            let ComponentClass::Gpu(kind) = classify_component(&label) else {
                continue;
            };
            match by_type.iter_mut().find(|(t, _)| *t == kind) {
                Some((_, labels)) => labels.push(label),
                None => by_type.push((kind, vec![label])),
            }
        }

        by_type
            .into_iter()
            .map(|(kind, labels)| {
                let slug = kind.as_str().to_ascii_lowercase().replace("gpu", "gpu-");
                let node = HardwareNode::new(format!("/{slug}/0"), kind.as_str(), kind);
                let channels = labels
                    .into_iter()
                    .map(|l| (l.clone(), Probe::Temperature(l)))
                    .collect();
                (node, channels)
            })
            .collect()
    }

    fn board_node(&self) -> (HardwareNode, Vec<(String, Probe)>) {
        let node = HardwareNode::new("/motherboard", board_name(), HardwareType::Motherboard);
        let channels = self
            .component_labels(ComponentClass::Board)
            .into_iter()
            .map(|l| (l.clone(), Probe::Temperature(l)))
            .collect();
        (node, channels)
    }

    fn component_labels(&self, class: ComponentClass) -> Vec<String> {
        self.system
            .components()
            .iter()
            .map(|c| c.label().to_string())
            .filter(|l| classify_component(l) == class)
            .collect()
    }

    fn read(&self, probe: &Probe) -> Option<f32> {
        let sys = &self.system;
        match probe {
            Probe::CpuTotalLoad => Some(sys.global_cpu_info().cpu_usage()),
            Probe::CpuCoreLoad(i) => sys.cpus().get(*i).map(|c| c.cpu_usage()),
            Probe::CpuCoreClock(i) => sys.cpus().get(*i).map(|c| c.frequency() as f32),
            Probe::MemoryUsed => Some(sys.used_memory() as f32 / BYTES_PER_GB),
            Probe::MemoryAvailable => Some(sys.available_memory() as f32 / BYTES_PER_GB),
            Probe::MemoryLoad => percent(sys.used_memory(), sys.total_memory()),
            Probe::SwapUsed => Some(sys.used_swap() as f32 / BYTES_PER_GB),
            Probe::SwapAvailable => Some(sys.free_swap() as f32 / BYTES_PER_GB),
            Probe::SwapLoad => percent(sys.used_swap(), sys.total_swap()),
            Probe::DiskUsedPercent(mount) => {
                let d = sys.disks().iter().find(|d| d.mount_point() == mount.as_path())?;
                let total = d.total_space();
                percent(total.saturating_sub(d.available_space()), total)
            }
            Probe::DiskFree(mount) => sys
                .disks()
                .iter()
                .find(|d| d.mount_point() == mount.as_path())
                .map(|d| d.available_space() as f32 / BYTES_PER_GB),
            Probe::DiskTotal(mount) => sys
                .disks()
                .iter()
                .find(|d| d.mount_point() == mount.as_path())
                .map(|d| d.total_space() as f32 / BYTES_PER_GB),
            Probe::NetUploaded(iface) => {
                self.network(iface).map(|n| n.total_transmitted() as f32 / BYTES_PER_GB)
            }
            Probe::NetDownloaded(iface) => {
                self.network(iface).map(|n| n.total_received() as f32 / BYTES_PER_GB)
            }
            Probe::NetUploadSpeed(iface) => {
                let n = self.network(iface)?;
                self.per_second(n.transmitted())
            }
            Probe::NetDownloadSpeed(iface) => {
                let n = self.network(iface)?;
                self.per_second(n.received())
            }
            Probe::Temperature(label) => sys
                .components()
                .iter()
                .find(|c| c.label() == label)
                .map(|c| c.temperature()),
            Probe::Smi(index, field) => self
                .smi_rows
                .iter()
                .find(|r| &r.index == index)
                .and_then(|r| r.field(*field)),
        }
    }

    fn network(&self, iface: &str) -> Option<&sysinfo::NetworkData> {
        self.system
            .networks()
            .iter()
            .find(|(name, _)| name.as_str() == iface)
            .map(|(_, data)| data)
    }

    fn per_second(&self, bytes: u64) -> Option<f32> {
        if self.network_interval_secs <= 0.0 {
            return None;
        }
        Some(bytes as f32 / self.network_interval_secs)
    }

    fn refresh_networks(&mut self) {
        let now = Instant::now();
        self.network_interval_secs = self
            .networks_refreshed_at
            .map(|t| now.duration_since(t).as_secs_f32())
            .unwrap_or(0.0);
        self.networks_refreshed_at = Some(now);
        self.system.refresh_networks();
    }

    fn refresh_cpu(&mut self) {
        let wait = remaining_cpu_wait(self.cpu_sampled_at, Instant::now());
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        self.system.refresh_cpu();
        self.cpu_sampled_at = Some(Instant::now());
    }
}

impl SensorSource for SysinfoSource {
    fn name(&self) -> &'static str {
        "sysinfo"
    }

    fn open(&mut self, capabilities: &Capabilities) -> Result<Vec<HardwareNode>> {
        if !System::IS_SUPPORTED {
            return Err(BridgeError::BackendUnavailable(format!(
                "sysinfo does not support {}",
                std::env::consts::OS
            )));
        }

        self.probes.clear();
        self.system.refresh_cpu();
        self.cpu_sampled_at = Some(Instant::now());
        self.system.refresh_components_list();

        let mut hardware = Vec::new();
        if capabilities.cpu {
            let (node, channels) = self.cpu_node();
            self.register(&mut hardware, node, channels);
        }
        if capabilities.gpu {
            for (node, channels) in self.gpu_nodes() {
                self.register(&mut hardware, node, channels);
            }
        }
        if capabilities.memory {
            self.system.refresh_memory();
            let (node, channels) = self.memory_node();
            self.register(&mut hardware, node, channels);
        }
        if capabilities.motherboard {
            let (node, channels) = self.board_node();
            self.register(&mut hardware, node, channels);
        }
        if capabilities.storage {
            self.system.refresh_disks_list();
            for (node, channels) in self.disk_nodes() {
                self.register(&mut hardware, node, channels);
            }
        }
        if capabilities.network {
            self.system.refresh_networks_list();
            for (node, channels) in self.network_nodes() {
                self.register(&mut hardware, node, channels);
            }
        }
        if capabilities.controller {
            debug!("controller enumeration has no sysinfo source");
        }

        debug!(hardware = hardware.len(), "sysinfo backend opened");
        Ok(hardware)
    }

    /// Networks and `nvidia-smi` are read once per walk, so every NIC shares
    /// one speed interval and every GPU one query.
    fn begin_refresh(&mut self) {
        let probes = || self.probes.values().flatten();
        let networks = probes().any(Probe::needs_networks);
        let smi = probes().any(|p| matches!(p, Probe::Smi(..)));

        if networks {
            self.refresh_networks();
        }
        self.smi_rows = if smi { nvidia::query() } else { Vec::new() };
    }

    fn update(&mut self, node: &mut HardwareNode) {
        let Some(probes) = self.probes.get(&node.identifier).cloned() else {
            debug!(hardware = %node.identifier, "no probes registered");
            return;
        };

        match node.hardware_type {
            HardwareType::Cpu => {
                self.refresh_cpu();
                self.system.refresh_components();
            }
            HardwareType::Memory => self.system.refresh_memory(),
            HardwareType::Storage => self.system.refresh_disks(),
            HardwareType::Network => {}
            _ => self.system.refresh_components(),
        }

        for (sensor, probe) in node.sensors.iter_mut().zip(probes.iter()) {
            sensor.value = self.read(probe);
        }
    }

    fn close(&mut self) {
        self.probes.clear();
        self.smi_rows.clear();
        self.cpu_sampled_at = None;
        self.networks_refreshed_at = None;
    }
}

fn smi_node(row: SmiRow) -> (HardwareNode, Vec<(String, Probe)>) {
    let node = HardwareNode::new(
        format!("/gpu-nvidia/{}", row.index),
        row.name.clone(),
        HardwareType::GpuNvidia,
    );
    let idx = row.index;
    let channels = vec![
        ("GPU Core".to_string(), Probe::Smi(idx.clone(), SmiField::Temperature)),
        ("GPU Core Load".to_string(), Probe::Smi(idx.clone(), SmiField::Utilization)),
        ("GPU Memory Used".to_string(), Probe::Smi(idx.clone(), SmiField::MemoryUsed)),
        ("GPU Memory Total".to_string(), Probe::Smi(idx.clone(), SmiField::MemoryTotal)),
        ("GPU Package".to_string(), Probe::Smi(idx, SmiField::Power)),
    ];
    (node, channels)
}

fn cpu_channels(cores: usize) -> Vec<(String, Probe)> {
    let mut channels = vec![("CPU Total".to_string(), Probe::CpuTotalLoad)];
    for i in 0..cores {
        channels.push((format!("CPU Core #{}", i + 1), Probe::CpuCoreLoad(i)));
    }
    for i in 0..cores {
        channels.push((format!("CPU Core #{} Clock", i + 1), Probe::CpuCoreClock(i)));
    }
    channels
}

fn remaining_cpu_wait(sampled_at: Option<Instant>, now: Instant) -> Duration {
    sampled_at
        .map(|t| CPU_SAMPLE_INTERVAL.saturating_sub(now.saturating_duration_since(t)))
        .unwrap_or_default()
}

fn percent(used: u64, total: u64) -> Option<f32> {
    if total == 0 {
        return None;
    }
    Some(used as f32 / total as f32 * 100.0)
}

fn classify_component(label: &str) -> ComponentClass {
    let s = label.to_ascii_lowercase();
    if s.contains("nvidia") {
        return ComponentClass::Gpu(HardwareType::GpuNvidia);
    }
    if s.contains("i915") || s.starts_with("xe ") {
        return ComponentClass::Gpu(HardwareType::GpuIntel);
    }
    if ["amdgpu", "radeon", "gpu"].iter().any(|m| s.contains(m)) {
        return ComponentClass::Gpu(HardwareType::GpuAmd);
    }

    let cpu_markers = ["coretemp", "k10temp", "cpu", "package", "tctl", "tdie", "core "];
    if cpu_markers.iter().any(|m| s.contains(m)) {
        return ComponentClass::Cpu;
    }
    ComponentClass::Board
}

#[cfg(target_os = "linux")]
fn board_name() -> String {
    fs::read_to_string("/sys/class/dmi/id/board_name")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Motherboard".to_string())
}

#[cfg(not(target_os = "linux"))]
fn board_name() -> String {
    "Motherboard".to_string()
}
