use crate::hardware::{flatten, HardwareNode, HardwareType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const CONFIG_ENV: &str = "HWINFO_BRIDGE_CONFIG";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionPolicy,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub include_sensor_type: bool,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPolicy {
    /// Open once and keep the backend open until teardown.
    #[default]
    Persistent,
    /// Open and close the backend around every call.
    ///
    /// CPU load needs two samples, so every call waits out the CPU sample
    /// interval after opening. Network speeds have no previous sample and
    /// read as zero.
    Scoped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Capabilities {
    #[serde(default = "default_enabled")]
    pub cpu: bool,
    #[serde(default = "default_enabled")]
    pub gpu: bool,
    #[serde(default = "default_enabled")]
    pub memory: bool,
    #[serde(default = "default_enabled")]
    pub motherboard: bool,
    #[serde(default = "default_enabled")]
    pub controller: bool,
    #[serde(default = "default_enabled")]
    pub network: bool,
    #[serde(default = "default_enabled")]
    pub storage: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Sysinfo {
        #[serde(default = "default_enabled")]
        nvidia_smi: bool,
    },
    Fixture {
        #[serde(default)]
        hardware: Vec<HardwareNode>,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            cpu: true,
            gpu: true,
            memory: true,
            motherboard: true,
            controller: true,
            network: true,
            storage: true,
        }
    }
}

impl Capabilities {
    pub fn allows(&self, hardware_type: HardwareType) -> bool {
        match hardware_type {
            HardwareType::Cpu => self.cpu,
            HardwareType::GpuNvidia | HardwareType::GpuAmd | HardwareType::GpuIntel => self.gpu,
            HardwareType::Memory => self.memory,
            HardwareType::Motherboard | HardwareType::SuperIO => self.motherboard,
            HardwareType::Controller | HardwareType::EmbeddedController => self.controller,
            HardwareType::Storage => self.storage,
            HardwareType::Network => self.network,
            HardwareType::Psu | HardwareType::Battery => true,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Sysinfo { nvidia_smi: true }
    }
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Sysinfo { .. } => "sysinfo",
            BackendConfig::Fixture { .. } => "fixture",
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("config validation failed: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads the file named by `HWINFO_BRIDGE_CONFIG`, or defaults when unset.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::load_from_file(path.trim()),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log.filter.trim().is_empty() {
            return Err(ConfigError::Validation(
                "log.filter must not be empty".to_string(),
            ));
        }
        if let Err(err) = EnvFilter::try_new(&self.log.filter) {
            return Err(ConfigError::Validation(format!(
                "log.filter '{}' is not a valid filter: {err}",
                self.log.filter
            )));
        }

        if let BackendConfig::Fixture { hardware } = &self.backend {
            validate_fixture(hardware)?;
        }

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_fixture(hardware: &[HardwareNode]) -> Result<(), ConfigError> {
    let mut ids = HashSet::new();
    for node in flatten(hardware) {
        if node.identifier.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "fixture hardware '{}' identifier must not be empty",
                node.name
            )));
        }
        if !ids.insert(node.identifier.as_str()) {
            return Err(ConfigError::Validation(format!(
                "fixture hardware identifier '{}' must be unique",
                node.identifier
            )));
        }
    }
    Ok(())
}

const fn default_enabled() -> bool {
    true
}

fn default_log_filter() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn example_config_is_valid() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).unwrap();
        cfg.validate().expect("shipped example must validate");
        assert_eq!(cfg.session, SessionPolicy::Persistent);
        assert_eq!(cfg.capabilities, Capabilities::default());
    }

    #[test]
    fn empty_document_uses_defaults() {
        let cfg: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.session, SessionPolicy::Persistent);
        assert!(!cfg.include_sensor_type);
        assert_eq!(cfg.backend, BackendConfig::Sysinfo { nvidia_smi: true });
        assert_eq!(cfg.log.filter, "warn");
    }

    #[test]
    fn partial_capabilities_keep_other_flags_enabled() {
        let cfg: Config =
            serde_yaml::from_str("session: scoped\ncapabilities:\n  network: false\n").unwrap();
        assert_eq!(cfg.session, SessionPolicy::Scoped);
        assert!(!cfg.capabilities.network);
        assert!(cfg.capabilities.cpu);
        assert!(!cfg.capabilities.allows(HardwareType::Network));
        assert!(cfg.capabilities.allows(HardwareType::Psu));
    }

    #[test]
    fn fixture_backend_parses_nested_tree() {
        let yaml = r#"
backend:
  kind: fixture
  hardware:
    - identifier: /cpu/0
      name: Test CPU
      hardware_type: Cpu
      sensors:
        - name: Core Temp
          value: 55.0
        - name: Missing
    - identifier: /mb
      name: Board
      hardware_type: Motherboard
      sub_hardware:
        - identifier: /lpc/0
          name: SuperIO
          hardware_type: SuperIO
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        cfg.validate().unwrap();
        let BackendConfig::Fixture { hardware } = cfg.backend else {
            panic!("expected fixture backend");
        };
        assert_eq!(hardware.len(), 2);
        assert_eq!(hardware[0].sensors[0].value, Some(55.0));
        assert_eq!(hardware[0].sensors[1].value, None);
        assert_eq!(hardware[1].sub_hardware[0].hardware_type, HardwareType::SuperIO);
    }

    #[test]
    fn duplicate_fixture_identifiers_are_rejected() {
        let mut cfg = Config::default();
        let mut board = HardwareNode::new("/dup", "Board", HardwareType::Motherboard);
        board
            .sub_hardware
            .push(HardwareNode::new("/dup", "Child", HardwareType::SuperIO));
        cfg.backend = BackendConfig::Fixture {
            hardware: vec![board],
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn empty_log_filter_is_rejected() {
        let mut cfg = Config::default();
        cfg.log.filter = "  ".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn load_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "session: [not, a, policy]").unwrap();
        let err = Config::load_from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let err = Config::load_from_file("/nonexistent/hwinfo-bridge.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
