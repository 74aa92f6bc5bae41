use crate::config::LogConfig;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "HWINFO_BRIDGE_LOG";

/// Installs a stderr subscriber unless the host process already has one.
pub fn init(cfg: &LogConfig) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(&cfg.filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
