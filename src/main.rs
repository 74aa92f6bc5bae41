use clap::Parser;
use hwinfo_bridge::config::LogConfig;
use hwinfo_bridge::hardware::HardwareNode;
use hwinfo_bridge::{logging, Config, FreeResult, GetHardwareInfo, Monitor, ShutdownHardwareInfo};
use std::ffi::{CStr, CString};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "hwinfo-bridge")]
#[command(version)]
struct Cli {
    /// Config file; defaults to $HWINFO_BRIDGE_CONFIG or built-in defaults.
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    /// Print every hardware node instead of a payload.
    #[arg(long)]
    list: bool,
    /// Comma-separated hardware types, passed through GetHardwareInfo.
    #[arg(default_value = "Cpu,Gpu,Memory")]
    tokens: String,
}

fn main() {
    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let loaded = match &cli.config {
        Some(path) => Config::load_from_file(path),
        None => Config::load_from_env(),
    };
    let cfg = match loaded {
        Ok(cfg) => cfg,
        Err(err) => {
            logging::init(&LogConfig::default());
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };
    logging::init(&cfg.log);
    info!(session = ?cfg.session, backend = cfg.backend.kind(), "starting");

    let mut monitor = Monitor::new(cfg);
    if cli.list {
        match monitor.hardware() {
            Ok(hardware) => print_tree(&hardware, 0),
            Err(err) => {
                error!(error = %err, "failed to enumerate hardware");
                std::process::exit(2);
            }
        }
        return;
    }

    hwinfo_bridge::install(monitor);

    let input = match CString::new(cli.tokens) {
        Ok(input) => input,
        Err(err) => {
            error!(error = %err, "token list must not contain NUL bytes");
            std::process::exit(1);
        }
    };

    // SAFETY: `input` is a live NUL-terminated buffer for the whole call.
    let out = unsafe { GetHardwareInfo(input.as_ptr()) };
    if out.is_null() {
        error!("sensor backend unavailable");
        ShutdownHardwareInfo();
        std::process::exit(2);
    }

    // SAFETY: non-null results are NUL-terminated and owned by us until freed.
    let payload = unsafe { CStr::from_ptr(out) }.to_string_lossy().into_owned();
    // SAFETY: `out` came from GetHardwareInfo and is released exactly once.
    unsafe { FreeResult(out) };
    ShutdownHardwareInfo();

    println!("{payload}");
}

fn print_tree(hardware: &[HardwareNode], depth: usize) {
    for node in hardware {
        println!(
            "{:indent$}{}\t{}\t{} ({} sensors)",
            "",
            node.identifier,
            node.hardware_type,
            node.name,
            node.sensors.len(),
            indent = depth * 2
        );
        print_tree(&node.sub_hardware, depth + 1);
    }
}
