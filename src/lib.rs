//! Filtered hardware sensor snapshots behind a C ABI.
//!
//! A host process calls `GetHardwareInfo` with a comma-separated list of
//! hardware types (`Cpu,Gpu,Memory`) and receives a compact JSON payload
//! keyed by hardware identifier, which it releases with `FreeResult`.

pub mod collectors;
pub mod config;
pub mod error;
pub mod ffi;
pub mod filter;
pub mod hardware;
pub mod logging;
pub mod monitor;
pub mod payload;
pub mod session;
pub mod snapshot;
pub mod walker;

pub use config::Config;
pub use error::{BridgeError, Result};
pub use ffi::{FreeResult, GetHardwareInfo, ShutdownHardwareInfo};
pub use monitor::{install, shutdown, Monitor};
