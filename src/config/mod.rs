//! Configuration for the serial port adapter.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `SUGO_SERIALPORT_CONFIG` environment variable (explicit path)
//! 2. `./sugo-serialport.toml` (current directory)
//! 3. `sugo-serialport.toml` in the platform config directory
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is `SUGO_SERIALPORT_<SECTION>_<KEY>`:
//! - `SUGO_SERIALPORT_ADAPTER_PATH=/dev/ttyUSB0`
//! - `SUGO_SERIALPORT_ADAPTER_TIMEOUT=30000` (or `Infinity`)
//! - `SUGO_SERIALPORT_HOST_REQUIRED_COMMANDS=stty,setserial`
//!
//! # Example
//!
//! ```toml
//! [adapter]
//! variant = "interface"
//! path = "/dev/ttyUSB0"
//! timeout = 30000
//!
//! [adapter.options]
//! baudRate = 115200
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{AdapterConfig, Config, HostConfig, LogFormat, LoggingConfig};
