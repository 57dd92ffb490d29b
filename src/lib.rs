//! Serial port adapter for SUGO actors.
//!
//! Wraps a serial driver behind the actor module contract: a static `$spec`
//! capability descriptor, one method per driver operation, `ping`/`assert`,
//! and the driver's events relayed onto the adapter's own event surface.
//!
//! # Modules
//!
//! - `actor`: The adapter itself and its dynamic `invoke` dispatcher
//! - `spec`: The `$spec` descriptor and its validation
//! - `service`: Connection slot, blocking-call adaptation, event relay, idle timer
//! - `port`: Driver traits, the `serialport`-backed driver and a mock driver
//! - `host`: `ping` and the required-command check behind `assert`
//! - `config`: Configuration management with TOML support
//! - `error`: Unified error handling
//! - `stdio`: Newline-delimited JSON pipe
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sugo_serialport::config::Config;
//! use sugo_serialport::port::MockDriver;
//! use sugo_serialport::SerialPortActor;
//!
//! # async fn demo() -> Result<(), sugo_serialport::ServiceError> {
//! let driver = MockDriver::new();
//! let actor = SerialPortActor::new(Arc::new(driver.clone()), &Config::default());
//! let mut events = actor.subscribe();
//!
//! actor.connect(Some("MOCK0".into()), None).await?;
//! actor.write("AT\r\n").await?;
//! driver.inject_data(b"OK\r\n");
//! # let _ = events.recv().await;
//! actor.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod config;
pub mod error;
pub mod host;
pub mod port;
pub mod service;
pub mod spec;
pub mod stdio;

// Re-export commonly used types for convenience
pub use actor::{SerialPortActor, Variant, WriteData};
pub use error::{AppError, AppResult};
pub use host::HostRequirements;
pub use port::{
    PortError, PortEvent, PortInfo, PortOptions, SerialDriver, SetOptions, UpdateOptions,
};
pub use service::{IdleTimeout, PortService, ServiceError, ServiceOptions, ServiceResult};
pub use spec::{ModuleSpec, SpecError};

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
