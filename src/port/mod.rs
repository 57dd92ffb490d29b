//! Serial driver layer.
//!
//! Defines the driver traits the adapter calls through, the events a driver
//! emits, and two drivers: the `serialport`-backed system driver and an
//! in-memory mock for tests.

pub mod error;
pub mod event;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use event::{EventSink, EventSource, PortEvent};
pub use mock::{MockDriver, MockPort, OpenBehavior};
pub use sync_port::{SyncSerialPort, SystemDriver};
pub use traits::*;
