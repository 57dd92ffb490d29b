//! Events a driver port emits while it is open.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Channel end a driver publishes its port events into.
pub type EventSink = mpsc::UnboundedSender<PortEvent>;

/// Receiving end of a driver's event channel.
pub type EventSource = mpsc::UnboundedReceiver<PortEvent>;

/// A serial port event, named after the driver event it mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum PortEvent {
    /// The port finished opening.
    Open,
    /// Bytes arrived from the device.
    Data(Vec<u8>),
    /// The driver reported an error outside of any call.
    Error(String),
    /// The port was closed.
    Close,
    /// The device went away while the port was open.
    Disconnect(String),
}

impl PortEvent {
    /// Every event name a port can emit.
    pub const NAMES: [&'static str; 5] = ["open", "data", "error", "close", "disconnect"];

    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Data(_) => "data",
            Self::Error(_) => "error",
            Self::Close => "close",
            Self::Disconnect(_) => "disconnect",
        }
    }
}

/// Create a fresh driver event channel.
pub fn channel() -> (EventSink, EventSource) {
    mpsc::unbounded_channel()
}
