//! Core traits for the serial driver seam.
//!
//! `SerialDriver` enumerates and opens ports; `DriverPort` is one open port.
//! Both the `serialport`-backed driver and the in-memory mock implement them,
//! so the adapter never knows which one it is talking to.

use super::error::PortError;
use super::event::EventSink;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options passed to the driver when opening a port.
///
/// Field names follow the camelCase keys remote callers send. Unknown keys
/// are ignored so callers may pass options meant for other drivers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PortOptions {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits (5, 6, 7, or 8).
    pub data_bits: DataBits,

    /// Flow control mode.
    pub flow_control: FlowControl,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of stop bits (1 or 2).
    pub stop_bits: StopBits,

    /// How long the reader blocks before checking for pause or close.
    /// Values below `MIN_READ_TIMEOUT_MS` are raised to it.
    pub read_timeout_ms: u64,
}

impl Default for PortOptions {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            read_timeout_ms: 100,
        }
    }
}

/// Floor for the reader's poll interval, so a zero timeout cannot spin.
pub const MIN_READ_TIMEOUT_MS: u64 = 10;

impl PortOptions {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(MIN_READ_TIMEOUT_MS))
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(format!("invalid dataBits {other}: expected 5, 6, 7 or 8")),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Software,
    Hardware,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    One,
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(format!("invalid stopBits {other}: expected 1 or 2")),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        }
    }
}

/// Control line flags for `set`. Absent flags are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetOptions {
    pub brk: Option<bool>,
    pub cts: Option<bool>,
    pub dsr: Option<bool>,
    pub dtr: Option<bool>,
    pub rts: Option<bool>,
}

/// Settings `update` may change on an open port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOptions {
    pub baud_rate: u32,
}

/// One entry of a port listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortInfo {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnp_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

impl From<serialport::SerialPortInfo> for PortInfo {
    fn from(info: serialport::SerialPortInfo) -> Self {
        let mut entry = PortInfo {
            path: info.port_name,
            ..Default::default()
        };
        match info.port_type {
            serialport::SerialPortType::UsbPort(usb) => {
                entry.vendor_id = Some(format!("{:04x}", usb.vid));
                entry.product_id = Some(format!("{:04x}", usb.pid));
                entry.manufacturer = usb.manufacturer;
                entry.serial_number = usb.serial_number;
            }
            serialport::SerialPortType::PciPort => {
                entry.pnp_id = Some("pci".to_string());
            }
            serialport::SerialPortType::BluetoothPort => {
                entry.pnp_id = Some("bluetooth".to_string());
            }
            serialport::SerialPortType::Unknown => {}
        }
        entry
    }
}

/// A serial driver: the thing that enumerates and opens ports.
#[cfg_attr(test, mockall::automock)]
pub trait SerialDriver: Send + Sync {
    /// Enumerate the ports present on this machine.
    fn list(&self) -> Result<Vec<PortInfo>, PortError>;

    /// Open `path` with `options`.
    ///
    /// On success the driver owns `events` and must emit `PortEvent::Open`
    /// (or `PortEvent::Error` if opening fails after this call returns),
    /// followed by any `data`, `error`, `disconnect` and `close` events.
    fn open(
        &self,
        path: &str,
        options: &PortOptions,
        events: EventSink,
    ) -> Result<Box<dyn DriverPort>, PortError>;
}

/// One open driver port.
///
/// Every call is blocking; the adapter runs them on tokio's blocking pool.
pub trait DriverPort: Send + std::fmt::Debug {
    /// Whether the driver still considers the port open.
    fn is_open(&self) -> bool;

    /// Write bytes to the port. Returns the number of bytes written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Discard unread input and unsent output.
    fn flush(&mut self) -> Result<(), PortError>;

    /// Block until all pending output has been transmitted.
    fn drain(&mut self) -> Result<(), PortError>;

    /// Stop emitting `data` events until `resume`.
    fn pause(&mut self) -> Result<(), PortError>;

    /// Start emitting `data` events again.
    fn resume(&mut self) -> Result<(), PortError>;

    /// Set control line flags.
    fn set(&mut self, options: &SetOptions) -> Result<(), PortError>;

    /// Change settings of the open port.
    fn update(&mut self, options: &UpdateOptions) -> Result<(), PortError>;

    /// Close the port. The driver emits `close` once closed.
    fn close(&mut self) -> Result<(), PortError>;
}
