//! `serialport`-backed driver.
//!
//! Each open port gets a reader thread that turns incoming bytes into
//! `data` events and notices when the device disappears.

use super::error::PortError;
use super::event::{EventSink, PortEvent};
use super::traits::{DriverPort, PortInfo, PortOptions, SerialDriver, SetOptions, UpdateOptions};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

const READ_BUFFER_SIZE: usize = 1024;

/// The system serial driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDriver;

impl SerialDriver for SystemDriver {
    fn list(&self) -> Result<Vec<PortInfo>, PortError> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(PortInfo::from).collect())
    }

    fn open(
        &self,
        path: &str,
        options: &PortOptions,
        events: EventSink,
    ) -> Result<Box<dyn DriverPort>, PortError> {
        Ok(Box::new(SyncSerialPort::open(path, options, events)?))
    }
}

/// Flags shared between a port and its reader thread.
#[derive(Debug, Default)]
struct ReaderFlags {
    open: AtomicBool,
    paused: AtomicBool,
}

/// Synchronous serial port wrapping `serialport::SerialPort`.
pub struct SyncSerialPort {
    /// `None` once closed; dropping it releases the OS handle.
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    flags: Arc<ReaderFlags>,
    events: EventSink,
    reader: Option<JoinHandle<()>>,
}

impl SyncSerialPort {
    /// Open a serial port and start its reader thread.
    ///
    /// # Example
    /// ```no_run
    /// use sugo_serialport::port::{event, PortOptions, SyncSerialPort};
    ///
    /// let (sink, _source) = event::channel();
    /// let port = SyncSerialPort::open("/dev/ttyUSB0", &PortOptions::default(), sink)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(port_name: &str, options: &PortOptions, events: EventSink) -> Result<Self, PortError> {
        let port = serialport::new(port_name, options.baud_rate)
            .data_bits(options.data_bits.into())
            .flow_control(options.flow_control.into())
            .parity(options.parity.into())
            .stop_bits(options.stop_bits.into())
            .timeout(options.read_timeout())
            .open()
            .map_err(|e| PortError::from_open(port_name, e))?;

        let reader_port = port.try_clone()?;
        let flags = Arc::new(ReaderFlags::default());
        flags.open.store(true, Ordering::SeqCst);

        // `open` must precede any `data` from the reader.
        let _ = events.send(PortEvent::Open);

        let reader = {
            let flags = Arc::clone(&flags);
            let events = events.clone();
            let name = port_name.to_string();
            std::thread::Builder::new()
                .name(format!("serial-reader {port_name}"))
                .spawn(move || read_loop(reader_port, flags, events, name))?
        };

        Ok(Self {
            port: Some(port),
            name: port_name.to_string(),
            flags,
            events,
            reader: Some(reader),
        })
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>, PortError> {
        match self.port.as_mut() {
            Some(port) if self.flags.open.load(Ordering::SeqCst) => Ok(port),
            _ => Err(PortError::NotOpen),
        }
    }
}

fn read_loop(
    mut port: Box<dyn serialport::SerialPort>,
    flags: Arc<ReaderFlags>,
    events: EventSink,
    name: String,
) {
    let poll = port.timeout();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    while flags.open.load(Ordering::SeqCst) {
        if flags.paused.load(Ordering::SeqCst) {
            std::thread::sleep(poll);
            continue;
        }

        match port.read(&mut buffer) {
            Ok(0) => {}
            Ok(n) => {
                let _ = events.send(PortEvent::Data(buffer[..n].to_vec()));
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::Interrupted
                ) => {}
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::InvalidData | std::io::ErrorKind::InvalidInput
                ) =>
            {
                // Framing and parity faults leave the device usable.
                let _ = events.send(PortEvent::Error(e.to_string()));
            }
            Err(e) => {
                if flags.open.swap(false, Ordering::SeqCst) {
                    warn!(port = %name, error = %e, "serial device disconnected");
                    let _ = events.send(PortEvent::Disconnect(e.to_string()));
                    let _ = events.send(PortEvent::Close);
                }
                break;
            }
        }
    }
    debug!(port = %name, "reader thread finished");
}

impl DriverPort for SyncSerialPort {
    fn is_open(&self) -> bool {
        self.port.is_some() && self.flags.open.load(Ordering::SeqCst)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), PortError> {
        self.port_mut()?
            .clear(serialport::ClearBuffer::All)
            .map_err(PortError::Serial)
    }

    fn drain(&mut self) -> Result<(), PortError> {
        self.port_mut()?.flush().map_err(PortError::Io)
    }

    fn pause(&mut self) -> Result<(), PortError> {
        self.port_mut()?;
        self.flags.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&mut self) -> Result<(), PortError> {
        self.port_mut()?;
        self.flags.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set(&mut self, options: &SetOptions) -> Result<(), PortError> {
        let port = self.port_mut()?;
        if let Some(rts) = options.rts {
            port.write_request_to_send(rts)?;
        }
        if let Some(dtr) = options.dtr {
            port.write_data_terminal_ready(dtr)?;
        }
        match options.brk {
            Some(true) => port.set_break()?,
            Some(false) => port.clear_break()?,
            None => {}
        }
        if options.cts.is_some() || options.dsr.is_some() {
            debug!(port = %self.name, "cts/dsr are input lines and cannot be set");
        }
        Ok(())
    }

    fn update(&mut self, options: &UpdateOptions) -> Result<(), PortError> {
        self.port_mut()?
            .set_baud_rate(options.baud_rate)
            .map_err(PortError::Serial)
    }

    fn close(&mut self) -> Result<(), PortError> {
        if !self.flags.open.swap(false, Ordering::SeqCst) {
            return Err(PortError::NotOpen);
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        self.port = None;
        let _ = self.events.send(PortEvent::Close);
        Ok(())
    }
}

impl Drop for SyncSerialPort {
    fn drop(&mut self) {
        self.flags.open.store(false, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .field(
                "baud_rate",
                &self.port.as_ref().and_then(|p| p.baud_rate().ok()),
            )
            .finish()
    }
}
