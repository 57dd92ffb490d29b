//! In-memory serial driver for testing.
//!
//! `MockDriver` hands out `MockPort`s that share state with the driver, so a
//! test can keep the driver handle and play the device side: inject data,
//! raise errors, pull the plug, and inspect what the adapter did.

use super::error::PortError;
use super::event::{EventSink, PortEvent};
use super::traits::{DriverPort, PortInfo, PortOptions, SerialDriver, SetOptions, UpdateOptions};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// How the mock driver answers `open`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OpenBehavior {
    /// Emit `open` right away.
    #[default]
    Immediate,
    /// Hold `open` until `complete_open` or `fail_pending_open` is called.
    Deferred,
    /// Fail the `open` call itself.
    Fail(String),
    /// Accept the call, then emit `error` instead of `open`.
    ErrorEvent(String),
}

#[derive(Debug)]
struct MockPortState {
    path: String,
    open: bool,
    paused: bool,
    held: Vec<Vec<u8>>,
    sink: Option<EventSink>,
    written: Vec<Vec<u8>>,
    lines: SetOptions,
    baud_rate: u32,
    failures: HashMap<String, String>,
}

impl MockPortState {
    fn send(&self, event: PortEvent) -> bool {
        self.sink
            .as_ref()
            .map(|sink| sink.send(event).is_ok())
            .unwrap_or(false)
    }
}

#[derive(Debug, Default)]
struct DriverState {
    ports: Vec<PortInfo>,
    list_error: Option<String>,
    open_behavior: OpenBehavior,
    calls: Vec<String>,
    current: Option<Arc<Mutex<MockPortState>>>,
    opened: usize,
}

/// Mock serial driver.
///
/// # Example
/// ```
/// use sugo_serialport::port::{event, DriverPort, MockDriver, PortEvent, PortOptions, SerialDriver};
///
/// let driver = MockDriver::new();
/// let (sink, mut source) = event::channel();
/// let mut port = driver.open("MOCK0", &PortOptions::default(), sink).unwrap();
/// assert_eq!(source.try_recv().unwrap(), PortEvent::Open);
///
/// driver.inject_data(b"OK\r\n");
/// assert_eq!(source.try_recv().unwrap(), PortEvent::Data(b"OK\r\n".to_vec()));
///
/// port.write_bytes(b"AT\r\n").unwrap();
/// assert_eq!(driver.written(), vec![b"AT\r\n".to_vec()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<DriverState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a driver whose `list` returns the given ports.
    pub fn with_ports(ports: Vec<PortInfo>) -> Self {
        let driver = Self::new();
        driver.state.lock().ports = ports;
        driver
    }

    /// Make `list` fail with the given message.
    pub fn fail_list(&self, message: impl Into<String>) {
        self.state.lock().list_error = Some(message.into());
    }

    pub fn set_open_behavior(&self, behavior: OpenBehavior) {
        self.state.lock().open_behavior = behavior;
    }

    fn current(&self) -> Option<Arc<Mutex<MockPortState>>> {
        self.state.lock().current.clone()
    }

    /// Emit `open` on a port opened with `OpenBehavior::Deferred`.
    pub fn complete_open(&self) -> bool {
        self.emit(PortEvent::Open)
    }

    /// Emit `error` on a port opened with `OpenBehavior::Deferred`.
    pub fn fail_pending_open(&self, message: impl Into<String>) -> bool {
        let Some(port) = self.current() else {
            return false;
        };
        let mut port = port.lock();
        port.open = false;
        port.send(PortEvent::Error(message.into()))
    }

    /// Emit a raw event on the most recently opened port.
    pub fn emit(&self, event: PortEvent) -> bool {
        self.current()
            .map(|port| port.lock().send(event))
            .unwrap_or(false)
    }

    /// Deliver bytes from the device. Held back while the port is paused.
    pub fn inject_data(&self, data: &[u8]) -> bool {
        let Some(port) = self.current() else {
            return false;
        };
        let mut port = port.lock();
        if !port.open {
            return false;
        }
        if port.paused {
            port.held.push(data.to_vec());
            return true;
        }
        port.send(PortEvent::Data(data.to_vec()))
    }

    /// Simulate the device being unplugged.
    pub fn disconnect(&self, reason: impl Into<String>) {
        if let Some(port) = self.current() {
            let mut port = port.lock();
            port.open = false;
            port.send(PortEvent::Disconnect(reason.into()));
            port.send(PortEvent::Close);
            port.sink = None;
        }
    }

    /// Make the next `op` call on the current port fail with `message`.
    pub fn fail_next(&self, op: &str, message: impl Into<String>) {
        if let Some(port) = self.current() {
            port.lock().failures.insert(op.to_string(), message.into());
        }
    }

    /// Every driver call made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == op).count()
    }

    /// How many ports have been opened.
    pub fn opened_count(&self) -> usize {
        self.state.lock().opened
    }

    /// Writes made on the current port.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.current()
            .map(|port| port.lock().written.clone())
            .unwrap_or_default()
    }

    pub fn lines(&self) -> SetOptions {
        self.current()
            .map(|port| port.lock().lines)
            .unwrap_or_default()
    }

    pub fn baud_rate(&self) -> Option<u32> {
        self.current().map(|port| port.lock().baud_rate)
    }

    pub fn is_paused(&self) -> bool {
        self.current().map(|port| port.lock().paused).unwrap_or(false)
    }

    pub fn port_is_open(&self) -> bool {
        self.current().map(|port| port.lock().open).unwrap_or(false)
    }

    fn record(&self, op: &str) {
        self.state.lock().calls.push(op.to_string());
    }
}

impl SerialDriver for MockDriver {
    fn list(&self) -> Result<Vec<PortInfo>, PortError> {
        self.record("list");
        let state = self.state.lock();
        match &state.list_error {
            Some(message) => Err(PortError::Io(std::io::Error::other(message.clone()))),
            None => Ok(state.ports.clone()),
        }
    }

    fn open(
        &self,
        path: &str,
        options: &PortOptions,
        events: EventSink,
    ) -> Result<Box<dyn DriverPort>, PortError> {
        self.record("open");
        let behavior = self.state.lock().open_behavior.clone();
        if let OpenBehavior::Fail(message) = behavior {
            return Err(PortError::not_found(message));
        }

        let open = !matches!(behavior, OpenBehavior::ErrorEvent(_));
        let port = Arc::new(Mutex::new(MockPortState {
            path: path.to_string(),
            open,
            paused: false,
            held: Vec::new(),
            sink: Some(events),
            written: Vec::new(),
            lines: SetOptions::default(),
            baud_rate: options.baud_rate,
            failures: HashMap::new(),
        }));

        match behavior {
            OpenBehavior::Immediate => {
                port.lock().send(PortEvent::Open);
            }
            OpenBehavior::ErrorEvent(message) => {
                port.lock().send(PortEvent::Error(message));
            }
            OpenBehavior::Deferred | OpenBehavior::Fail(_) => {}
        }

        {
            let mut state = self.state.lock();
            state.current = Some(Arc::clone(&port));
            state.opened += 1;
        }

        Ok(Box::new(MockPort {
            driver: self.clone(),
            state: port,
        }))
    }
}

/// A port handed out by `MockDriver`.
pub struct MockPort {
    driver: MockDriver,
    state: Arc<Mutex<MockPortState>>,
}

impl MockPort {
    /// Record the call, then apply any scripted failure or closed-port check.
    fn begin(&self, op: &str) -> Result<parking_lot::MutexGuard<'_, MockPortState>, PortError> {
        self.driver.record(op);
        let mut state = self.state.lock();
        if let Some(message) = state.failures.remove(op) {
            return Err(PortError::Io(std::io::Error::other(message)));
        }
        if !state.open {
            return Err(PortError::NotOpen);
        }
        Ok(state)
    }
}

impl DriverPort for MockPort {
    fn is_open(&self) -> bool {
        self.driver.record("isOpen");
        self.state.lock().open
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.begin("write")?;
        state.written.push(data.to_vec());
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), PortError> {
        let mut state = self.begin("flush")?;
        state.held.clear();
        Ok(())
    }

    fn drain(&mut self) -> Result<(), PortError> {
        self.begin("drain").map(|_| ())
    }

    fn pause(&mut self) -> Result<(), PortError> {
        let mut state = self.begin("pause")?;
        state.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), PortError> {
        let mut state = self.begin("resume")?;
        state.paused = false;
        for chunk in std::mem::take(&mut state.held) {
            state.send(PortEvent::Data(chunk));
        }
        Ok(())
    }

    fn set(&mut self, options: &SetOptions) -> Result<(), PortError> {
        let mut state = self.begin("set")?;
        let lines = &mut state.lines;
        for (slot, value) in [
            (&mut lines.brk, options.brk),
            (&mut lines.cts, options.cts),
            (&mut lines.dsr, options.dsr),
            (&mut lines.dtr, options.dtr),
            (&mut lines.rts, options.rts),
        ] {
            if value.is_some() {
                *slot = value;
            }
        }
        Ok(())
    }

    fn update(&mut self, options: &UpdateOptions) -> Result<(), PortError> {
        let mut state = self.begin("update")?;
        state.baud_rate = options.baud_rate;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PortError> {
        let mut state = self.begin("close")?;
        state.open = false;
        state.send(PortEvent::Close);
        state.sink = None;
        Ok(())
    }
}

impl std::fmt::Debug for MockPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockPort")
            .field("path", &state.path)
            .field("open", &state.open)
            .field("paused", &state.paused)
            .finish()
    }
}
