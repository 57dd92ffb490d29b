//! Service layer for serial port operations.
//!
//! `PortService` owns the adapter's single connection slot and turns each
//! blocking driver call into a future that settles exactly once. Calling
//! conventions (config object vs positional array) live one layer up in
//! `actor`; this layer only knows typed arguments.
//!
//! # Architecture
//!
//! ```text
//! SerialPortActor ──> PortService ──> slot: Option<Connection> ──> DriverPort
//!                          │                                           │
//!                          └── EventHub <── relay task <── EventSink ──┘
//! ```

pub mod relay;
pub mod timer;

use crate::port::{
    event, DriverPort, PortError, PortEvent, PortInfo, PortOptions, SerialDriver, SetOptions,
    UpdateOptions,
};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use relay::{EventHub, EventStream, DEFAULT_EVENT_BUFFER};
pub use timer::{IdleTimeout, IdleTimer};

// ========== Error Types ==========

/// Errors surfaced by adapter operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// An I/O operation was called before a successful connect.
    #[error("Port is not connected")]
    NotConnected,

    /// The driver rejected the call. The message is the driver's own.
    #[error(transparent)]
    Driver(#[from] PortError),

    /// The driver reported `error` before `open`.
    #[error("{0}")]
    OpenFailed(String),

    /// A required host command is missing from PATH.
    #[error("Required command not found: {0}")]
    MissingCommand(String),

    /// The method is not part of this adapter's spec.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// The params could not be decoded for the method.
    #[error("Invalid params for '{method}': {message}")]
    InvalidParams { method: String, message: String },

    /// The blocking task running a driver call panicked or was cancelled.
    #[error("Driver task failed: {0}")]
    Task(String),
}

impl ServiceError {
    pub fn invalid_params(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParams {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Stable error type name for remote callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConnected => "NotConnected",
            Self::Driver(_) => "DriverError",
            Self::OpenFailed(_) => "OpenFailed",
            Self::MissingCommand(_) => "MissingCommand",
            Self::UnknownMethod(_) => "UnknownMethod",
            Self::InvalidParams { .. } => "InvalidParams",
            Self::Task(_) => "TaskFailed",
        }
    }
}

/// Convenient Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

// ========== Service Implementation ==========

/// Settings fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    /// Auto-close after this long without a write. `Never` disables the timer.
    pub idle_timeout: IdleTimeout,
    /// Events buffered per subscriber.
    pub event_buffer: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            idle_timeout: IdleTimeout::Never,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

type PortHandle = Arc<Mutex<Box<dyn DriverPort>>>;

struct Connection {
    port: PortHandle,
    path: String,
    _relay: JoinHandle<()>,
}

struct Inner {
    driver: Arc<dyn SerialDriver>,
    slot: Mutex<Option<Connection>>,
    connecting: tokio::sync::Mutex<()>,
    events: EventHub,
    timer: IdleTimer,
}

/// Port service: one connection slot, one event hub, one idle timer.
///
/// Cloning is cheap and every clone drives the same connection.
#[derive(Clone)]
pub struct PortService {
    inner: Arc<Inner>,
}

impl PortService {
    pub fn new(driver: Arc<dyn SerialDriver>, options: ServiceOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                driver,
                slot: Mutex::new(None),
                connecting: tokio::sync::Mutex::new(()),
                events: EventHub::new(options.event_buffer),
                timer: IdleTimer::new(options.idle_timeout),
            }),
        }
    }

    /// Subscribe to port events. Only events emitted after this call are seen.
    pub fn subscribe(&self) -> broadcast::Receiver<PortEvent> {
        self.inner.events.subscribe()
    }

    /// Like `subscribe`, as a `Stream`.
    pub fn events(&self) -> EventStream {
        self.inner.events.stream()
    }

    /// Whether the slot holds a port. A closed port still occupies the slot.
    pub fn is_connected(&self) -> bool {
        self.inner.slot.lock().is_some()
    }

    pub fn connected_path(&self) -> Option<String> {
        self.inner.slot.lock().as_ref().map(|c| c.path.clone())
    }

    pub fn idle_timeout(&self) -> IdleTimeout {
        self.inner.timer.timeout()
    }

    pub fn idle_timer_armed(&self) -> bool {
        self.inner.timer.is_armed()
    }

    fn handle(&self) -> ServiceResult<PortHandle> {
        self.inner
            .slot
            .lock()
            .as_ref()
            .map(|c| Arc::clone(&c.port))
            .ok_or(ServiceError::NotConnected)
    }

    /// List the ports the driver can see.
    pub async fn list(&self) -> ServiceResult<Vec<PortInfo>> {
        let driver = Arc::clone(&self.inner.driver);
        let ports = blocking(move || driver.list()).await?;
        debug!(count = ports.len(), "listed serial ports");
        Ok(ports)
    }

    /// Open `path` and make it the current connection.
    ///
    /// Resolves when the driver emits `open`; fails if the driver's open call
    /// fails or it emits `error` first. Concurrent connects run one at a
    /// time, and a connect replacing an existing port closes that port first.
    pub async fn connect(&self, path: &str, options: PortOptions) -> ServiceResult<()> {
        let _serialized = self.inner.connecting.lock().await;

        let previous = self.inner.slot.lock().take();
        if let Some(previous) = previous {
            warn!(path = %previous.path, "replacing existing connection");
            self.inner.timer.cancel();
            if let Err(e) = close_if_open(previous.port).await {
                warn!(path = %previous.path, error = %e, "failed to close replaced port");
            }
        }

        let (sink, source) = event::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let relay = relay::spawn_relay(source, self.inner.events.clone(), ready_tx);

        let driver = Arc::clone(&self.inner.driver);
        let target = path.to_string();
        let port = blocking(move || driver.open(&target, &options, sink)).await?;

        let port: PortHandle = Arc::new(Mutex::new(port));
        *self.inner.slot.lock() = Some(Connection {
            port: Arc::clone(&port),
            path: path.to_string(),
            _relay: relay,
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                info!(
                    path,
                    subscribers = self.inner.events.subscriber_count(),
                    "serial port opened"
                );
                self.arm_idle_close(port);
                Ok(())
            }
            Ok(Err(message)) => {
                warn!(path, error = %message, "serial port failed to open");
                Err(ServiceError::OpenFailed(message))
            }
            Err(_) => Err(ServiceError::OpenFailed(format!(
                "{path}: driver closed before reporting open"
            ))),
        }
    }

    /// Whether the connected port is open, as the driver sees it.
    pub async fn is_open(&self) -> ServiceResult<bool> {
        self.with_port("isOpen", |port| Ok(port.is_open())).await
    }

    /// Write bytes. Re-arms the idle timer on success.
    pub async fn write(&self, data: Vec<u8>) -> ServiceResult<usize> {
        let port = self.handle()?;
        let written = self.call(Arc::clone(&port), "write", move |p| p.write_bytes(&data)).await?;
        self.arm_idle_close(port);
        Ok(written)
    }

    pub async fn flush(&self) -> ServiceResult<()> {
        self.with_port("flush", |port| port.flush()).await
    }

    pub async fn drain(&self) -> ServiceResult<()> {
        self.with_port("drain", |port| port.drain()).await
    }

    pub async fn pause(&self) -> ServiceResult<()> {
        self.with_port("pause", |port| port.pause()).await
    }

    pub async fn resume(&self) -> ServiceResult<()> {
        self.with_port("resume", |port| port.resume()).await
    }

    pub async fn set(&self, options: SetOptions) -> ServiceResult<()> {
        self.with_port("set", move |port| port.set(&options)).await
    }

    pub async fn update(&self, options: UpdateOptions) -> ServiceResult<()> {
        self.with_port("update", move |port| port.update(&options)).await
    }

    /// Close the connected port. The port stays in the slot.
    pub async fn close(&self) -> ServiceResult<()> {
        self.with_port("close", |port| port.close()).await?;
        self.inner.timer.cancel();
        info!(path = ?self.connected_path(), "serial port closed");
        Ok(())
    }

    async fn with_port<T, F>(&self, op: &'static str, f: F) -> ServiceResult<T>
    where
        F: FnOnce(&mut dyn DriverPort) -> Result<T, PortError> + Send + 'static,
        T: Send + 'static,
    {
        let port = self.handle()?;
        self.call(port, op, f).await
    }

    async fn call<T, F>(&self, port: PortHandle, op: &'static str, f: F) -> ServiceResult<T>
    where
        F: FnOnce(&mut dyn DriverPort) -> Result<T, PortError> + Send + 'static,
        T: Send + 'static,
    {
        debug!(op, "driver call");
        blocking(move || {
            let mut guard = port.lock();
            f(&mut **guard)
        })
        .await
        .map_err(|e| {
            debug!(op, error = %e, "driver call failed");
            e
        })
    }

    fn arm_idle_close(&self, port: PortHandle) {
        let armed = self.inner.timer.arm(async move {
            match close_if_open(port).await {
                Ok(true) => info!("idle timeout elapsed, serial port closed"),
                Ok(false) => debug!("idle timeout elapsed, port already closed"),
                Err(e) => warn!(error = %e, "idle auto-close failed"),
            }
        });
        if armed {
            debug!(timeout = ?self.inner.timer.timeout(), "idle timer armed");
        }
    }
}

impl std::fmt::Debug for PortService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortService")
            .field("connected_path", &self.connected_path())
            .field("idle_timeout", &self.idle_timeout())
            .finish()
    }
}

/// Run a blocking driver call on tokio's blocking pool.
async fn blocking<T, F>(f: F) -> ServiceResult<T>
where
    F: FnOnce() -> Result<T, PortError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Task(e.to_string()))?
        .map_err(ServiceError::from)
}

/// Close the port unless the driver already considers it closed.
async fn close_if_open(port: PortHandle) -> ServiceResult<bool> {
    blocking(move || {
        let mut port = port.lock();
        if port.is_open() {
            port.close().map(|_| true)
        } else {
            Ok(false)
        }
    })
    .await
}

// ========== Tests ==========

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{MockDriver, MockSerialDriver, OpenBehavior};
    use std::time::Duration;

    fn mock_service(driver: &MockDriver) -> PortService {
        PortService::new(Arc::new(driver.clone()), ServiceOptions::default())
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let driver = MockDriver::new();
        let service = mock_service(&driver);

        assert!(matches!(service.is_open().await, Err(ServiceError::NotConnected)));
        assert!(matches!(service.write(b"x".to_vec()).await, Err(ServiceError::NotConnected)));
        assert!(matches!(service.flush().await, Err(ServiceError::NotConnected)));
        assert!(matches!(service.drain().await, Err(ServiceError::NotConnected)));
        assert!(matches!(service.pause().await, Err(ServiceError::NotConnected)));
        assert!(matches!(service.resume().await, Err(ServiceError::NotConnected)));
        assert!(matches!(
            service.set(SetOptions::default()).await,
            Err(ServiceError::NotConnected)
        ));
        assert!(matches!(
            service.update(UpdateOptions { baud_rate: 9600 }).await,
            Err(ServiceError::NotConnected)
        ));
        assert!(matches!(service.close().await, Err(ServiceError::NotConnected)));
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_connect_write_close() {
        let driver = MockDriver::new();
        let service = mock_service(&driver);

        service.connect("MOCK0", PortOptions::default()).await.unwrap();
        assert_eq!(service.connected_path().as_deref(), Some("MOCK0"));
        assert!(service.is_open().await.unwrap());

        assert_eq!(service.write(b"AT\r\n".to_vec()).await.unwrap(), 4);
        assert_eq!(driver.written(), vec![b"AT\r\n".to_vec()]);

        service.close().await.unwrap();
        assert!(!service.is_open().await.unwrap());
        assert!(service.is_connected());
    }

    #[tokio::test]
    async fn test_driver_errors_propagate_verbatim() {
        let driver = MockDriver::new();
        let service = mock_service(&driver);
        service.connect("MOCK0", PortOptions::default()).await.unwrap();

        driver.fail_next("flush", "EBADF: bad file descriptor");
        let err = service.flush().await.unwrap_err();
        assert!(matches!(err, ServiceError::Driver(_)));
        assert_eq!(err.to_string(), "I/O error: EBADF: bad file descriptor");
    }

    #[tokio::test]
    async fn test_open_error_event_rejects_connect() {
        let driver = MockDriver::new();
        driver.set_open_behavior(OpenBehavior::ErrorEvent("Access denied".into()));
        let service = mock_service(&driver);

        let err = service.connect("MOCK0", PortOptions::default()).await.unwrap_err();
        assert!(matches!(err, ServiceError::OpenFailed(ref m) if m == "Access denied"));
    }

    #[tokio::test]
    async fn test_synchronous_open_failure_rejects_connect() {
        let mut driver = MockSerialDriver::new();
        driver
            .expect_open()
            .times(1)
            .returning(|path, _, _| Err(PortError::not_found(path)));
        let service = PortService::new(Arc::new(driver), ServiceOptions::default());

        let err = service.connect("/dev/ttyNOPE", PortOptions::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "Serial port not found: /dev/ttyNOPE");
        assert!(!service.is_connected());
    }

    #[tokio::test]
    async fn test_list_delegates_to_driver() {
        let mut driver = MockSerialDriver::new();
        driver.expect_list().times(1).returning(|| {
            Ok(vec![PortInfo {
                path: "COM3".into(),
                ..Default::default()
            }])
        });
        let service = PortService::new(Arc::new(driver), ServiceOptions::default());

        let ports = service.list().await.unwrap();
        assert_eq!(ports[0].path, "COM3");
    }

    #[tokio::test]
    async fn test_reconnect_closes_previous_port() {
        let driver = MockDriver::new();
        let service = mock_service(&driver);

        service.connect("MOCK0", PortOptions::default()).await.unwrap();
        service.connect("MOCK1", PortOptions::default()).await.unwrap();

        assert_eq!(driver.opened_count(), 2);
        assert_eq!(driver.call_count("close"), 1);
        assert_eq!(service.connected_path().as_deref(), Some("MOCK1"));
    }

    async fn wait_for_opens(driver: &MockDriver, count: usize) {
        for _ in 0..500 {
            if driver.opened_count() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("driver saw {} opens, expected {count}", driver.opened_count());
    }

    #[tokio::test]
    async fn test_concurrent_connects_run_one_at_a_time() {
        let driver = MockDriver::new();
        driver.set_open_behavior(OpenBehavior::Deferred);
        let service = mock_service(&driver);

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.connect("MOCK0", PortOptions::default()).await }
        });
        wait_for_opens(&driver, 1).await;

        let second = tokio::spawn({
            let service = service.clone();
            async move { service.connect("MOCK1", PortOptions::default()).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The second connect waits behind the first one's pending open.
        assert!(!first.is_finished());
        assert!(!second.is_finished());
        assert_eq!(driver.opened_count(), 1);
        assert_eq!(driver.call_count("close"), 0);

        assert!(driver.complete_open());
        first.await.unwrap().unwrap();

        wait_for_opens(&driver, 2).await;
        assert!(driver.complete_open());
        second.await.unwrap().unwrap();

        assert_eq!(driver.call_count("open"), 2);
        assert_eq!(driver.call_count("close"), 1);
        assert_eq!(service.connected_path().as_deref(), Some("MOCK1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_rearms_idle_timer() {
        let driver = MockDriver::new();
        let service = PortService::new(
            Arc::new(driver.clone()),
            ServiceOptions {
                idle_timeout: IdleTimeout::from_millis(100),
                ..Default::default()
            },
        );
        service.connect("MOCK0", PortOptions::default()).await.unwrap();
        assert!(service.idle_timer_armed());

        tokio::time::sleep(Duration::from_millis(80)).await;
        service.write(b"keepalive".to_vec()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(driver.port_is_open());

        tokio::time::sleep(Duration::from_millis(40)).await;
        // The close runs on the blocking pool; give it a moment.
        for _ in 0..50 {
            if !driver.port_is_open() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(!driver.port_is_open());
    }
}
