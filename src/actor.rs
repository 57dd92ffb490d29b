//! The actor-facing adapter.
//!
//! `SerialPortActor` exposes exactly the methods its `$spec` declares. Typed
//! methods are available for in-process use; `invoke` is the dynamic entry
//! point a host pipe calls with a method name and JSON params.

use crate::config::{AdapterConfig, Config};
use crate::host::{self, HostRequirements};
use crate::port::{PortInfo, PortOptions, SerialDriver, SetOptions, SystemDriver, UpdateOptions};
use crate::service::{EventStream, PortService, ServiceError, ServiceResult};
use crate::spec::{MethodSpec, ModuleSpec};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Which flavor of the adapter contract to expose.
///
/// The two differ in the name of the open method (`connect` vs `open`) and in
/// whether the idle auto-close timer runs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Methods take a config object keyed by parameter name.
    #[default]
    Module,
    /// Methods take a positional array; idle ports auto-close.
    Interface,
}

impl Variant {
    /// Name of the method that opens a port.
    pub fn open_method(self) -> &'static str {
        match self {
            Self::Module => "connect",
            Self::Interface => "open",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module => f.write_str("module"),
            Self::Interface => f.write_str("interface"),
        }
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "module" => Ok(Self::Module),
            "interface" => Ok(Self::Interface),
            other => Err(format!("unknown variant '{other}': expected module or interface")),
        }
    }
}

/// Payload for `write`: text is sent as its UTF-8 bytes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WriteData {
    Text(String),
    Bytes(Vec<u8>),
    /// A buffer serialized as `{"type": "Buffer", "data": [...]}`.
    Buffer { data: Vec<u8> },
}

impl WriteData {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Bytes(bytes) | Self::Buffer { data: bytes } => bytes,
        }
    }
}

impl From<&str> for WriteData {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for WriteData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// A serial port adapter instance.
///
/// Cloning is cheap; clones share the connection slot and event surface.
#[derive(Debug, Clone)]
pub struct SerialPortActor {
    id: Uuid,
    variant: Variant,
    spec: Arc<ModuleSpec>,
    service: PortService,
    adapter: Arc<AdapterConfig>,
    requirements: HostRequirements,
}

impl SerialPortActor {
    pub fn new(driver: Arc<dyn SerialDriver>, config: &Config) -> Self {
        let variant = config.adapter.variant;
        let service = PortService::new(driver, config.adapter.service_options());
        let id = Uuid::new_v4();
        info!(%id, %variant, timeout = ?service.idle_timeout(), "serial port adapter created");

        Self {
            id,
            variant,
            spec: Arc::new(ModuleSpec::for_variant(variant)),
            service,
            adapter: Arc::new(config.adapter.clone()),
            requirements: HostRequirements::new(config.host.required_commands.iter().cloned()),
        }
    }

    /// An adapter over the machine's real serial ports.
    pub fn with_system_driver(config: &Config) -> Self {
        Self::new(Arc::new(SystemDriver), config)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// The `$spec` descriptor.
    pub fn spec(&self) -> &ModuleSpec {
        &self.spec
    }

    pub fn service(&self) -> &PortService {
        &self.service
    }

    pub fn subscribe(&self) -> broadcast::Receiver<crate::port::PortEvent> {
        self.service.subscribe()
    }

    pub fn events(&self) -> EventStream {
        self.service.events()
    }

    // ========== Typed Methods ==========

    pub async fn ping(&self, message: Option<String>) -> String {
        host::ping(message)
    }

    pub async fn assert(&self) -> ServiceResult<bool> {
        debug!(commands = ?self.requirements.commands(), "checking host requirements");
        self.requirements.check()?;
        Ok(true)
    }

    pub async fn list(&self) -> ServiceResult<Vec<PortInfo>> {
        self.service.list().await
    }

    /// `connect` (module) or `open` (interface). Missing arguments fall back
    /// to the configured path and options.
    pub async fn connect(&self, path: Option<String>, options: Option<PortOptions>) -> ServiceResult<()> {
        let method = self.variant.open_method();
        let path = path
            .or_else(|| self.adapter.path.clone())
            .ok_or_else(|| ServiceError::invalid_params(method, "no path given and none configured"))?;
        let options = options.unwrap_or_else(|| self.adapter.options.clone());
        self.service.connect(&path, options).await
    }

    pub async fn is_open(&self) -> ServiceResult<bool> {
        self.service.is_open().await
    }

    pub async fn write(&self, data: impl Into<WriteData>) -> ServiceResult<usize> {
        self.service.write(data.into().into_bytes()).await
    }

    pub async fn flush(&self) -> ServiceResult<()> {
        self.service.flush().await
    }

    pub async fn drain(&self) -> ServiceResult<()> {
        self.service.drain().await
    }

    pub async fn pause(&self) -> ServiceResult<()> {
        self.service.pause().await
    }

    pub async fn resume(&self) -> ServiceResult<()> {
        self.service.resume().await
    }

    pub async fn set(&self, options: SetOptions) -> ServiceResult<()> {
        self.service.set(options).await
    }

    pub async fn update(&self, options: UpdateOptions) -> ServiceResult<()> {
        self.service.update(options).await
    }

    pub async fn close(&self) -> ServiceResult<()> {
        self.service.close().await
    }

    // ========== Dynamic Dispatch ==========

    /// Call `method` with JSON `params`.
    ///
    /// `params` may be a positional array, an object keyed by parameter
    /// name, a bare object for a single-parameter method, or null. Only
    /// methods in `$spec` are callable.
    #[instrument(level = "debug", skip(self, params), fields(actor = %self.id))]
    pub async fn invoke(&self, method: &str, params: Value) -> ServiceResult<Value> {
        let spec = self
            .spec
            .method(method)
            .ok_or_else(|| ServiceError::UnknownMethod(method.to_string()))?;
        let args = Args::resolve(method, spec, params)?;
        debug!(method, "invoking");

        match method {
            "ping" => Ok(Value::String(self.ping(args.get(0)?).await)),
            "assert" => self.assert().await.map(Value::Bool),
            "list" => to_value(method, self.list().await?),
            "connect" | "open" => {
                self.connect(args.get(0)?, args.get(1)?).await?;
                Ok(Value::Null)
            }
            "isOpen" => self.is_open().await.map(Value::Bool),
            "write" => {
                let data: WriteData = args.require(0)?;
                Ok(json!(self.write(data).await?))
            }
            "flush" => self.flush().await.map(|_| Value::Null),
            "drain" => self.drain().await.map(|_| Value::Null),
            "pause" => self.pause().await.map(|_| Value::Null),
            "resume" => self.resume().await.map(|_| Value::Null),
            "set" => {
                let options = args.get(0)?.unwrap_or_default();
                self.set(options).await.map(|_| Value::Null)
            }
            "update" => {
                let options = args.require(0)?;
                self.update(options).await.map(|_| Value::Null)
            }
            "close" => self.close().await.map(|_| Value::Null),
            _ => Err(ServiceError::UnknownMethod(method.to_string())),
        }
    }
}

fn to_value<T: Serialize>(method: &str, value: T) -> ServiceResult<Value> {
    serde_json::to_value(value).map_err(|e| ServiceError::invalid_params(method, e.to_string()))
}

/// Call arguments in the method's positional order.
struct Args<'a> {
    method: &'a str,
    spec: &'a MethodSpec,
    values: Vec<Value>,
}

impl<'a> Args<'a> {
    fn resolve(method: &'a str, spec: &'a MethodSpec, params: Value) -> ServiceResult<Self> {
        let arity = spec.params.len();
        let values = match params {
            Value::Null => Vec::new(),
            Value::Array(values) => {
                if values.len() > arity {
                    return Err(ServiceError::invalid_params(
                        method,
                        format!("expected at most {arity} params, got {}", values.len()),
                    ));
                }
                values
            }
            Value::Object(mut map) => {
                let named = map
                    .keys()
                    .all(|key| spec.param_names().any(|name| name == key.as_str()));
                if named {
                    spec.param_names()
                        .map(|name| map.remove(name).unwrap_or(Value::Null))
                        .collect()
                } else if arity == 1 {
                    vec![Value::Object(map)]
                } else {
                    let unknown = map
                        .keys()
                        .find(|key| !spec.param_names().any(|name| name == key.as_str()))
                        .cloned()
                        .unwrap_or_default();
                    return Err(ServiceError::invalid_params(
                        method,
                        format!("unknown param '{unknown}'"),
                    ));
                }
            }
            scalar if arity >= 1 => vec![scalar],
            _ => {
                return Err(ServiceError::invalid_params(method, "takes no params"));
            }
        };
        Ok(Self { method, spec, values })
    }

    /// The argument at `index`, or `None` when absent or null.
    fn get<T: DeserializeOwned>(&self, index: usize) -> ServiceResult<Option<T>> {
        match self.values.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ServiceError::invalid_params(self.method, format!("{}: {e}", self.name(index)))),
        }
    }

    fn require<T: DeserializeOwned>(&self, index: usize) -> ServiceResult<T> {
        self.get(index)?.ok_or_else(|| {
            ServiceError::invalid_params(self.method, format!("missing '{}'", self.name(index)))
        })
    }

    fn name(&self, index: usize) -> &str {
        self.spec
            .params
            .get(index)
            .map(|p| p.name.as_str())
            .unwrap_or("param")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::MockDriver;

    fn actor(driver: &MockDriver, variant: Variant) -> SerialPortActor {
        let mut config = Config::default();
        config.adapter.variant = variant;
        config.adapter.path = Some("MOCK0".into());
        SerialPortActor::new(Arc::new(driver.clone()), &config)
    }

    #[test]
    fn test_variant_parse() {
        assert_eq!("Interface".parse::<Variant>(), Ok(Variant::Interface));
        assert!("actor".parse::<Variant>().is_err());
        assert_eq!(Variant::Module.to_string(), "module");
    }

    #[test]
    fn test_write_data_forms() {
        let text: WriteData = serde_json::from_value(json!("hi")).unwrap();
        let bytes: WriteData = serde_json::from_value(json!([104, 105])).unwrap();
        let buffer: WriteData = serde_json::from_value(json!({"type": "Buffer", "data": [104, 105]})).unwrap();
        assert_eq!(text.into_bytes(), b"hi");
        assert_eq!(bytes.into_bytes(), b"hi");
        assert_eq!(buffer.into_bytes(), b"hi");
    }

    #[tokio::test]
    async fn test_named_and_positional_params_agree() {
        let driver = MockDriver::new();
        let module = actor(&driver, Variant::Module);

        module
            .invoke("connect", json!({"path": "MOCK1", "options": {"baudRate": 19200}}))
            .await
            .unwrap();
        assert_eq!(module.service().connected_path().as_deref(), Some("MOCK1"));

        module.invoke("connect", json!(["MOCK2"])).await.unwrap();
        assert_eq!(module.service().connected_path().as_deref(), Some("MOCK2"));
    }

    #[tokio::test]
    async fn test_connect_falls_back_to_configured_path() {
        let driver = MockDriver::new();
        let interface = actor(&driver, Variant::Interface);

        interface.invoke("open", Value::Null).await.unwrap();
        assert_eq!(interface.service().connected_path().as_deref(), Some("MOCK0"));
    }

    #[tokio::test]
    async fn test_bare_options_object_for_single_param_method() {
        let driver = MockDriver::new();
        let module = actor(&driver, Variant::Module);
        module.connect(None, None).await.unwrap();

        module.invoke("set", json!({"rts": true, "dtr": false})).await.unwrap();
        assert_eq!(driver.lines().rts, Some(true));
        assert_eq!(driver.lines().dtr, Some(false));

        module.invoke("update", json!({"options": {"baudRate": 57600}})).await.unwrap();
        assert_eq!(driver.baud_rate(), Some(57600));
    }

    #[tokio::test]
    async fn test_invoke_results() {
        let driver = MockDriver::new();
        let module = actor(&driver, Variant::Module);
        module.connect(None, None).await.unwrap();

        assert_eq!(module.invoke("write", json!(["AT\r\n"])).await.unwrap(), json!(4));
        assert_eq!(module.invoke("isOpen", Value::Null).await.unwrap(), json!(true));
        assert_eq!(module.invoke("flush", json!([])).await.unwrap(), Value::Null);
        assert_eq!(module.invoke("close", Value::Null).await.unwrap(), Value::Null);
        assert_eq!(module.invoke("isOpen", Value::Null).await.unwrap(), json!(false));
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let driver = MockDriver::new();
        let module = actor(&driver, Variant::Module);

        let err = module.invoke("write", Value::Null).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParams { .. }));

        let err = module.invoke("flush", json!(["extra"])).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParams { .. }));

        let err = module.invoke("connect", json!({"path": "X", "speed": 9600})).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid params for 'connect': unknown param 'speed'");
    }

    #[tokio::test]
    async fn test_connect_without_any_path() {
        let driver = MockDriver::new();
        let module = SerialPortActor::new(Arc::new(driver.clone()), &Config::default());

        let err = module.invoke("connect", Value::Null).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidParams { ref method, .. } if method == "connect"));
        assert_eq!(driver.opened_count(), 0);
    }
}
