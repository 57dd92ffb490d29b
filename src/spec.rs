//! The `$spec` capability descriptor.
//!
//! Hosts read this to discover which methods an actor module exposes, what
//! they take and return, and which events it emits. Nothing here is enforced
//! at call time beyond method lookup; `validate` checks the descriptor itself.

use crate::actor::Variant;
use crate::port::PortEvent;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9]*(-[a-z0-9]+)*$").expect("valid regex"));
static VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(-[0-9A-Za-z.-]+)?$").expect("valid regex")
});
static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]*$").expect("valid regex"));

/// Type names a parameter, return value or error may declare.
const KNOWN_TYPES: &[&str] = &[
    "string", "number", "boolean", "object", "array", "Buffer", "null", "any", "Error",
];

/// The capability descriptor of one actor module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    pub version: String,
    pub desc: String,
    pub methods: BTreeMap<String, MethodSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub events: BTreeMap<String, EventSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSpec {
    pub desc: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    #[serde(rename = "return", default, skip_serializing_if = "Option::is_none")]
    pub returns: Option<TypeSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub throws: Vec<TypeSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub desc: String,
}

/// A typed description, used for both return values and thrown errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    pub desc: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSpec {
    pub desc: String,
}

/// Problems `ModuleSpec::validate` reports.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("invalid module name '{0}'")]
    InvalidName(String),
    #[error("invalid version '{0}': expected semver")]
    InvalidVersion(String),
    #[error("'{0}' is missing a description")]
    MissingDescription(String),
    #[error("invalid method name '{0}'")]
    InvalidMethodName(String),
    #[error("method '{method}' has invalid param '{param}'")]
    InvalidParam { method: String, param: String },
    #[error("'{location}' declares unknown type '{type_name}'")]
    UnknownType { location: String, type_name: String },
    #[error("module declares no methods")]
    NoMethods,
}

impl MethodSpec {
    fn new(desc: &str) -> Self {
        Self {
            desc: desc.to_string(),
            params: Vec::new(),
            returns: None,
            throws: Vec::new(),
        }
    }

    fn param(mut self, name: &str, type_name: &str, desc: &str) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            type_name: type_name.to_string(),
            desc: desc.to_string(),
        });
        self
    }

    fn returns(mut self, type_name: &str, desc: &str) -> Self {
        self.returns = Some(TypeSpec {
            type_name: type_name.to_string(),
            desc: desc.to_string(),
        });
        self
    }

    fn throws(mut self, type_name: &str, desc: &str) -> Self {
        self.throws.push(TypeSpec {
            type_name: type_name.to_string(),
            desc: desc.to_string(),
        });
        self
    }

    /// Parameter names in positional order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.name.as_str())
    }
}

impl ModuleSpec {
    /// The descriptor for the given adapter variant.
    pub fn for_variant(variant: Variant) -> Self {
        let mut methods = BTreeMap::new();
        let mut add = |name: &str, method: MethodSpec| {
            methods.insert(name.to_string(), method);
        };

        add(
            "ping",
            MethodSpec::new("Test the reachability of this module.")
                .param("pong", "string", "Text to echo back, defaults to \"pong\".")
                .returns("string", "The given text."),
        );
        add(
            "assert",
            MethodSpec::new("Check that the host commands this module needs are installed.")
                .returns("boolean", "true when every required command is present.")
                .throws("Error", "Names the first missing command."),
        );
        add(
            "list",
            MethodSpec::new("List the serial ports on this machine.")
                .returns("array", "Port descriptors: path, manufacturer, serialNumber, pnpId, locationId, vendorId, productId."),
        );

        let (open_name, open_desc) = match variant {
            Variant::Module => ("connect", "Open a serial port and start relaying its events."),
            Variant::Interface => (
                "open",
                "Open a serial port and start relaying its events. Arms the idle auto-close timer.",
            ),
        };
        add(
            open_name,
            MethodSpec::new(open_desc)
                .param("path", "string", "System path of the port, e.g. /dev/ttyUSB0 or COM3. Defaults to the configured path.")
                .param("options", "object", "Port options: baudRate, dataBits, parity, stopBits, flowControl.")
                .throws("Error", "The driver failed to open the port."),
        );

        add(
            "isOpen",
            MethodSpec::new("Whether the connected port is open.")
                .returns("boolean", "The driver's open state.")
                .throws("Error", "Not connected."),
        );
        let write_desc = match variant {
            Variant::Module => "Write data to the port.",
            Variant::Interface => "Write data to the port. Re-arms the idle auto-close timer.",
        };
        add(
            "write",
            MethodSpec::new(write_desc)
                .param("data", "string|Buffer", "Text or bytes to write.")
                .returns("number", "Bytes written.")
                .throws("Error", "Not connected, or the driver failed to write."),
        );
        add(
            "flush",
            MethodSpec::new("Discard unread input and unsent output.")
                .throws("Error", "Not connected, or the driver failed to flush."),
        );
        add(
            "drain",
            MethodSpec::new("Wait until all written data has been transmitted.")
                .throws("Error", "Not connected, or the driver failed to drain."),
        );
        add(
            "pause",
            MethodSpec::new("Stop emitting data events.").throws("Error", "Not connected."),
        );
        add(
            "resume",
            MethodSpec::new("Resume emitting data events.").throws("Error", "Not connected."),
        );
        add(
            "set",
            MethodSpec::new("Set control line flags.")
                .param("options", "object", "Flags: brk, cts, dsr, dtr, rts.")
                .throws("Error", "Not connected, or the driver failed to set the flags."),
        );
        add(
            "update",
            MethodSpec::new("Change settings of the open port.")
                .param("options", "object", "Settings: baudRate.")
                .throws("Error", "Not connected, or the driver failed to apply the settings."),
        );
        add(
            "close",
            MethodSpec::new("Close the port.")
                .throws("Error", "Not connected, or the port is already closed."),
        );

        let events = PortEvent::NAMES
            .iter()
            .map(|name| {
                let desc = match *name {
                    "open" => "The port finished opening.",
                    "data" => "Bytes arrived from the device.",
                    "error" => "The driver reported an error.",
                    "close" => "The port was closed.",
                    _ => "The device went away while the port was open.",
                };
                (name.to_string(), EventSpec { desc: desc.to_string() })
            })
            .collect();

        Self {
            name: "sugo-serialport".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            desc: "Serial port access for SUGO actors.".to_string(),
            methods,
            events,
        }
    }

    pub fn method(&self, name: &str) -> Option<&MethodSpec> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Check the descriptor against the host's schema rules.
    pub fn validate(&self) -> Result<(), SpecError> {
        if !NAME_RE.is_match(&self.name) {
            return Err(SpecError::InvalidName(self.name.clone()));
        }
        if !VERSION_RE.is_match(&self.version) {
            return Err(SpecError::InvalidVersion(self.version.clone()));
        }
        if self.desc.trim().is_empty() {
            return Err(SpecError::MissingDescription(self.name.clone()));
        }
        if self.methods.is_empty() {
            return Err(SpecError::NoMethods);
        }

        for (name, method) in &self.methods {
            if !IDENT_RE.is_match(name) {
                return Err(SpecError::InvalidMethodName(name.clone()));
            }
            if method.desc.trim().is_empty() {
                return Err(SpecError::MissingDescription(name.clone()));
            }
            for param in &method.params {
                if !IDENT_RE.is_match(&param.name) || param.desc.trim().is_empty() {
                    return Err(SpecError::InvalidParam {
                        method: name.clone(),
                        param: param.name.clone(),
                    });
                }
                check_type(&format!("{name}.{}", param.name), &param.type_name)?;
            }
            if let Some(returns) = &method.returns {
                check_type(&format!("{name}.return"), &returns.type_name)?;
            }
            for thrown in &method.throws {
                check_type(&format!("{name}.throws"), &thrown.type_name)?;
            }
        }

        for (name, event) in &self.events {
            if event.desc.trim().is_empty() {
                return Err(SpecError::MissingDescription(name.clone()));
            }
        }
        Ok(())
    }
}

fn check_type(location: &str, type_name: &str) -> Result<(), SpecError> {
    let known = type_name
        .split('|')
        .all(|part| KNOWN_TYPES.contains(&part.trim()));
    if known {
        Ok(())
    } else {
        Err(SpecError::UnknownType {
            location: location.to_string(),
            type_name: type_name.to_string(),
        })
    }
}
