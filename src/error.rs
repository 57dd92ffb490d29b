use crate::config::ConfigError;
use crate::service::ServiceError;
use serde_json::{json, Value};
use std::fmt;

/// A specialized `Result` type for the binary and the stdio pipe.
pub type AppResult<T> = Result<T, AppError>;

/// Unified application error type.
///
/// Everything the pipe can report to a remote caller funnels through here and
/// renders as `{"type": ..., "message": ...}`.
#[derive(Debug)]
pub enum AppError {
    Service(ServiceError),
    Config(ConfigError),
    InvalidPayload(String),
    IoError(std::io::Error),
    SerdeError(serde_json::Error),
}

impl AppError {
    /// Stable error type name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Service(e) => e.kind(),
            Self::Config(_) => "ConfigError",
            Self::InvalidPayload(_) => "InvalidPayload",
            Self::IoError(_) => "IoError",
            Self::SerdeError(_) => "DeserializationError",
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "type": self.kind(), "message": self.to_string() })
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Driver messages go out untouched.
            Self::Service(e) => write!(f, "{e}"),
            Self::Config(e) => write!(f, "{e}"),
            Self::InvalidPayload(details) => write!(f, "The request payload is invalid: {details}"),
            Self::IoError(e) => write!(f, "An I/O error occurred: {e}"),
            Self::SerdeError(e) => write!(f, "A serialization/deserialization error occurred: {e}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Service(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::IoError(e) => Some(e),
            Self::SerdeError(e) => Some(e),
            Self::InvalidPayload(_) => None,
        }
    }
}

// Implement `From` conversions to allow the `?` operator to work seamlessly.
impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        AppError::Service(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerdeError(err)
    }
}
