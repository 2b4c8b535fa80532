//! Error taxonomy shared by client and server
//!
//! `RpcError` is the one structured error value of the system. It converts
//! losslessly to and from `ErrorDescription`, the serializable record that
//! travels inside a reply envelope, so a caller on the far side of a network
//! hop can branch on `category` and `code` instead of message text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Boxed error returned by command handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error category tag. Stable on the wire via `as_str`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Unknown,
    Internal,
    Configuration,
    /// Bind, dial or TLS material failures.
    Connection,
    /// Operation attempted in the wrong lifecycle phase.
    InvalidState,
    /// Command lookup or execution failures.
    Invocation,
    /// Parameters rejected by a schema.
    Validation,
    /// Raised by application handlers, opaque to this crate.
    Application,
    /// Failures reported by the gRPC transport itself.
    Transport,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Unknown => "Unknown",
            ErrorCategory::Internal => "Internal",
            ErrorCategory::Configuration => "Configuration",
            ErrorCategory::Connection => "Connection",
            ErrorCategory::InvalidState => "InvalidState",
            ErrorCategory::Invocation => "Invocation",
            ErrorCategory::Validation => "Validation",
            ErrorCategory::Application => "Application",
            ErrorCategory::Transport => "Transport",
        }
    }

    /// Parse a wire tag. Unrecognized tags collapse to `Unknown`.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "Internal" => ErrorCategory::Internal,
            "Configuration" => ErrorCategory::Configuration,
            "Connection" => ErrorCategory::Connection,
            "InvalidState" => ErrorCategory::InvalidState,
            "Invocation" => ErrorCategory::Invocation,
            "Validation" => ErrorCategory::Validation,
            "Application" => ErrorCategory::Application,
            "Transport" => ErrorCategory::Transport,
            _ => ErrorCategory::Unknown,
        }
    }

    /// HTTP-like status used when an error is created in this category.
    pub fn default_status(&self) -> u16 {
        match self {
            ErrorCategory::Connection | ErrorCategory::Transport => 503,
            ErrorCategory::InvalidState => 409,
            ErrorCategory::Validation => 400,
            _ => 500,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured, inspectable error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct RpcError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub status: u16,
    pub correlation_id: Option<String>,
    pub details: BTreeMap<String, String>,
    pub cause: Option<String>,
    pub stack_trace: Option<String>,
}

impl RpcError {
    pub fn new(
        category: ErrorCategory,
        correlation_id: Option<&str>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            status: category.default_status(),
            correlation_id: correlation_id.map(str::to_string),
            details: BTreeMap::new(),
            cause: None,
            stack_trace: None,
        }
    }

    pub fn connection(cid: Option<&str>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Connection, cid, code, message)
    }

    pub fn invalid_state(cid: Option<&str>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::InvalidState, cid, code, message)
    }

    pub fn invocation(cid: Option<&str>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Invocation, cid, code, message)
    }

    pub fn validation(cid: Option<&str>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, cid, code, message)
    }

    pub fn application(cid: Option<&str>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Application, cid, code, message)
    }

    pub fn configuration(cid: Option<&str>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Configuration, cid, code, message)
    }

    pub fn internal(cid: Option<&str>, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, cid, code, message)
    }

    pub fn with_details(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.stack_trace = Some(trace.into());
        self
    }

    /// Fill in the correlation id unless one is already recorded.
    pub fn with_correlation_id(mut self, cid: Option<&str>) -> Self {
        if self.correlation_id.is_none() {
            self.correlation_id = cid.map(str::to_string);
        }
        self
    }

    /// Wrap an arbitrary handler error.
    ///
    /// A boxed `RpcError` is returned as is, so structured application
    /// errors keep their category and code. Anything else becomes the cause
    /// of `self`.
    pub fn wrap(self, cause: BoxError) -> RpcError {
        match cause.downcast::<RpcError>() {
            Ok(inner) => *inner,
            Err(other) => self.with_cause(other),
        }
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }
}

/// Language-agnostic error record, as carried in an envelope reply.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorDescription {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub category: String,
    pub status: u16,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl ErrorDescription {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl From<&RpcError> for ErrorDescription {
    fn from(err: &RpcError) -> Self {
        Self {
            kind: None,
            category: err.category.as_str().to_string(),
            status: err.status,
            code: err.code.clone(),
            message: err.message.clone(),
            correlation_id: err.correlation_id.clone(),
            cause: err.cause.clone(),
            stack_trace: err.stack_trace.clone(),
            details: err.details.clone(),
        }
    }
}

impl From<ErrorDescription> for RpcError {
    fn from(desc: ErrorDescription) -> Self {
        Self {
            category: ErrorCategory::parse(&desc.category),
            code: desc.code,
            message: desc.message,
            status: desc.status,
            correlation_id: desc.correlation_id,
            details: desc.details,
            cause: desc.cause,
            stack_trace: desc.stack_trace,
        }
    }
}
