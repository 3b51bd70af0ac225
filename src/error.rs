//! Error taxonomy shared by every component.
//!
//! Hosts report failures in whatever shape the wallet extension chose
//! ([`RawError`]). The connector never lets those escape: every failure it
//! surfaces is a [`ConnectorError`] carrying one [`ErrorKind`] plus context.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// EIP-1193 provider error codes.
pub mod codes {
    pub const USER_REJECTED: i64 = 4001;
    pub const UNAUTHORIZED: i64 = 4100;
    pub const UNSUPPORTED_METHOD: i64 = 4200;
    pub const DISCONNECTED: i64 = 4900;
    pub const CHAIN_DISCONNECTED: i64 = 4901;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Closed set of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    EndpointNotFound,
    EndpointNotConnected,
    InvalidAddress,
    UnsupportedMethod,
    UserRejected,
    Unauthorized,
    NetworkDisconnected,
    Timeout,
    InvalidParams,
    JsonRpcError,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::EndpointNotFound => "endpoint_not_found",
            ErrorKind::EndpointNotConnected => "endpoint_not_connected",
            ErrorKind::InvalidAddress => "invalid_address",
            ErrorKind::UnsupportedMethod => "unsupported_method",
            ErrorKind::UserRejected => "user_rejected",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::NetworkDisconnected => "network_disconnected",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidParams => "invalid_params",
            ErrorKind::JsonRpcError => "json_rpc_error",
            ErrorKind::InternalError => "internal_error",
        }
    }

    /// Map a provider error code onto the taxonomy.
    pub fn from_code(code: i64) -> Self {
        match code {
            codes::USER_REJECTED => ErrorKind::UserRejected,
            codes::UNAUTHORIZED => ErrorKind::Unauthorized,
            codes::UNSUPPORTED_METHOD => ErrorKind::UnsupportedMethod,
            codes::DISCONNECTED | codes::CHAIN_DISCONNECTED => ErrorKind::NetworkDisconnected,
            codes::INVALID_PARAMS => ErrorKind::InvalidParams,
            codes::INTERNAL_ERROR => ErrorKind::InternalError,
            _ => ErrorKind::JsonRpcError,
        }
    }

    /// Deterministic failures are not worth another connection attempt.
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            ErrorKind::EndpointNotFound | ErrorKind::UnsupportedMethod | ErrorKind::InvalidParams
        )
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(self, ErrorKind::UserRejected)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed failure surfaced by the connector. Immutable once built.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ConnectorError {
    pub kind: ErrorKind,
    pub message: String,
    pub context: BTreeMap<String, Value>,
}

impl ConnectorError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), context: BTreeMap::new() }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn not_found(name: &str) -> Self {
        Self::new(ErrorKind::EndpointNotFound, format!("endpoint '{}' is not present", name))
            .with_context("endpoint", name)
    }

    pub fn not_connected() -> Self {
        Self::new(ErrorKind::EndpointNotConnected, "no endpoint is connected")
    }

    pub fn timeout(method: &str, params: &Value, timeout_ms: u128) -> Self {
        Self::new(ErrorKind::Timeout, format!("{} timed out after {}ms", method, timeout_ms))
            .with_context("method", method)
            .with_context("params", params.clone())
            .with_context("timeout_ms", timeout_ms as u64)
    }

    /// Classify a raw host failure raised by `method`.
    pub fn from_raw(raw: &RawError, method: &str, params: &Value) -> Self {
        let kind = raw.kind();
        let message = if raw.message.is_empty() { kind.as_str().to_string() } else { raw.message.clone() };
        let mut err = Self::new(kind, message)
            .with_context("method", method)
            .with_context("params", params.clone());
        if let Some(code) = raw.code {
            err = err.with_context("code", code);
        }
        if let Some(data) = &raw.data {
            err = err.with_context("data", data.clone());
        }
        err
    }

    /// Build the error recorded when an endpoint emits `disconnect`.
    pub fn from_disconnect(reason: &Value) -> Self {
        let raw = RawError::from_value(reason);
        let message = if raw.message.is_empty() { "endpoint disconnected".to_string() } else { raw.message };
        let mut err = Self::new(ErrorKind::NetworkDisconnected, message);
        if let Some(code) = raw.code {
            err = err.with_context("code", code);
        }
        err
    }

    pub fn to_json(&self) -> Value {
        json!({
            "kind": self.kind.as_str(),
            "message": self.message,
            "context": self.context,
        })
    }
}

/// Failure as reported by a host endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RawError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self { code: Some(code), message: message.into(), data: None }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self { code: None, message: message.into(), data: None }
    }

    /// Lenient parse of whatever an endpoint threw.
    ///
    /// Accepts `{code, message, data}` with numeric or string codes, codes nested
    /// under `data.code` or `error.code`, and bare strings.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(obj) => {
                let code = code_of(obj)
                    .or_else(|| obj.get("data").and_then(Value::as_object).and_then(code_of))
                    .or_else(|| obj.get("error").and_then(Value::as_object).and_then(code_of));
                let message = obj
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| obj.get("error").and_then(|e| e.get("message")).and_then(Value::as_str))
                    .or_else(|| obj.get("reason").and_then(Value::as_str))
                    .unwrap_or_default()
                    .to_string();
                Self { code, message, data: obj.get("data").cloned() }
            }
            Value::String(s) => Self::message(s.clone()),
            Value::Number(n) => Self { code: n.as_i64(), message: String::new(), data: None },
            Value::Null => Self::default(),
            other => Self::message(other.to_string()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.code {
            Some(code) => ErrorKind::from_code(code),
            None => {
                let lower = self.message.to_ascii_lowercase();
                if lower.contains("user rejected") || lower.contains("user denied") {
                    ErrorKind::UserRejected
                } else {
                    ErrorKind::JsonRpcError
                }
            }
        }
    }
}

impl fmt::Display for RawError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RawError {}

fn code_of(obj: &Map<String, Value>) -> Option<i64> {
    match obj.get("code")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
