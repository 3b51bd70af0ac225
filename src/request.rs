//! Safe Request Wrapper - one timeout-bounded request with a normalized result
//!
//! ```text
//! safe_request(handle, method, params, timeout)
//!     │
//!     ├── spawn handle.request({method, params}) ─┐
//!     ├── timer(timeout) ─────────────────────────┤ first to settle wins
//!     │                                           ▼
//!     ├── Ok(raw)  → unwrap {result} → {data} → raw
//!     └── Err(raw) → ConnectorError (4001/4100/4200/4900/4901/...)
//! ```
//!
//! The losing request keeps running on its own task; it is abandoned, not
//! cancelled, and its outcome is dropped. No retries happen here.

use crate::endpoint::{CapabilityHandle, RequestArguments};
use crate::error::{ConnectorError, ConnectorResult, ErrorKind};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub mod methods {
    pub const REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
    pub const ACCOUNTS: &str = "eth_accounts";
    pub const CHAIN_ID: &str = "eth_chainId";
}

/// Perform exactly one request against `handle`.
pub async fn safe_request(
    handle: &Arc<dyn CapabilityHandle>,
    method: &str,
    params: Value,
    timeout: Duration,
) -> ConnectorResult<Value> {
    let args = RequestArguments::new(method, params.clone());
    let task_handle = handle.clone();
    let call = tokio::spawn(async move { task_handle.request(args).await });

    match tokio::time::timeout(timeout, call).await {
        Err(_) => {
            tracing::warn!("{} timed out after {:?}", method, timeout);
            Err(ConnectorError::timeout(method, &params, timeout.as_millis()))
        }
        Ok(Err(join)) => Err(ConnectorError::new(
            ErrorKind::InternalError,
            format!("endpoint request task failed: {}", join),
        )
        .with_context("method", method)
        .with_context("params", params)),
        Ok(Ok(Err(raw))) => {
            let err = ConnectorError::from_raw(&raw, method, &params);
            tracing::debug!("{} failed: {}", method, err);
            Err(err)
        }
        Ok(Ok(Ok(raw))) => Ok(unwrap_envelope(raw)),
    }
}

/// Strip one non-standard envelope: `{result}` first, then `{data}`.
pub fn unwrap_envelope(raw: Value) -> Value {
    match raw {
        Value::Object(mut obj) => {
            if let Some(result) = obj.remove("result") {
                result
            } else if let Some(data) = obj.remove("data") {
                data
            } else {
                Value::Object(obj)
            }
        }
        other => other,
    }
}

/// Coerce an accounts payload to a list: arrays keep their strings, a single
/// string becomes a one-element list, `{accounts}` is unwrapped.
pub fn coerce_accounts(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        Value::String(s) => vec![s.clone()],
        Value::Object(obj) => obj.get("accounts").map(coerce_accounts).unwrap_or_default(),
        _ => Vec::new(),
    }
}
