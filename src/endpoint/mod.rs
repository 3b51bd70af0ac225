//! Endpoint - What the connector needs from a host-injected wallet object
//!
//! The host (a browser bridge, a WebDriver session, a test) owns the real
//! wallet objects. The connector only sees them through these traits:
//!
//! ```text
//! HostEnvironment ── global("ethereum") ──▶ CapabilityHandle
//!                                              ├── request({method, params})
//!                                              ├── flag("isMetaMask") / version() / is_connected()
//!                                              ├── events() ──▶ EventEmitter (on / removeListener / removeAllListeners)
//!                                              └── set_address(addr)   (optional side channel)
//! ```

mod host;

pub use host::InjectedHost;

use crate::error::RawError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Handler registered on an endpoint's event emitter.
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// `{method, params}` as passed to `request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestArguments {
    pub method: String,
    pub params: Value,
}

impl RequestArguments {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self { method: method.into(), params }
    }
}

/// The endpoint lacks the requested member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsupported;

impl fmt::Display for Unsupported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unsupported by endpoint")
    }
}

impl std::error::Error for Unsupported {}

/// Opaque endpoint object.
#[async_trait]
pub trait CapabilityHandle: Send + Sync {
    /// Whether `request` is actually callable. Objects without it are ignored.
    fn has_request(&self) -> bool {
        true
    }

    async fn request(&self, args: RequestArguments) -> Result<Value, RawError>;

    /// Read a boolean marker property. `None` when absent or not a boolean.
    fn flag(&self, _marker: &str) -> Option<bool> {
        None
    }

    fn version(&self) -> Option<String> {
        None
    }

    fn is_connected(&self) -> Option<bool> {
        None
    }

    /// Event surface, if the endpoint is not request-only.
    fn events(&self) -> Option<&dyn EventEmitter> {
        None
    }

    /// Optional "set active address" side channel. `None` when absent.
    async fn set_address(&self, _address: &str) -> Option<Result<(), RawError>> {
        None
    }
}

pub trait EventEmitter: Send + Sync {
    fn on(&self, event: &str, handler: EventHandler);

    /// Remove one handler, matched by `Arc` identity.
    fn remove_listener(&self, _event: &str, _handler: &EventHandler) -> Result<(), Unsupported> {
        Err(Unsupported)
    }

    fn remove_all_listeners(&self) -> Result<(), Unsupported> {
        Err(Unsupported)
    }
}

/// The host global namespace.
pub trait HostEnvironment: Send + Sync {
    /// Read a global property. Inaccessible properties read as `None`.
    fn global(&self, name: &str) -> Option<Arc<dyn CapabilityHandle>>;

    /// "Endpoint injected" signals, carrying the global property name.
    fn injections(&self) -> Option<broadcast::Receiver<String>> {
        None
    }
}
