//! Beeconnect: browser wallet connector. Discover, connect, request, follow events.
//!
//! # Architecture
//!
//! ```text
//! Connector (state machine)
//!   │
//!   ├── ProviderRegistry ── scan() ──▶ HostEnvironment globals
//!   │     └── ProviderWatcher (timer + injection signals)
//!   │
//!   ├── events::attach ──▶ EndpointEvent channel ──▶ pump task ──▶ ConnectionState
//!   │
//!   └── request::safe_request (timeout race, envelope unwrap, error taxonomy)
//! ```
//!
//! # Operations
//!
//! | Operation | Method | Description |
//! |-----------|--------|-------------|
//! | scan | `connector.scan()` | Endpoints present right now |
//! | connect | `connector.connect(name)` | Handshake with retry and backoff |
//! | disconnect | `connector.disconnect()` | Detach listeners, reset state |
//! | request | `connector.request(method, params, timeout)` | Pass-through call |
//! | state | `connector.state()` | Read-only snapshot |
//! | subscribe | `connector.subscribe()` | Accounts/chain/disconnect/error notifications |
//!
//! # Usage
//!
//! ```ignore
//! use beeconnect::{Connector, ConnectorConfig, InjectedHost};
//! use std::sync::Arc;
//!
//! let host = Arc::new(InjectedHost::new());
//! host.inject("ethereum", my_bridge_handle);
//!
//! let connector = Connector::new(host, ConnectorConfig::from_env());
//! let connection = connector.connect("metamask").await?;
//! println!("{} on {}", connection.accounts[0], connection.chain_id);
//! ```

pub mod connector;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod logging;
pub mod registry;
pub mod request;
pub mod runtime;
pub mod validate;

// =============================================================================
// Re-exports
// =============================================================================
pub use connector::{
    BackoffPolicy, Connection, ConnectionState, ConnectionStatus, Connector, ConnectorConfig,
    ConnectorEvent,
};
pub use endpoint::{
    CapabilityHandle, EventEmitter, EventHandler, HostEnvironment, InjectedHost, RequestArguments,
    Unsupported,
};
pub use error::{ConnectorError, ConnectorResult, ErrorKind, RawError};
pub use events::{attach, EndpointEvent, Subscription};
pub use registry::{DetectedEndpoint, EndpointCapabilities, EndpointId, EndpointIdentity, ProviderRegistry, ProviderWatcher};
pub use request::safe_request;
pub use runtime::Shutdown;
pub use validate::{is_valid_address, is_valid_chain_id};
