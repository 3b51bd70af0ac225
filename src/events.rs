//! Event Listener Lifecycle - raw endpoint emissions in, typed events out
//!
//! [`attach`] registers four handlers (`accountsChanged`, `chainChanged`,
//! `disconnect`, `connect`) that translate payloads into [`EndpointEvent`]s and
//! push them onto a channel. The returned [`Subscription`] removes exactly
//! those handlers and closes the channel, so the consumer sees the end of the
//! stream even when the endpoint cannot remove handlers. Callers detach before
//! attaching again; this module does not police duplicates.

use crate::endpoint::{CapabilityHandle, EventHandler};
use crate::error::{ConnectorError, ErrorKind};
use crate::request::coerce_accounts;
use crate::validate::normalize_chain_id;
use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub mod names {
    pub const ACCOUNTS_CHANGED: &str = "accountsChanged";
    pub const CHAIN_CHANGED: &str = "chainChanged";
    pub const DISCONNECT: &str = "disconnect";
    pub const CONNECT: &str = "connect";

    pub const ALL: [&str; 4] = [ACCOUNTS_CHANGED, CHAIN_CHANGED, DISCONNECT, CONNECT];
}

/// Typed endpoint emission. Values are coerced but not yet validated.
#[derive(Debug, Clone, PartialEq)]
pub enum EndpointEvent {
    AccountsChanged(Vec<String>),
    ChainChanged(String),
    Connected { chain_id: Option<String> },
    Disconnected(ConnectorError),
    /// Raised while translating a payload.
    Error(ConnectorError),
}

pub type EventSink = mpsc::UnboundedSender<EndpointEvent>;

/// The sender shared by one subscription's handlers. `None` once detached.
type SharedSink = Arc<Mutex<Option<EventSink>>>;

/// Handlers attached by one [`attach`] call.
pub struct Subscription {
    handle: Arc<dyn CapabilityHandle>,
    registered: Vec<(&'static str, EventHandler)>,
    sink: SharedSink,
    detached: AtomicBool,
}

/// Attach validated handlers to `handle`, forwarding into `sink`.
///
/// Request-only endpoints (no `on`) get a subscription whose detach only
/// closes the channel.
pub fn attach(handle: &Arc<dyn CapabilityHandle>, sink: EventSink) -> Subscription {
    let sink: SharedSink = Arc::new(Mutex::new(Some(sink)));
    let mut registered = Vec::new();

    match handle.events() {
        Some(emitter) => {
            for event in names::ALL {
                let handler = wrap(event, sink.clone());
                emitter.on(event, handler.clone());
                registered.push((event, handler));
            }
        }
        None => tracing::debug!("endpoint exposes no events; request-only"),
    }

    Subscription { handle: handle.clone(), registered, sink, detached: AtomicBool::new(false) }
}

impl Subscription {
    /// Remove this subscription's handlers. Idempotent.
    ///
    /// Prefers `removeListener`, falls back to `removeAllListeners`, and only
    /// warns when the endpoint offers neither. Handlers go silent and the
    /// channel closes either way.
    pub fn detach(&self) {
        if self.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        close(&self.sink);
        if self.registered.is_empty() {
            return;
        }
        let Some(emitter) = self.handle.events() else { return };

        let targeted = self
            .registered
            .iter()
            .all(|(event, handler)| emitter.remove_listener(event, handler).is_ok());
        if targeted {
            return;
        }
        if emitter.remove_all_listeners().is_err() {
            tracing::warn!("endpoint supports neither removeListener nor removeAllListeners; handlers muted in place");
        }
    }

    pub fn is_active(&self) -> bool {
        !self.detached.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        self.registered.len()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("handlers", &self.registered.len())
            .field("active", &self.is_active())
            .finish()
    }
}

fn close(sink: &SharedSink) {
    sink.lock().unwrap_or_else(|p| p.into_inner()).take();
}

fn wrap(event: &'static str, sink: SharedSink) -> EventHandler {
    Arc::new(move |payload: Value| {
        let Some(tx) = sink.lock().unwrap_or_else(|p| p.into_inner()).clone() else {
            return;
        };
        let translated = panic::catch_unwind(AssertUnwindSafe(|| translate(event, &payload)))
            .unwrap_or_else(|_| {
                EndpointEvent::Error(
                    ConnectorError::new(ErrorKind::InternalError, format!("{} handler panicked", event))
                        .with_context("event", event),
                )
            });
        // Receiver gone means the connector moved on.
        let _ = tx.send(translated);
    })
}

fn translate(event: &str, payload: &Value) -> EndpointEvent {
    match event {
        names::ACCOUNTS_CHANGED => EndpointEvent::AccountsChanged(coerce_accounts(payload)),
        names::CHAIN_CHANGED => match normalize_chain_id(payload) {
            Some(chain_id) => EndpointEvent::ChainChanged(chain_id),
            None => EndpointEvent::Error(
                ConnectorError::new(ErrorKind::InvalidParams, "malformed chainChanged payload")
                    .with_context("event", event)
                    .with_context("payload", payload.clone()),
            ),
        },
        names::CONNECT => EndpointEvent::Connected { chain_id: normalize_chain_id(payload) },
        names::DISCONNECT => EndpointEvent::Disconnected(ConnectorError::from_disconnect(payload)),
        other => EndpointEvent::Error(
            ConnectorError::new(ErrorKind::InternalError, format!("unexpected event '{}'", other))
                .with_context("event", other),
        ),
    }
}
