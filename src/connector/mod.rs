//! Connector - the connection state machine
//!
//! ```text
//!                 connect()                 handshake ok
//! Disconnected ───────────────▶ Connecting ─────────────▶ Connected
//!      ▲                           │    ▲                    │
//!      │                 budget    │    │ connect()          │ disconnect() / accounts=[] /
//!      │               exhausted   ▼    │                    │ endpoint "disconnect"
//!      └──────── disconnect() ──── Error ┘                    │
//!      ▲                                                      │
//!      └──────────────────────────────────────────────────────┘
//! ```
//!
//! One attempt: scan → resolve identity → detach old listeners → attach new
//! listeners → `eth_requestAccounts` → optional set-address → `eth_chainId`.
//! Failed attempts roll their listeners back and are retried with exponential
//! backoff, rescanning each time. Not-found is never retried.
//!
//! Endpoint events arrive on a channel per subscription and are applied by a
//! pump task, each one atomically under the state lock. Events from a
//! subscription that is no longer active are dropped.

mod backoff;
mod config;
mod state;

pub use backoff::BackoffPolicy;
pub use config::ConnectorConfig;
pub use state::{AccountsOutcome, ConnectionState, ConnectionStatus};

use crate::endpoint::{CapabilityHandle, HostEnvironment};
use crate::error::{ConnectorError, ConnectorResult, ErrorKind};
use crate::events::{self, EndpointEvent, Subscription};
use crate::registry::{DetectedEndpoint, EndpointId, ProviderRegistry, ProviderWatcher};
use crate::request::{coerce_accounts, methods, safe_request};
use crate::runtime::Shutdown;
use crate::validate::{filter_addresses, is_valid_chain_id, normalize_chain_id};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Outcome of a successful `connect`.
#[derive(Debug, Clone)]
pub struct Connection {
    pub endpoint: DetectedEndpoint,
    pub accounts: Vec<String>,
    pub chain_id: String,
}

/// Notifications for UI and facade layers.
#[derive(Debug, Clone)]
pub enum ConnectorEvent {
    Connected(Connection),
    AccountsChanged(Vec<String>),
    ChainChanged(String),
    /// `reason` is set when the endpoint ended the session.
    Disconnected { reason: Option<ConnectorError> },
    EndpointsChanged(Vec<DetectedEndpoint>),
    Error(ConnectorError),
}

type ConnectFuture = Shared<BoxFuture<'static, ConnectorResult<Connection>>>;

struct InFlight {
    id: u64,
    name: String,
    future: ConnectFuture,
}

struct ActiveSubscription {
    id: u64,
    subscription: Subscription,
}

struct Guarded {
    state: ConnectionState,
    subscription: Option<ActiveSubscription>,
    /// Bumped by `disconnect`; an attempt started in an older epoch may not commit.
    epoch: u64,
    next_subscription: u64,
}

impl Guarded {
    fn active_id(&self) -> Option<u64> {
        self.subscription.as_ref().map(|s| s.id)
    }

    fn detach_active(&mut self) {
        if let Some(active) = self.subscription.take() {
            active.subscription.detach();
        }
    }
}

/// Listeners and handshake values of an attempt that has not committed yet.
struct Handshake {
    endpoint: DetectedEndpoint,
    accounts: Vec<String>,
    chain_id: String,
    subscription: Subscription,
    events: mpsc::UnboundedReceiver<EndpointEvent>,
}

struct Core {
    registry: ProviderRegistry,
    config: ConnectorConfig,
    guarded: Mutex<Guarded>,
    inflight: Mutex<Option<InFlight>>,
    next_attempt: AtomicU64,
    notices: broadcast::Sender<ConnectorEvent>,
    watcher: Mutex<Option<Arc<ProviderWatcher>>>,
    pumps: AtomicUsize,
}

/// Connection state machine over the endpoints a host exposes. Cheap to clone.
#[derive(Clone)]
pub struct Connector {
    core: Arc<Core>,
}

impl Connector {
    pub fn new(host: Arc<dyn HostEnvironment>, config: ConnectorConfig) -> Self {
        let (notices, _) = broadcast::channel(config.event_capacity.max(1));
        let registry = ProviderRegistry::new(host).with_verbose(config.verbose);
        Self {
            core: Arc::new(Core {
                registry,
                config,
                guarded: Mutex::new(Guarded {
                    state: ConnectionState::default(),
                    subscription: None,
                    epoch: 0,
                    next_subscription: 0,
                }),
                inflight: Mutex::new(None),
                next_attempt: AtomicU64::new(0),
                notices,
                watcher: Mutex::new(None),
                pumps: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ConnectorConfig { &self.core.config }

    pub fn registry(&self) -> &ProviderRegistry { &self.core.registry }

    /// Fresh scan of the host.
    pub fn scan(&self) -> Vec<DetectedEndpoint> {
        self.core.registry.scan()
    }

    /// Last watched snapshot, or a fresh scan when no watcher runs.
    pub fn endpoints(&self) -> Vec<DetectedEndpoint> {
        let watcher = self.core.watcher.lock().ok().and_then(|w| w.clone());
        match watcher {
            Some(w) => w.endpoints(),
            None => self.scan(),
        }
    }

    /// Snapshot of the connection state.
    pub fn state(&self) -> ConnectionState {
        self.core.lock().state.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.core.lock().state.status
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.core.notices.subscribe()
    }

    /// Number of listener subscriptions currently attached (0 or 1).
    pub fn active_subscriptions(&self) -> usize {
        self.core.lock().subscription.iter().filter(|s| s.subscription.is_active()).count()
    }

    /// Event pump tasks still running. At most one outlives a detach.
    pub fn event_pumps(&self) -> usize {
        self.core.pumps.load(Ordering::SeqCst)
    }

    /// Rescan on `config.scan_interval` and on host injection signals until
    /// `shutdown` fires, publishing `EndpointsChanged` when the set changes.
    pub fn watch(&self, shutdown: &Shutdown) -> JoinHandle<()> {
        let notices = self.core.notices.clone();
        let watcher = Arc::new(ProviderWatcher::new(
            self.core.registry.clone(),
            self.core.config.scan_interval,
            Arc::new(move |endpoints: Vec<DetectedEndpoint>| {
                let _ = notices.send(ConnectorEvent::EndpointsChanged(endpoints));
            }),
        ));
        if let Ok(mut slot) = self.core.watcher.lock() {
            *slot = Some(watcher.clone());
        }
        watcher.start(shutdown)
    }

    /// Connect to the endpoint named `name` (see [`EndpointId`]).
    ///
    /// A call made while another connect is in flight joins that attempt.
    pub async fn connect(&self, name: &str) -> ConnectorResult<Connection> {
        let future = {
            let mut slot = self.core.inflight.lock().unwrap_or_else(|p| p.into_inner());
            match slot.as_ref() {
                Some(inflight) => {
                    if inflight.name != name {
                        tracing::debug!(
                            "connect('{}') joined in-flight connect('{}')",
                            name,
                            inflight.name
                        );
                    }
                    inflight.future.clone()
                }
                None => {
                    let id = self.core.next_attempt.fetch_add(1, Ordering::Relaxed);
                    let core = self.core.clone();
                    let target = name.to_string();
                    let future = async move {
                        let result = core.connect_with_retry(&target).await;
                        core.clear_inflight(id);
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(InFlight { id, name: name.to_string(), future: future.clone() });
                    future
                }
            }
        };
        future.await
    }

    /// Drop the connection and its listeners. Safe to call repeatedly.
    ///
    /// Also cancels a connect that is still in flight: it stops retrying, never
    /// commits, and the next `connect` starts a fresh attempt.
    pub fn disconnect(&self) {
        let (active, was_connected) = {
            let mut g = self.core.lock();
            if g.state.status == ConnectionStatus::Disconnected && g.subscription.is_none() {
                return;
            }
            g.epoch += 1;
            let was_connected = g.state.is_connected();
            g.state.reset();
            (g.subscription.take(), was_connected)
        };
        self.core.inflight.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(active) = active {
            active.subscription.detach();
        }
        if was_connected {
            tracing::info!("disconnected");
            self.core.notify(ConnectorEvent::Disconnected { reason: None });
        }
    }

    /// Pass-through request against the connected endpoint.
    pub async fn request(&self, method: &str, params: Value, timeout: Duration) -> ConnectorResult<Value> {
        let handle = self
            .core
            .lock()
            .state
            .active_endpoint
            .as_ref()
            .map(|e| e.handle.clone())
            .ok_or_else(ConnectorError::not_connected)?;
        safe_request(&handle, method, params, timeout).await
    }
}

impl Core {
    fn lock(&self) -> MutexGuard<'_, Guarded> {
        self.guarded.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn notify(&self, event: ConnectorEvent) {
        if self.config.verbose {
            tracing::debug!("notify: {:?}", event);
        }
        let _ = self.notices.send(event);
    }

    fn clear_inflight(&self, id: u64) {
        let mut slot = self.inflight.lock().unwrap_or_else(|p| p.into_inner());
        if slot.as_ref().map(|f| f.id) == Some(id) {
            *slot = None;
        }
    }

    fn is_stale(&self, epoch: u64) -> bool {
        self.lock().epoch != epoch
    }

    async fn connect_with_retry(self: &Arc<Self>, name: &str) -> ConnectorResult<Connection> {
        let (epoch, was_connected) = {
            let mut g = self.lock();
            let was_connected = g.state.is_connected();
            g.detach_active();
            g.state.begin_connecting();
            (g.epoch, was_connected)
        };
        if was_connected {
            tracing::info!("dropping current connection to reconnect");
            self.notify(ConnectorEvent::Disconnected { reason: None });
        }
        tracing::info!("connecting to '{}'", name);

        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            if self.is_stale(epoch) {
                return Err(cancelled(name));
            }
            match self.attempt(name, epoch).await {
                Ok(handshake) => return self.commit(handshake, epoch),
                Err(_) if self.is_stale(epoch) => return Err(cancelled(name)),
                Err(err) => {
                    let exhausted = attempt + 1 >= max_attempts;
                    if !err.kind.is_retriable() || exhausted {
                        return Err(self.fail(err, epoch));
                    }
                    let delay = self.config.backoff.delay(attempt);
                    tracing::warn!(
                        "connect '{}' attempt {}/{} failed: {}; retrying in {:?}",
                        name,
                        attempt + 1,
                        max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn attempt(&self, name: &str, epoch: u64) -> ConnectorResult<Handshake> {
        let endpoints = self.registry.scan();
        let endpoint = name
            .parse::<EndpointId>()
            .ok()
            .and_then(|id| endpoints.into_iter().find(|e| e.id() == id))
            .ok_or_else(|| ConnectorError::not_found(name))?;

        if !endpoint.handle.has_request() {
            return Err(ConnectorError::new(ErrorKind::UnsupportedMethod, "endpoint has no callable request")
                .with_context("endpoint", endpoint.id().as_str()));
        }

        {
            let mut g = self.lock();
            if g.epoch != epoch {
                return Err(cancelled(name));
            }
            g.detach_active();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = events::attach(&endpoint.handle, tx);

        match self.handshake(&endpoint.handle).await {
            Ok((accounts, chain_id)) => Ok(Handshake { endpoint, accounts, chain_id, subscription, events: rx }),
            Err(err) => {
                subscription.detach();
                Err(err)
            }
        }
    }

    async fn handshake(&self, handle: &Arc<dyn CapabilityHandle>) -> ConnectorResult<(Vec<String>, String)> {
        let timeout = self.config.request_timeout;

        let raw_accounts = safe_request(handle, methods::REQUEST_ACCOUNTS, json!([]), timeout).await?;
        let reported = coerce_accounts(&raw_accounts);
        let accounts = filter_addresses(&reported);
        if accounts.is_empty() {
            let err = if reported.is_empty() {
                ConnectorError::new(ErrorKind::EndpointNotConnected, "endpoint returned no accounts")
            } else {
                ConnectorError::new(ErrorKind::InvalidAddress, "endpoint returned no valid address")
                    .with_context("accounts", reported)
            };
            return Err(err.with_context("method", methods::REQUEST_ACCOUNTS));
        }

        self.push_active_address(handle, &accounts[0]).await;

        let raw_chain = safe_request(handle, methods::CHAIN_ID, json!([]), timeout).await?;
        let chain_id = normalize_chain_id(&raw_chain)
            .filter(|c| is_valid_chain_id(c))
            .ok_or_else(|| {
                ConnectorError::new(ErrorKind::JsonRpcError, "endpoint returned an invalid chain id")
                    .with_context("method", methods::CHAIN_ID)
                    .with_context("result", raw_chain.clone())
            })?;

        Ok((accounts, chain_id))
    }

    /// Best effort; a failing side channel never fails the connection.
    async fn push_active_address(&self, handle: &Arc<dyn CapabilityHandle>, address: &str) {
        match tokio::time::timeout(self.config.set_address_timeout, handle.set_address(address)).await {
            Ok(None) => {}
            Ok(Some(Ok(()))) => tracing::debug!("active address set to {}", address),
            Ok(Some(Err(e))) => tracing::warn!("set address failed (ignored): {}", e),
            Err(_) => tracing::warn!(
                "set address timed out after {:?} (ignored)",
                self.config.set_address_timeout
            ),
        }
    }

    fn commit(self: &Arc<Self>, handshake: Handshake, epoch: u64) -> ConnectorResult<Connection> {
        let Handshake { endpoint, accounts, chain_id, subscription, events } = handshake;
        let connection = Connection { endpoint: endpoint.clone(), accounts: accounts.clone(), chain_id: chain_id.clone() };

        let subscription_id = {
            let mut g = self.lock();
            if g.epoch != epoch {
                drop(g);
                subscription.detach();
                return Err(cancelled(endpoint.id().as_str()));
            }
            g.detach_active();
            g.next_subscription += 1;
            let id = g.next_subscription;
            g.subscription = Some(ActiveSubscription { id, subscription });
            g.state.commit(endpoint, accounts, chain_id);
            id
        };

        spawn_event_pump(self.clone(), subscription_id, events);
        tracing::info!(
            "connected to '{}' on chain {} ({} account(s))",
            connection.endpoint.id(),
            connection.chain_id,
            connection.accounts.len()
        );
        self.notify(ConnectorEvent::Connected(connection.clone()));
        Ok(connection)
    }

    fn fail(&self, err: ConnectorError, epoch: u64) -> ConnectorError {
        {
            let mut g = self.lock();
            if g.epoch == epoch {
                g.state.fail(err.clone());
            }
        }
        tracing::warn!("connect failed: {}", err);
        self.notify(ConnectorEvent::Error(err.clone()));
        err
    }

    /// Apply one endpoint event. Returns false once the subscription is stale.
    fn apply_event(&self, subscription_id: u64, event: EndpointEvent) -> bool {
        let mut notices = Vec::new();
        let mut retired = None;

        let keep = {
            let mut g = self.lock();
            if g.active_id() != Some(subscription_id) {
                return false;
            }
            match event {
                EndpointEvent::AccountsChanged(reported) => match g.state.apply_accounts(&reported) {
                    AccountsOutcome::Replaced(accounts) => {
                        notices.push(ConnectorEvent::AccountsChanged(accounts));
                        true
                    }
                    AccountsOutcome::Revoked => {
                        tracing::info!("endpoint reported no accounts; disconnecting");
                        retired = g.subscription.take();
                        notices.push(ConnectorEvent::Disconnected { reason: None });
                        false
                    }
                },
                EndpointEvent::ChainChanged(chain_id) | EndpointEvent::Connected { chain_id: Some(chain_id) } => {
                    if g.state.chain_id.as_deref() == Some(chain_id.as_str()) {
                        // unchanged
                    } else if g.state.apply_chain(&chain_id) {
                        notices.push(ConnectorEvent::ChainChanged(chain_id));
                    } else {
                        tracing::warn!("ignoring invalid chain id '{}'", chain_id);
                    }
                    true
                }
                EndpointEvent::Connected { chain_id: None } => true,
                EndpointEvent::Disconnected(reason) => {
                    tracing::info!("endpoint disconnected: {}", reason);
                    retired = g.subscription.take();
                    g.state.disconnected_by(reason.clone());
                    notices.push(ConnectorEvent::Disconnected { reason: Some(reason) });
                    false
                }
                EndpointEvent::Error(err) => {
                    tracing::warn!("endpoint event error: {}", err);
                    notices.push(ConnectorEvent::Error(err));
                    true
                }
            }
        };

        if let Some(active) = retired {
            active.subscription.detach();
        }
        for notice in notices {
            self.notify(notice);
        }
        keep
    }
}

fn cancelled(name: &str) -> ConnectorError {
    tracing::info!("connect to '{}' cancelled by disconnect", name);
    ConnectorError::new(ErrorKind::EndpointNotConnected, "connection cancelled by disconnect")
        .with_context("endpoint", name)
}

/// Runs until the subscription's channel closes (on detach) or its events go stale.
fn spawn_event_pump(core: Arc<Core>, subscription_id: u64, mut events: mpsc::UnboundedReceiver<EndpointEvent>) {
    core.pumps.fetch_add(1, Ordering::SeqCst);
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if !core.apply_event(subscription_id, event) {
                break;
            }
        }
        core.pumps.fetch_sub(1, Ordering::SeqCst);
    });
}
