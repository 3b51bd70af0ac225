//! Scripted endpoint double shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use beeconnect::{
    CapabilityHandle, Connector, ConnectorConfig, ConnectorEvent, EventEmitter, EventHandler,
    InjectedHost, RawError, RequestArguments, Unsupported,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub const ADDR_A: &str = "0xAAAAaaaaAAAAaaaaAAAAaaaaAAAAaaaa11111111";
pub const ADDR_B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

#[derive(Debug, Clone)]
pub struct Reply {
    pub delay: Option<Duration>,
    pub outcome: Result<Value, RawError>,
}

impl Reply {
    pub fn ok(value: Value) -> Self { Self { delay: None, outcome: Ok(value) } }
    pub fn err(code: i64, message: &str) -> Self { Self { delay: None, outcome: Err(RawError::new(code, message)) } }
    pub fn after(mut self, delay: Duration) -> Self { self.delay = Some(delay); self }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Targeted,
    BlanketOnly,
    Neither,
}

pub struct MockEndpoint {
    has_request: bool,
    markers: HashMap<String, bool>,
    version: Option<String>,
    connected: Option<bool>,
    events: Option<Removal>,
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
    handlers: Mutex<Vec<(String, EventHandler)>>,
    set_address: Option<Reply>,
    addresses_set: Mutex<Vec<String>>,
    pub on_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub remove_all_calls: AtomicUsize,
}

impl MockEndpoint {
    pub fn new() -> Self {
        Self {
            has_request: true,
            markers: HashMap::new(),
            version: None,
            connected: None,
            events: Some(Removal::Targeted),
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
            set_address: None,
            addresses_set: Mutex::new(Vec::new()),
            on_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
            remove_all_calls: AtomicUsize::new(0),
        }
    }

    /// MetaMask-marked endpoint answering the handshake with `ADDR_A` on `0x1`.
    pub fn metamask() -> Self {
        Self::new()
            .marker("isMetaMask", true)
            .reply("eth_requestAccounts", Reply::ok(json!([ADDR_A])))
            .reply("eth_chainId", Reply::ok(json!("0x1")))
    }

    pub fn marker(mut self, name: &str, value: bool) -> Self { self.markers.insert(name.into(), value); self }
    pub fn without_request(mut self) -> Self { self.has_request = false; self }
    pub fn version(mut self, v: &str) -> Self { self.version = Some(v.into()); self }
    pub fn connected(mut self, c: bool) -> Self { self.connected = Some(c); self }
    pub fn removal(mut self, r: Removal) -> Self { self.events = Some(r); self }
    pub fn request_only(mut self) -> Self { self.events = None; self }
    pub fn set_address_reply(mut self, r: Reply) -> Self { self.set_address = Some(r); self }

    /// Queue a reply. The last queued reply for a method repeats forever.
    pub fn reply(self, method: &str, reply: Reply) -> Self {
        self.replies.lock().unwrap().entry(method.into()).or_default().push_back(reply);
        self
    }

    /// Replace all queued replies for `method`.
    pub fn set_reply(&self, method: &str, reply: Reply) {
        self.replies.lock().unwrap().insert(method.into(), VecDeque::from([reply]));
    }

    pub fn arc(self) -> Arc<Self> { Arc::new(self) }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| *m == method).count()
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    pub fn addresses_set(&self) -> Vec<String> {
        self.addresses_set.lock().unwrap().clone()
    }

    /// Fire `event` like the endpoint would. Handlers run outside the lock.
    pub fn emit(&self, event: &str, payload: Value) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == event)
            .map(|(_, h)| h.clone())
            .collect();
        for handler in handlers {
            handler(payload.clone());
        }
    }

    fn next_reply(&self, method: &str) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(method)?;
        if queue.len() > 1 { queue.pop_front() } else { queue.front().cloned() }
    }
}

async fn settle(reply: Reply) -> Result<Value, RawError> {
    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }
    reply.outcome
}

#[async_trait]
impl CapabilityHandle for MockEndpoint {
    fn has_request(&self) -> bool { self.has_request }

    async fn request(&self, args: RequestArguments) -> Result<Value, RawError> {
        self.calls.lock().unwrap().push(args.method.clone());
        match self.next_reply(&args.method) {
            Some(reply) => settle(reply).await,
            None => Err(RawError::new(4200, format!("{} not supported", args.method))),
        }
    }

    fn flag(&self, marker: &str) -> Option<bool> { self.markers.get(marker).copied() }
    fn version(&self) -> Option<String> { self.version.clone() }
    fn is_connected(&self) -> Option<bool> { self.connected }

    fn events(&self) -> Option<&dyn EventEmitter> {
        self.events.map(|_| self as &dyn EventEmitter)
    }

    async fn set_address(&self, address: &str) -> Option<Result<(), RawError>> {
        let reply = self.set_address.clone()?;
        self.addresses_set.lock().unwrap().push(address.to_string());
        Some(settle(reply).await.map(|_| ()))
    }
}

impl EventEmitter for MockEndpoint {
    fn on(&self, event: &str, handler: EventHandler) {
        self.on_calls.fetch_add(1, Ordering::SeqCst);
        self.handlers.lock().unwrap().push((event.to_string(), handler));
    }

    fn remove_listener(&self, event: &str, handler: &EventHandler) -> Result<(), Unsupported> {
        if self.events != Some(Removal::Targeted) {
            return Err(Unsupported);
        }
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.handlers
            .lock()
            .unwrap()
            .retain(|(name, h)| !(name == event && Arc::ptr_eq(h, handler)));
        Ok(())
    }

    fn remove_all_listeners(&self) -> Result<(), Unsupported> {
        if self.events == Some(Removal::Neither) {
            return Err(Unsupported);
        }
        self.remove_all_calls.fetch_add(1, Ordering::SeqCst);
        self.handlers.lock().unwrap().clear();
        Ok(())
    }
}

pub fn test_config() -> ConnectorConfig {
    ConnectorConfig::new()
        .with_request_timeout(Duration::from_secs(2))
        .with_scan_interval(Duration::ZERO)
}

/// Host with `endpoint` injected at `global`, plus a connector over it.
pub fn connector_with(global: &str, endpoint: Arc<MockEndpoint>) -> (Arc<InjectedHost>, Connector) {
    let host = Arc::new(InjectedHost::new());
    host.inject(global, endpoint);
    let connector = Connector::new(host.clone(), test_config());
    (host, connector)
}

/// Wait for the first notification matching `pred`.
pub async fn next_event<F>(rx: &mut broadcast::Receiver<ConnectorEvent>, pred: F) -> ConnectorEvent
where
    F: Fn(&ConnectorEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("notification stream ended: {e}"),
            }
        }
    })
    .await
    .expect("notification")
}
