//! InjectedHost - in-memory global namespace fed by a host bridge

use super::{CapabilityHandle, HostEnvironment};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Globals keyed by property name. Injecting emits a signal watchers react to.
pub struct InjectedHost {
    globals: RwLock<HashMap<String, Arc<dyn CapabilityHandle>>>,
    signals: broadcast::Sender<String>,
}

impl Default for InjectedHost {
    fn default() -> Self { Self::new() }
}

impl InjectedHost {
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(16);
        Self { globals: RwLock::new(HashMap::new()), signals }
    }

    /// Install `handle` under `name`, replacing any previous object.
    pub fn inject(&self, name: impl Into<String>, handle: Arc<dyn CapabilityHandle>) {
        let name = name.into();
        if let Ok(mut globals) = self.globals.write() {
            globals.insert(name.clone(), handle);
        }
        tracing::debug!("endpoint injected at '{}'", name);
        let _ = self.signals.send(name);
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn CapabilityHandle>> {
        self.globals.write().ok()?.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.globals
            .read()
            .map(|g| g.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl HostEnvironment for InjectedHost {
    fn global(&self, name: &str) -> Option<Arc<dyn CapabilityHandle>> {
        self.globals.read().ok()?.get(name).cloned()
    }

    fn injections(&self) -> Option<broadcast::Receiver<String>> {
        Some(self.signals.subscribe())
    }
}
