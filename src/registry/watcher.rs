//! ProviderWatcher - rescans on a timer and on host injection signals

use super::{endpoints_changed, DetectedEndpoint, ProviderRegistry};
use crate::runtime::Shutdown;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

pub type ChangeCallback = Arc<dyn Fn(Vec<DetectedEndpoint>) + Send + Sync>;

/// Keeps the last scan and reports when it changes.
pub struct ProviderWatcher {
    registry: ProviderRegistry,
    interval: Duration,
    last: Mutex<Vec<DetectedEndpoint>>,
    on_change: ChangeCallback,
}

impl ProviderWatcher {
    /// `interval` of zero disables the periodic rescan.
    pub fn new(registry: ProviderRegistry, interval: Duration, on_change: ChangeCallback) -> Self {
        Self { registry, interval, last: Mutex::new(Vec::new()), on_change }
    }

    pub fn endpoints(&self) -> Vec<DetectedEndpoint> {
        self.last.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Rescan now. Returns true when observers were notified.
    pub fn refresh(&self) -> bool {
        let next = self.registry.scan();
        let changed = {
            let Ok(mut last) = self.last.lock() else { return false };
            if endpoints_changed(&last, &next) {
                *last = next.clone();
                true
            } else {
                false
            }
        };
        if changed {
            tracing::info!("endpoints changed: {} present", next.len());
            (self.on_change)(next);
        }
        changed
    }

    /// Initial scan, then rescan until `shutdown` fires.
    pub fn start(self: Arc<Self>, shutdown: &Shutdown) -> JoinHandle<()> {
        let mut stop = shutdown.subscribe();
        let mut injections = self.registry.host().injections();

        tokio::spawn(async move {
            self.refresh();
            let mut ticker = (!self.interval.is_zero()).then(|| {
                let mut t = tokio::time::interval(self.interval);
                t.set_missed_tick_behavior(MissedTickBehavior::Skip);
                t
            });

            loop {
                tokio::select! {
                    _ = stop.recv() => break,
                    _ = next_tick(&mut ticker) => { self.refresh(); }
                    signal = next_injection(&mut injections) => match signal {
                        Some(name) => {
                            tracing::debug!("rescan after injection at '{}'", name);
                            self.refresh();
                        }
                        None => injections = None,
                    },
                }
            }
            tracing::debug!("provider watcher stopped");
        })
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(t) => { t.tick().await; }
        None => std::future::pending::<()>().await,
    }
}

async fn next_injection(rx: &mut Option<broadcast::Receiver<String>>) -> Option<String> {
    let Some(rx) = rx else { return std::future::pending().await };
    match rx.recv().await {
        Ok(name) => Some(name),
        Err(RecvError::Lagged(_)) => Some(String::new()),
        Err(RecvError::Closed) => None,
    }
}
