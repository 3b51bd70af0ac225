//! Provider Registry - which wallet endpoints are present right now
//!
//! # Detection
//!
//! | Identity | Global | Marker |
//! |----------|--------|--------|
//! | MetaMask | `ethereum` | `isMetaMask` |
//! | CoinbaseWallet | `coinbaseWalletExtension` | `isCoinbaseWallet` |
//! | Rabby | `rabby` | `isRabby` |
//! | TrustWallet | `trustwallet` | `isTrust` |
//! | OkxWallet | `okxwallet` | `isOkxWallet` |
//! | BraveWallet | `braveEthereum` | `isBraveWallet` |
//! | Injected | `ethereum` | none (catch-all) |
//!
//! An object is accepted when it has a callable `request` and its marker is
//! present, whether `true` or `false`. Some wallets ship a `false` marker on
//! the object that is still theirs.

mod watcher;

pub use watcher::ProviderWatcher;

use crate::endpoint::{CapabilityHandle, HostEnvironment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointId {
    MetaMask,
    CoinbaseWallet,
    Rabby,
    TrustWallet,
    OkxWallet,
    BraveWallet,
    Injected,
}

impl EndpointId {
    pub const ALL: [EndpointId; 7] = [
        EndpointId::MetaMask,
        EndpointId::CoinbaseWallet,
        EndpointId::Rabby,
        EndpointId::TrustWallet,
        EndpointId::OkxWallet,
        EndpointId::BraveWallet,
        EndpointId::Injected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointId::MetaMask => "metamask",
            EndpointId::CoinbaseWallet => "coinbase",
            EndpointId::Rabby => "rabby",
            EndpointId::TrustWallet => "trust",
            EndpointId::OkxWallet => "okx",
            EndpointId::BraveWallet => "brave",
            EndpointId::Injected => "injected",
        }
    }

    pub fn identity(&self) -> EndpointIdentity {
        let (global, marker) = match self {
            EndpointId::MetaMask => ("ethereum", Some("isMetaMask")),
            EndpointId::CoinbaseWallet => ("coinbaseWalletExtension", Some("isCoinbaseWallet")),
            EndpointId::Rabby => ("rabby", Some("isRabby")),
            EndpointId::TrustWallet => ("trustwallet", Some("isTrust")),
            EndpointId::OkxWallet => ("okxwallet", Some("isOkxWallet")),
            EndpointId::BraveWallet => ("braveEthereum", Some("isBraveWallet")),
            EndpointId::Injected => ("ethereum", None),
        };
        EndpointIdentity { id: *self, global_property: global, marker_property: marker }
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointId {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "metamask" => Ok(EndpointId::MetaMask),
            "coinbase" | "coinbasewallet" => Ok(EndpointId::CoinbaseWallet),
            "rabby" => Ok(EndpointId::Rabby),
            "trust" | "trustwallet" => Ok(EndpointId::TrustWallet),
            "okx" | "okxwallet" => Ok(EndpointId::OkxWallet),
            "brave" | "bravewallet" => Ok(EndpointId::BraveWallet),
            "injected" | "generic" | "custom" => Ok(EndpointId::Injected),
            _ => Err(()),
        }
    }
}

/// Static detection pattern for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointIdentity {
    pub id: EndpointId,
    pub global_property: &'static str,
    /// `None` for the catch-all identity.
    pub marker_property: Option<&'static str>,
}

/// Conservative capability flags, all derived from a callable `request`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCapabilities {
    pub request: bool,
    pub sign_message: bool,
    pub sign_typed_data: bool,
    pub send_transaction: bool,
    pub wallet_switch: bool,
    /// Most endpoints reject JSON-RPC batches.
    pub batch_requests: bool,
}

impl EndpointCapabilities {
    fn derive(has_request: bool) -> Self {
        Self {
            request: has_request,
            sign_message: has_request,
            sign_typed_data: has_request,
            send_transaction: has_request,
            wallet_switch: has_request,
            batch_requests: false,
        }
    }
}

/// One endpoint found by a scan. Snapshots are rebuilt, never mutated.
#[derive(Clone)]
pub struct DetectedEndpoint {
    pub identity: EndpointIdentity,
    pub handle: Arc<dyn CapabilityHandle>,
    pub capabilities: EndpointCapabilities,
    pub is_connected_hint: bool,
    pub version_hint: String,
    pub detected_at: DateTime<Utc>,
}

impl DetectedEndpoint {
    pub fn id(&self) -> EndpointId {
        self.identity.id
    }

    /// Equality used to decide whether observers need a notification.
    pub fn same_as(&self, other: &DetectedEndpoint) -> bool {
        self.identity.id == other.identity.id && self.is_connected_hint == other.is_connected_hint
    }
}

impl fmt::Debug for DetectedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectedEndpoint")
            .field("id", &self.identity.id)
            .field("capabilities", &self.capabilities)
            .field("is_connected_hint", &self.is_connected_hint)
            .field("version_hint", &self.version_hint)
            .finish()
    }
}

/// True when two scans differ by identity or connected hint.
pub fn endpoints_changed(previous: &[DetectedEndpoint], next: &[DetectedEndpoint]) -> bool {
    previous.len() != next.len() || previous.iter().zip(next).any(|(a, b)| !a.same_as(b))
}

/// Reads the host global namespace into `DetectedEndpoint` snapshots.
#[derive(Clone)]
pub struct ProviderRegistry {
    host: Arc<dyn HostEnvironment>,
    scans: Arc<AtomicU64>,
    verbose: bool,
}

impl ProviderRegistry {
    pub fn new(host: Arc<dyn HostEnvironment>) -> Self {
        Self { host, scans: Arc::new(AtomicU64::new(0)), verbose: false }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self { self.verbose = verbose; self }

    pub fn host(&self) -> &Arc<dyn HostEnvironment> { &self.host }

    /// Number of scans performed so far.
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Snapshot the endpoints currently present. Never fails.
    pub fn scan(&self) -> Vec<DetectedEndpoint> {
        self.scans.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let detected: Vec<DetectedEndpoint> = EndpointId::ALL
            .iter()
            .filter_map(|id| self.detect(id.identity(), now))
            .collect();
        if self.verbose {
            tracing::debug!(
                "scan found {} endpoint(s): {:?}",
                detected.len(),
                detected.iter().map(|e| e.id().as_str()).collect::<Vec<_>>()
            );
        }
        detected
    }

    /// Scan and pick one identity.
    pub fn find(&self, id: EndpointId) -> Option<DetectedEndpoint> {
        self.scan().into_iter().find(|e| e.id() == id)
    }

    fn detect(&self, identity: EndpointIdentity, now: DateTime<Utc>) -> Option<DetectedEndpoint> {
        let handle = self.host.global(identity.global_property)?;
        if !handle.has_request() {
            return None;
        }
        let present = match identity.marker_property {
            None => true,
            Some(marker) => handle.flag(marker).is_some(),
        };
        if !present {
            return None;
        }
        let capabilities = EndpointCapabilities::derive(handle.has_request());
        Some(DetectedEndpoint {
            identity,
            is_connected_hint: handle.is_connected().unwrap_or(false),
            version_hint: handle.version().unwrap_or_else(|| "unknown".into()),
            capabilities,
            handle,
            detected_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_case_insensitively() {
        for id in EndpointId::ALL {
            assert_eq!(id.as_str().to_uppercase().parse::<EndpointId>(), Ok(id));
        }
        assert!("missingEndpoint".parse::<EndpointId>().is_err());
    }

    #[test]
    fn only_the_catch_all_has_no_marker() {
        let unmarked: Vec<_> = EndpointId::ALL
            .iter()
            .filter(|id| id.identity().marker_property.is_none())
            .collect();
        assert_eq!(unmarked, vec![&EndpointId::Injected]);
    }

    #[test]
    fn batch_support_is_never_assumed() {
        let caps = EndpointCapabilities::derive(true);
        assert!(caps.request && caps.sign_typed_data && caps.wallet_switch);
        assert!(!caps.batch_requests);
    }
}
