//! ConnectionState and its transitions. Only the connector mutates it, always
//! under its lock and without yielding mid-update.

use crate::error::ConnectorError;
use crate::registry::DetectedEndpoint;
use crate::validate::{filter_addresses, is_valid_address, is_valid_chain_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub active_endpoint: Option<DetectedEndpoint>,
    /// Endpoint order; the first entry is the primary account.
    pub accounts: Vec<String>,
    pub chain_id: Option<String>,
    pub last_error: Option<ConnectorError>,
    pub connected_at: Option<DateTime<Utc>>,
}

/// Result of applying an accounts-changed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountsOutcome {
    Replaced(Vec<String>),
    /// No valid account left: access was revoked.
    Revoked,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn primary_account(&self) -> Option<&str> {
        self.accounts.first().map(String::as_str)
    }

    /// Holds for every state reachable through the transitions below.
    pub fn invariants_hold(&self) -> bool {
        let connected_shape = self.active_endpoint.is_some()
            && !self.accounts.is_empty()
            && self.chain_id.is_some();
        let connected_ok = (self.status == ConnectionStatus::Connected) == connected_shape;
        let disconnected_ok = self.status != ConnectionStatus::Disconnected
            || (self.active_endpoint.is_none() && self.accounts.is_empty());
        let chain_ok = self.chain_id.as_deref().map(is_valid_chain_id).unwrap_or(true);
        let accounts_ok = self.accounts.iter().all(|a| is_valid_address(a));
        connected_ok && disconnected_ok && chain_ok && accounts_ok
    }

    pub(crate) fn begin_connecting(&mut self) {
        *self = Self { status: ConnectionStatus::Connecting, ..Self::default() };
    }

    pub(crate) fn commit(&mut self, endpoint: DetectedEndpoint, accounts: Vec<String>, chain_id: String) {
        *self = Self {
            status: ConnectionStatus::Connected,
            active_endpoint: Some(endpoint),
            accounts,
            chain_id: Some(chain_id),
            last_error: None,
            connected_at: Some(Utc::now()),
        };
    }

    pub(crate) fn fail(&mut self, err: ConnectorError) {
        *self = Self { status: ConnectionStatus::Error, last_error: Some(err), ..Self::default() };
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Endpoint-driven disconnect: back to initial, keeping the reason.
    pub(crate) fn disconnected_by(&mut self, err: ConnectorError) {
        *self = Self { last_error: Some(err), ..Self::default() };
    }

    pub(crate) fn apply_accounts(&mut self, reported: &[String]) -> AccountsOutcome {
        let valid = filter_addresses(reported);
        if valid.is_empty() {
            self.reset();
            return AccountsOutcome::Revoked;
        }
        self.accounts = valid.clone();
        AccountsOutcome::Replaced(valid)
    }

    /// Replace the chain id if `candidate` is valid; otherwise leave state alone.
    pub(crate) fn apply_chain(&mut self, candidate: &str) -> bool {
        if !is_valid_chain_id(candidate) {
            return false;
        }
        self.chain_id = Some(candidate.to_string());
        true
    }

    pub fn to_json(&self) -> Value {
        json!({
            "status": self.status.as_str(),
            "endpoint": self.active_endpoint.as_ref().map(|e| e.id().as_str()),
            "accounts": self.accounts,
            "chain_id": self.chain_id,
            "last_error": self.last_error.as_ref().map(ConnectorError::to_json),
            "connected_at": self.connected_at.map(|t| t.to_rfc3339()),
        })
    }
}
