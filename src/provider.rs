//! Direct node access over JSON-RPC.
//!
//! The wallet is the only signer; the node connection is read-only and is used
//! for the pending transaction count, the network gas price and, where the
//! node exposes it, the transaction pool.
//!
//! ## Architecture
//!
//! ```text
//! form field ──► RpcEndpoint::parse ──► NodeConnector::connect ──► NodeClient
//!                   (sentinel → None)      (HTTP or mocked)         (RootProvider)
//! ```

use std::collections::HashMap;

use alloy::{
    network::Ethereum,
    primitives::{Address, B256, U256, U64},
    providers::{Provider, ProviderBuilder, RootProvider},
    transports::{http::reqwest::Url, TransportResult},
};
use serde::Deserialize;

use crate::{config::UNSET_RPC_URL, ext::ReplaceError};

// ============================================================================
// RpcEndpoint
// ============================================================================

/// A user-supplied RPC URL that is neither empty nor the unset placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpoint(String);

impl RpcEndpoint {
    /// Returns `None` for an empty field or the placeholder value.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == UNSET_RPC_URL {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RpcEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Transaction pool wire format
// ============================================================================

/// Response of `txpool_content`: sender → nonce → transaction.
///
/// Keys are kept as strings; clients differ in address casing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoolContent {
    #[serde(default)]
    pub pending: HashMap<String, HashMap<String, PoolTransaction>>,
    #[serde(default)]
    pub queued: HashMap<String, HashMap<String, PoolTransaction>>,
}

/// The fields of a pooled transaction the prober reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolTransaction {
    pub hash: B256,
    #[serde(default)]
    pub gas_price: Option<U256>,
    #[serde(default)]
    pub max_fee_per_gas: Option<U256>,
    pub gas: U256,
    pub value: U256,
    #[serde(default)]
    pub to: Option<Address>,
    pub from: Address,
    pub nonce: U64,
}

impl PoolTransaction {
    /// Legacy gas price, or the fee cap of a dynamic-fee transaction.
    pub fn effective_gas_price(&self) -> U256 {
        self.gas_price
            .or(self.max_fee_per_gas)
            .unwrap_or(U256::ZERO)
    }
}

// ============================================================================
// NodeClient
// ============================================================================

/// Read-only client for one node endpoint.
#[derive(Clone)]
pub struct NodeClient {
    provider: RootProvider<Ethereum>,
}

impl NodeClient {
    pub fn from_provider(provider: RootProvider<Ethereum>) -> Self {
        Self { provider }
    }

    /// Connect over HTTP.
    pub fn connect_http(endpoint: &RpcEndpoint) -> Result<Self, ReplaceError> {
        let url = endpoint
            .as_str()
            .parse::<Url>()
            .map_err(|e| ReplaceError::InvalidInput(format!("invalid RPC URL {endpoint}: {e}")))?;
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_http(url);
        Ok(Self { provider })
    }

    pub fn provider(&self) -> &RootProvider<Ethereum> {
        &self.provider
    }

    /// Transaction count at the `pending` tag: includes queued, unmined transactions.
    pub async fn pending_transaction_count(&self, address: Address) -> TransportResult<u64> {
        self.provider.get_transaction_count(address).pending().await
    }

    /// Transaction count at the `latest` tag: mined transactions only.
    pub async fn latest_transaction_count(&self, address: Address) -> TransportResult<u64> {
        self.provider.get_transaction_count(address).latest().await
    }

    /// Current network gas price in wei.
    pub async fn gas_price(&self) -> TransportResult<u128> {
        self.provider.get_gas_price().await
    }

    /// Full pool contents. Many hosted endpoints do not expose this method.
    pub async fn txpool_content(&self) -> TransportResult<PoolContent> {
        self.provider
            .raw_request::<_, PoolContent>("txpool_content".into(), ())
            .await
    }
}

// ============================================================================
// NodeConnector
// ============================================================================

/// Opens node connections for an endpoint.
pub trait NodeConnector: Send + Sync {
    fn connect(&self, endpoint: &RpcEndpoint) -> Result<NodeClient, ReplaceError>;
}

/// Default connector: plain HTTP JSON-RPC.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpConnector;

impl NodeConnector for HttpConnector {
    fn connect(&self, endpoint: &RpcEndpoint) -> Result<NodeClient, ReplaceError> {
        NodeClient::connect_http(endpoint)
    }
}
