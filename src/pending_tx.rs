//! Lookup of the transaction currently pending at a nonce.
//!
//! The only portable way to see another client's unmined transaction is the
//! non-standard `txpool_content` method. Geth, Erigon, Reth and Anvil expose
//! it; most hosted endpoints do not. A probe therefore never fails: when the
//! pool cannot be read the answer is simply "nothing found", and a nonce
//! position diagnostic is logged instead.
//!
//! Probes race each other when the nonce or URL changes quickly. Each probe
//! takes a generation from a [`ProbeTracker`] and its result is applied only if
//! no newer probe has started since.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use alloy::primitives::{Address, B256, U256};
use tracing::{debug, info};

use crate::ext::{
    classify_rpc_error, format_ether, format_gwei, NodeClient, NodeConnector, PoolTransaction,
    ReplaceError, RpcEndpoint,
};

// ============================================================================
// PendingTransactionInfo
// ============================================================================

/// A pooled transaction sharing the replacement's sender and nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransactionInfo {
    pub hash: B256,
    /// Legacy gas price, or the fee cap of a dynamic-fee transaction, in gwei
    pub gas_price_gwei: String,
    pub gas_limit: String,
    pub value_eth: String,
    /// `None` for contract creation
    pub to: Option<Address>,
    pub from: Address,
    pub nonce: u64,
}

impl From<&PoolTransaction> for PendingTransactionInfo {
    fn from(tx: &PoolTransaction) -> Self {
        Self {
            hash: tx.hash,
            gas_price_gwei: format_gwei(tx.effective_gas_price()),
            gas_limit: tx.gas.to_string(),
            value_eth: format_ether(tx.value),
            to: tx.to,
            from: tx.from,
            nonce: tx.nonce.to::<u64>(),
        }
    }
}

/// Where a nonce sits relative to the account's mined transaction count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoncePosition {
    /// Already used by a mined transaction
    Past,
    /// The next nonce to be mined; a stuck transaction would sit here
    Current,
    /// Beyond the next nonce; would leave a gap
    Future,
}

impl NoncePosition {
    pub fn of(nonce: u64, latest_count: u64) -> Self {
        match nonce.cmp(&latest_count) {
            std::cmp::Ordering::Less => NoncePosition::Past,
            std::cmp::Ordering::Equal => NoncePosition::Current,
            std::cmp::Ordering::Greater => NoncePosition::Future,
        }
    }
}

// ============================================================================
// Probe
// ============================================================================

/// Find the first transaction from `account` at `nonce`, looking in the
/// pending section before the queued one.
fn find_in_pool(
    sections: [&HashMap<String, HashMap<String, PoolTransaction>>; 2],
    account: Address,
    nonce: u64,
) -> Option<&PoolTransaction> {
    sections.into_iter().find_map(|section| {
        let by_nonce = section.iter().find_map(|(sender, txs)| {
            sender
                .parse::<Address>()
                .ok()
                .filter(|sender| *sender == account)
                .map(|_| txs)
        })?;
        by_nonce
            .iter()
            .find(|(key, _)| key.trim().parse::<u64>().ok() == Some(nonce))
            .map(|(_, tx)| tx)
    })
}

/// Probe the node's pool for a transaction from `account` at `nonce`.
///
/// An empty or placeholder `rpc_url` returns `None` without opening a connection.
pub async fn probe_pending(
    connector: &dyn NodeConnector,
    rpc_url: &str,
    account: Address,
    nonce: u64,
) -> Option<PendingTransactionInfo> {
    let endpoint = RpcEndpoint::parse(rpc_url)?;

    let client = match connector.connect(&endpoint) {
        Ok(client) => client,
        Err(e) => {
            debug!(endpoint = %endpoint, error = %e, "pending probe skipped");
            return None;
        }
    };

    match client.txpool_content().await {
        Ok(content) => match find_in_pool([&content.pending, &content.queued], account, nonce) {
            Some(tx) => {
                let info = PendingTransactionInfo::from(tx);
                info!(
                    %account,
                    nonce,
                    hash = %info.hash,
                    gas_price_gwei = %info.gas_price_gwei,
                    max_cost_wei = %max_cost_wei(tx),
                    "found pending transaction"
                );
                Some(info)
            }
            None => {
                debug!(%account, nonce, "no pending transaction at nonce");
                None
            }
        },
        Err(e) => {
            let kind = classify_rpc_error(&e);
            let error = ReplaceError::PendingProbeUnsupported(e.to_string());
            debug!(%account, nonce, ?kind, %error, "transaction pool not readable");
            log_nonce_position(&client, account, nonce).await;
            None
        }
    }
}

/// Diagnostic only: report where `nonce` sits relative to the mined count.
async fn log_nonce_position(client: &NodeClient, account: Address, nonce: u64) {
    match client.latest_transaction_count(account).await {
        Ok(latest) => {
            let position = NoncePosition::of(nonce, latest);
            debug!(%account, nonce, latest, ?position, "nonce position");
        }
        Err(e) => debug!(%account, nonce, error = %e, "nonce position unavailable"),
    }
}

// ============================================================================
// ProbeTracker
// ============================================================================

/// Monotonic probe generations; only the newest probe may publish its result.
#[derive(Debug, Default)]
pub struct ProbeTracker {
    generation: AtomicU64,
}

impl ProbeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a probe and return its generation.
    pub fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// True when no probe has started since `generation`.
    pub fn is_latest(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }
}

/// Upper bound of what a pooled transaction can spend, in wei.
pub fn max_cost_wei(tx: &PoolTransaction) -> U256 {
    tx.effective_gas_price() * tx.gas + tx.value
}
