//! Nonce resolution for the replacement.
//!
//! The replacement must reuse the nonce of the stuck transaction. Two sources
//! can report it and they disagree on purpose:
//!
//! - **Wallet**: the signer's own count at the `latest` tag. With one stuck
//!   transaction this is exactly the stuck nonce, which is what we want.
//! - **Node**: the count at the `pending` tag. This already includes the stuck
//!   transaction, so it is one ahead; it is only a fallback when no wallet can
//!   answer.
//!
//! ## Manual override
//!
//! ```text
//!   auto ──(user types)──► manual ──(explicit fetch)──► auto
//!     ▲                      │
//!     └── apply_auto ────────┘ (ignored while manual)
//! ```

use std::sync::Arc;

use alloy::primitives::Address;
use tracing::{debug, info, warn};

use crate::{
    connection::first_account,
    ext::{NodeConnector, ReplaceError, RpcEndpoint, WalletCallError, WalletClient},
};

// ============================================================================
// ResolvedNonce
// ============================================================================

/// Where a resolved nonce came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceSource {
    Wallet,
    Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedNonce {
    pub value: u64,
    pub source: NonceSource,
}

// ============================================================================
// NonceResolver
// ============================================================================

/// Wallet-first nonce lookup with a node fallback.
#[derive(Clone)]
pub struct NonceResolver {
    connector: Arc<dyn NodeConnector>,
}

impl NonceResolver {
    pub fn new(connector: Arc<dyn NodeConnector>) -> Self {
        Self { connector }
    }

    /// Resolve the nonce to reuse for `account`.
    ///
    /// Wallet failures are logged and fall through to the node. Only when the
    /// node also fails (or no endpoint is configured) is an error returned.
    pub async fn resolve(
        &self,
        account: Address,
        wallet: Option<&WalletClient>,
        endpoint: Option<&RpcEndpoint>,
    ) -> Result<ResolvedNonce, ReplaceError> {
        if let Some(wallet) = wallet {
            match self.from_wallet(wallet).await {
                Ok(Some(value)) => {
                    debug!(%account, nonce = value, "nonce from wallet");
                    return Ok(ResolvedNonce {
                        value,
                        source: NonceSource::Wallet,
                    });
                }
                Ok(None) => debug!(%account, "wallet returned no accounts, using node"),
                Err(e) => warn!(%account, error = %e, "wallet nonce lookup failed, using node"),
            }
        }

        let endpoint = endpoint.ok_or_else(|| {
            ReplaceError::NonceFetchFailed("no RPC URL configured".to_string())
        })?;
        let client = self
            .connector
            .connect(endpoint)
            .map_err(|e| ReplaceError::NonceFetchFailed(e.to_string()))?;
        let value = client
            .pending_transaction_count(account)
            .await
            .map_err(|e| ReplaceError::NonceFetchFailed(e.to_string()))?;

        info!(%account, nonce = value, "nonce from node (pending)");
        Ok(ResolvedNonce {
            value,
            source: NonceSource::Node,
        })
    }

    /// `Ok(None)` when the wallet is reachable but has no authorized account.
    async fn from_wallet(&self, wallet: &WalletClient) -> Result<Option<u64>, ReplaceError> {
        let wallet_err = |e: WalletCallError| ReplaceError::NonceFetchFailed(e.message());

        wallet.request_accounts().await.map_err(wallet_err)?;
        let accounts = wallet.accounts().await.map_err(wallet_err)?;
        if accounts.is_empty() {
            return Ok(None);
        }
        let address = first_account(&accounts)?;
        let nonce = wallet.signer_nonce(address).await.map_err(wallet_err)?;
        Ok(Some(nonce))
    }
}

// ============================================================================
// NonceField
// ============================================================================

/// The nonce input and whether the user has taken it over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NonceField {
    text: String,
    manual: bool,
}

impl NonceField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_manual(&self) -> bool {
        self.manual
    }

    /// User edit. Any non-empty text marks the field manual; clearing it does not.
    pub fn edit(&mut self, text: impl Into<String>) {
        self.text = text.into();
        if !self.text.is_empty() {
            self.manual = true;
        }
    }

    /// Result of a background fetch. Returns `false` when ignored because the
    /// user owns the field.
    pub fn apply_auto(&mut self, nonce: u64) -> bool {
        if self.manual {
            return false;
        }
        self.text = nonce.to_string();
        true
    }

    /// Result of an explicit fetch: always applied, hands the field back.
    pub fn apply_explicit(&mut self, nonce: u64) {
        self.text = nonce.to_string();
        self.manual = false;
    }

    /// Parsed value, `None` when empty or not a number.
    pub fn value(&self) -> Option<u64> {
        self.text.trim().parse().ok()
    }
}
