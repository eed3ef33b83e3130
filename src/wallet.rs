//! Wallet providers: the EIP-1193 request seam and a typed client over it.
//!
//! A wallet provider is an external agent (typically a browser extension)
//! that holds keys and answers JSON-RPC style requests. The crate never signs;
//! everything that needs a signature goes through [`WalletProvider::request`].
//!
//! ## Identity
//!
//! Several providers can be injected at once and two of them may report the
//! same name. A [`ProviderHandle`] therefore compares by instance, never by
//! metadata.

use std::{fmt, sync::Arc};

use alloy::{
    primitives::{Address, B256, U64},
    rpc::types::TransactionRequest,
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

// ============================================================================
// EIP-1193 seam
// ============================================================================

/// Error object returned by an EIP-1193 provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct ProviderRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProviderRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// Capability markers a provider may expose (`isMetaMask`, `isBraveWallet`, ...).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderFlags {
    pub is_metamask: bool,
    pub is_coinbase_wallet: bool,
    pub is_brave_wallet: bool,
    pub is_trust_wallet: bool,
}

/// A wallet reachable through request-based method dispatch.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Dispatch one request. May stay pending until the user acts in the wallet.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError>;

    /// Identity markers used when no richer metadata is announced.
    fn flags(&self) -> ProviderFlags {
        ProviderFlags::default()
    }
}

/// Shared handle to a provider instance.
#[derive(Clone)]
pub struct ProviderHandle(Arc<dyn WalletProvider>);

impl ProviderHandle {
    pub fn new<P: WalletProvider + 'static>(provider: P) -> Self {
        Self(Arc::new(provider))
    }

    pub fn from_arc(provider: Arc<dyn WalletProvider>) -> Self {
        Self(provider)
    }

    /// True when both handles point at the same provider instance.
    pub fn same_instance(&self, other: &ProviderHandle) -> bool {
        // Compare data pointers only; vtable pointers may differ across codegen units.
        std::ptr::eq(
            Arc::as_ptr(&self.0) as *const (),
            Arc::as_ptr(&other.0) as *const (),
        )
    }

    pub fn flags(&self) -> ProviderFlags {
        self.0.flags()
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        self.0.request(method, params).await
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProviderHandle")
            .field(&(Arc::as_ptr(&self.0) as *const ()))
            .finish()
    }
}

// ============================================================================
// WalletKind
// ============================================================================

/// The wallets the registry knows by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletKind {
    MetaMask,
    Coinbase,
    Brave,
    Trust,
    Unknown,
}

impl WalletKind {
    /// Wallets offered as install suggestions when nothing is detected.
    pub const KNOWN: [WalletKind; 4] = [
        WalletKind::MetaMask,
        WalletKind::Coinbase,
        WalletKind::Brave,
        WalletKind::Trust,
    ];

    /// Classify a provider from its capability markers.
    ///
    /// Brave also sets `isMetaMask` for compatibility, so it is checked first.
    pub fn classify(flags: ProviderFlags) -> Self {
        if flags.is_brave_wallet {
            WalletKind::Brave
        } else if flags.is_coinbase_wallet {
            WalletKind::Coinbase
        } else if flags.is_trust_wallet {
            WalletKind::Trust
        } else if flags.is_metamask {
            WalletKind::MetaMask
        } else {
            WalletKind::Unknown
        }
    }

    /// Match an announced identifier (rdns or name) against known wallets.
    pub fn from_identifier(identifier: &str) -> Self {
        let key = identifier.to_lowercase();
        if key.contains("metamask") {
            WalletKind::MetaMask
        } else if key.contains("coinbase") {
            WalletKind::Coinbase
        } else if key.contains("brave") {
            WalletKind::Brave
        } else if key.contains("trust") {
            WalletKind::Trust
        } else {
            WalletKind::Unknown
        }
    }

    /// Normalized id; `None` for unknown wallets, which derive their own slug.
    pub fn id(&self) -> Option<&'static str> {
        match self {
            WalletKind::MetaMask => Some("metamask"),
            WalletKind::Coinbase => Some("coinbase"),
            WalletKind::Brave => Some("brave"),
            WalletKind::Trust => Some("trust"),
            WalletKind::Unknown => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            WalletKind::MetaMask => "MetaMask",
            WalletKind::Coinbase => "Coinbase Wallet",
            WalletKind::Brave => "Brave Wallet",
            WalletKind::Trust => "Trust Wallet",
            WalletKind::Unknown => "Injected Wallet",
        }
    }

    pub fn install_url(&self) -> Option<&'static str> {
        match self {
            WalletKind::MetaMask => Some("https://metamask.io/download/"),
            WalletKind::Coinbase => Some("https://www.coinbase.com/wallet/downloads"),
            WalletKind::Brave => Some("https://brave.com/wallet/"),
            WalletKind::Trust => Some("https://trustwallet.com/download"),
            WalletKind::Unknown => None,
        }
    }
}

/// Lower-case slug of an arbitrary identifier: runs of non-alphanumerics become `-`.
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

// ============================================================================
// WalletClient
// ============================================================================

/// Failure of a typed wallet call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WalletCallError {
    #[error(transparent)]
    Rpc(#[from] ProviderRpcError),
    #[error("unexpected response to {method}: {reason}")]
    Decode { method: &'static str, reason: String },
}

impl WalletCallError {
    pub fn code(&self) -> Option<i64> {
        match self {
            WalletCallError::Rpc(e) => Some(e.code),
            WalletCallError::Decode { .. } => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            WalletCallError::Rpc(e) => e.message.clone(),
            other => other.to_string(),
        }
    }
}

/// Confirmation data read from a transaction receipt.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptSummary {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub status: Option<U64>,
}

impl ReceiptSummary {
    /// Post-Byzantium status; receipts without one count as success.
    pub fn succeeded(&self) -> bool {
        self.status.map(|s| s != U64::ZERO).unwrap_or(true)
    }
}

/// Typed access to the wallet methods the workflow uses.
#[derive(Clone, Debug)]
pub struct WalletClient {
    provider: ProviderHandle,
}

impl WalletClient {
    pub fn new(provider: ProviderHandle) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &ProviderHandle {
        &self.provider
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<R, WalletCallError> {
        let value = self.provider.request(method, params).await?;
        serde_json::from_value(value).map_err(|e| WalletCallError::Decode {
            method,
            reason: e.to_string(),
        })
    }

    /// `eth_requestAccounts`: prompts the user when the site is not yet authorized.
    pub async fn request_accounts(&self) -> Result<Vec<String>, WalletCallError> {
        self.call("eth_requestAccounts", json!([])).await
    }

    /// `eth_accounts`: currently authorized accounts, no prompt.
    pub async fn accounts(&self) -> Result<Vec<String>, WalletCallError> {
        self.call("eth_accounts", json!([])).await
    }

    /// The nonce the wallet's signer reports for `address`.
    ///
    /// Uses the `latest` tag, which is what a signer asks for by default. For an
    /// account with one stuck transaction this equals the stuck transaction's nonce.
    pub async fn signer_nonce(&self, address: Address) -> Result<u64, WalletCallError> {
        let count: U64 = self
            .call("eth_getTransactionCount", json!([address, "latest"]))
            .await?;
        Ok(count.to::<u64>())
    }

    pub async fn chain_id(&self) -> Result<u64, WalletCallError> {
        let chain_id: U64 = self.call("eth_chainId", json!([])).await?;
        Ok(chain_id.to::<u64>())
    }

    /// Hand a transaction to the wallet for signing and broadcast.
    pub async fn send_transaction(&self, tx: &TransactionRequest) -> Result<B256, WalletCallError> {
        self.call("eth_sendTransaction", json!([tx])).await
    }

    pub async fn transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<ReceiptSummary>, WalletCallError> {
        self.call("eth_getTransactionReceipt", json!([hash])).await
    }
}
