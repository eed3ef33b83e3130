//! # tx-replacer
//!
//! Replace a stuck Ethereum transaction by re-sending the account's nonce as a
//! zero-value self-transfer at a higher gas price. Built on Alloy.
//!
//! ## Core Features
//!
//! - **Wallet Discovery**: EIP-6963 announcements, multi-provider arrays and the
//!   legacy single provider, deduplicated by provider instance
//! - **Nonce Resolution**: wallet-reported nonce first, node `pending` count as
//!   fallback, with a manual override that auto-fetch never overwrites
//! - **Pending Probe**: `txpool_content` lookup of the transaction at the nonce,
//!   with a 20% gas price premium suggestion
//! - **Forced-Nonce Submission**: the replacement always carries the requested
//!   nonce, even when the wallet expects another one
//!
//! ## Usage
//!
//! ```ignore
//! use tx_replacer::ext::*;
//!
//! let discovery = discover_wallets(&host, config.discovery_window).await;
//! let wallet = discovery.get("metamask").ok_or(ReplaceError::WalletNotFound)?;
//! let connection = WalletConnector::new().connect(wallet).await?;
//!
//! let form = ReplacementForm::for_connection(config, &connection, Arc::new(HttpConnector));
//! form.set_rpc_url("http://localhost:8545");
//! let receipt = form.submit().await?;
//! ```

// ============================================================================
// Internal Module Declarations
// ============================================================================

/// Timing windows, gas premium and form defaults
mod config;

/// Wallet connection attempts and connection state
mod connection;

/// Error taxonomy and RPC error classification
mod error;

/// Block explorer links for submitted transactions
mod explorer;

/// Replacement form workflow: debounced auto-fetch, manual nonce, submit
mod form;

/// Gas cost estimate and replacement price suggestions
mod gas;

/// Wallet-first nonce resolution and manual override tracking
mod nonce;

/// Transaction pool probe for the transaction pending at a nonce
mod pending_tx;

/// Read-only node access over JSON-RPC
mod provider;

/// Wallet discovery and deduplication
mod registry;

/// Replacement validation, submission and confirmation
mod replacement;

/// EIP-1193 provider seam and typed wallet client
mod wallet;

/// Test harness module (compiled only in test mode)
#[cfg(test)]
pub mod test_harness;

// ============================================================================
// Public Exports
// ============================================================================

/// Re-export all public APIs from the alloy crate.
pub use alloy::*;

/// Everything needed to drive a replacement:
///
/// - `discover_wallets` / `DiscoverySession` - wallet discovery
/// - `WalletConnector` / `ConnectionState` - connecting a wallet
/// - `NonceResolver` / `NonceField` - nonce lookup and manual override
/// - `probe_pending` / `ProbeTracker` - pending transaction lookup
/// - `estimate` / `suggest_over_pending` - gas estimate and suggestion
/// - `Submitter` / `SubmissionState` - forced-nonce submission
/// - `ReplacementForm` - the whole workflow behind one form
pub mod ext {
    pub use super::config::*;
    pub use super::connection::*;
    pub use super::error::*;
    pub use super::explorer::*;
    pub use super::form::*;
    pub use super::gas::*;
    pub use super::nonce::*;
    pub use super::pending_tx::*;
    pub use super::provider::*;
    pub use super::registry::*;
    pub use super::replacement::*;
    pub use super::wallet::*;
}
