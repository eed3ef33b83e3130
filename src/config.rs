//! Runtime configuration for discovery, auto-fetch and submission.
//!
//! Everything here lives in memory. There are no config files, environment
//! variables or CLI flags; callers start from `ReplacerConfig::default()` and
//! adjust with the `with_*` builders.

use std::time::Duration;

/// Placeholder RPC URL shown in an untouched form.
///
/// An endpoint equal to this value (exact match) is treated as unset and never
/// contacted.
pub const UNSET_RPC_URL: &str = "https://eth-mainnet.g.alchemy.com/v2/YOUR_API_KEY";

/// Gas limit of a plain value transfer.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// EIP-1193 error code for a request the user declined in the wallet.
pub const USER_REJECTED_CODE: i64 = 4001;

/// Configuration for the replacement workflow.
#[derive(Debug, Clone)]
pub struct ReplacerConfig {
    /// How long wallet announcements are collected (default: 1 second)
    pub discovery_window: Duration,
    /// Quiet period after an RPC URL edit before nonce/gas/pending data is fetched (default: 1 second)
    pub auto_fetch_debounce: Duration,
    /// Premium over the pending or network gas price, in percent (default: 20)
    pub gas_premium_percent: u64,
    /// Interval between receipt polls while awaiting confirmation (default: 4 seconds)
    pub confirmation_poll_interval: Duration,
    /// RPC URL the form starts with (default: the unset placeholder)
    pub default_rpc_url: String,
    /// Gas price the form starts with, in gwei (default: "50")
    pub default_gas_price_gwei: String,
    /// Gas limit the form starts with (default: 21000)
    pub default_gas_limit: u64,
}

impl Default for ReplacerConfig {
    fn default() -> Self {
        Self {
            discovery_window: Duration::from_secs(1),
            auto_fetch_debounce: Duration::from_secs(1),
            gas_premium_percent: 20,
            confirmation_poll_interval: Duration::from_secs(4),
            default_rpc_url: UNSET_RPC_URL.to_string(),
            default_gas_price_gwei: "50".to_string(),
            default_gas_limit: TRANSFER_GAS_LIMIT,
        }
    }
}

impl ReplacerConfig {
    /// Set the wallet announcement window
    pub fn with_discovery_window(mut self, window: Duration) -> Self {
        self.discovery_window = window;
        self
    }

    /// Set the auto-fetch debounce period
    pub fn with_auto_fetch_debounce(mut self, debounce: Duration) -> Self {
        self.auto_fetch_debounce = debounce;
        self
    }

    /// Set the replacement gas premium in percent
    pub fn with_gas_premium_percent(mut self, percent: u64) -> Self {
        self.gas_premium_percent = percent;
        self
    }

    /// Set the receipt polling interval
    pub fn with_confirmation_poll_interval(mut self, interval: Duration) -> Self {
        self.confirmation_poll_interval = interval;
        self
    }

    /// Set the RPC URL a new form starts with
    pub fn with_default_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.default_rpc_url = url.into();
        self
    }

    pub fn with_default_gas_price_gwei(mut self, gwei: impl Into<String>) -> Self {
        self.default_gas_price_gwei = gwei.into();
        self
    }

    pub fn with_default_gas_limit(mut self, gas_limit: u64) -> Self {
        self.default_gas_limit = gas_limit;
        self
    }
}
