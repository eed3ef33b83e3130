//! Gas pricing for replacement transactions.
//!
//! A node only accepts a replacement that outbids the pending transaction at
//! the same nonce, so the suggested price is the pending price plus a premium.
//! All arithmetic is done in integer wei; decimal strings only appear at the
//! edges (form input and display).

use alloy::primitives::{
    utils::{format_units, parse_units},
    U256,
};

use crate::config::TRANSFER_GAS_LIMIT;

const WEI_PER_GWEI: u64 = 1_000_000_000;

/// Wei per displayed unit of the 6-decimal ether total.
const WEI_PER_MICRO_ETHER: u64 = 1_000_000_000_000;

// ============================================================================
// Unit conversion
// ============================================================================

fn parse_non_negative(raw: &str, unit: &str) -> Option<U256> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('-') {
        return None;
    }
    parse_units(raw, unit).ok().map(|units| units.get_absolute())
}

/// Parse a decimal gwei amount into wei. Rejects empty, negative and malformed input.
pub fn parse_gwei(raw: &str) -> Option<U256> {
    parse_non_negative(raw, "gwei")
}

/// Parse a decimal ether amount into wei. Rejects empty, negative and malformed input.
pub fn parse_ether(raw: &str) -> Option<U256> {
    parse_non_negative(raw, "ether")
}

/// Trim trailing zeros but keep one fractional digit: `20.000000000` → `20.0`.
fn trim_decimal(formatted: String) -> String {
    match formatted.split_once('.') {
        Some((int, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                format!("{int}.0")
            } else {
                format!("{int}.{frac}")
            }
        }
        None => format!("{formatted}.0"),
    }
}

/// Render wei as gwei, e.g. `"20.0"` or `"1.5"`.
pub fn format_gwei(wei: U256) -> String {
    format_units(wei, "gwei")
        .map(trim_decimal)
        .unwrap_or_else(|_| wei.to_string())
}

/// Render wei as ether, e.g. `"0.0"` or `"0.25"`.
pub fn format_ether(wei: U256) -> String {
    format_units(wei, "ether")
        .map(trim_decimal)
        .unwrap_or_else(|_| wei.to_string())
}

/// Render wei as ether with exactly six decimals, rounding half up.
pub fn format_ether_6(wei: U256) -> String {
    let unit = U256::from(WEI_PER_MICRO_ETHER);
    let micro = wei.saturating_add(unit / U256::from(2)) / unit;
    let million = U256::from(1_000_000u64);
    format!("{}.{:0>6}", micro / million, (micro % million).to_string())
}

// ============================================================================
// Suggestions
// ============================================================================

/// `round(wei * (100 + premium) / 100)` expressed as whole gwei, or `None`
/// when the price is too large to raise.
fn with_premium_gwei(wei: U256, premium_percent: u64) -> Option<String> {
    let denominator = U256::from(100 * WEI_PER_GWEI);
    let rounded = wei
        .checked_mul(U256::from(100).checked_add(U256::from(premium_percent))?)?
        .checked_add(denominator / U256::from(2))?;
    Some((rounded / denominator).to_string())
}

/// Suggested replacement gas price over a pending transaction's price (gwei string).
///
/// With the default 20% premium this is `round(1.2 * g)` in whole gwei.
pub fn suggest_over_pending(pending_gwei: &str, premium_percent: u64) -> Option<String> {
    parse_gwei(pending_gwei).and_then(|wei| with_premium_gwei(wei, premium_percent))
}

/// Suggested gas price over the current network price (wei), in whole gwei.
pub fn suggest_over_network(network_wei: u128, premium_percent: u64) -> Option<String> {
    with_premium_gwei(U256::from(network_wei), premium_percent)
}

// ============================================================================
// GasEstimate
// ============================================================================

/// Cost preview for the replacement, recomputed on every form change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasEstimate {
    /// Last network gas price seen by an auto-fetch, in gwei
    pub current_network_gas_price_gwei: Option<String>,
    pub estimated_gas_limit: u64,
    /// `gas_price * gas_limit + value`, in ether with six decimals
    pub total_cost_eth: String,
}

impl Default for GasEstimate {
    fn default() -> Self {
        Self {
            current_network_gas_price_gwei: None,
            estimated_gas_limit: TRANSFER_GAS_LIMIT,
            total_cost_eth: format_ether_6(U256::ZERO),
        }
    }
}

/// Compute the cost preview from raw form fields.
///
/// Never fails: an unreadable gas price or value counts as zero, an unreadable
/// or zero gas limit counts as a plain transfer. A total past `U256::MAX`
/// saturates.
pub fn estimate(
    gas_price_gwei: &str,
    gas_limit: &str,
    value_eth: &str,
    current_network_gas_price_gwei: Option<String>,
) -> GasEstimate {
    let gas_price = parse_gwei(gas_price_gwei).unwrap_or(U256::ZERO);
    let value = parse_ether(value_eth).unwrap_or(U256::ZERO);
    let gas_limit = gas_limit
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|limit| *limit > 0)
        .unwrap_or(TRANSFER_GAS_LIMIT);

    let total = gas_price
        .saturating_mul(U256::from(gas_limit))
        .saturating_add(value);

    GasEstimate {
        current_network_gas_price_gwei,
        estimated_gas_limit: gas_limit,
        total_cost_eth: format_ether_6(total),
    }
}
