//! Block explorer links for submitted transactions.

use std::fmt;

use alloy::primitives::B256;

/// Explorer base URL for a chain, if the chain is known.
pub fn explorer_base_url(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("https://etherscan.io"),
        5 => Some("https://goerli.etherscan.io"),
        10 => Some("https://optimistic.etherscan.io"),
        56 => Some("https://bscscan.com"),
        137 => Some("https://polygonscan.com"),
        8453 => Some("https://basescan.org"),
        42161 => Some("https://arbiscan.io"),
        11155111 => Some("https://sepolia.etherscan.io"),
        17000 => Some("https://holesky.etherscan.io"),
        _ => None,
    }
}

pub fn transaction_url(chain_id: u64, hash: B256) -> Option<String> {
    explorer_base_url(chain_id).map(|base| format!("{base}/tx/{hash}"))
}

/// Displays the explorer URL when the chain is known, otherwise the bare hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxLink {
    pub chain_id: Option<u64>,
    pub hash: B256,
}

impl TxLink {
    pub fn url(&self) -> Option<String> {
        self.chain_id.and_then(|id| transaction_url(id, self.hash))
    }
}

impl fmt::Display for TxLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.url() {
            Some(url) => f.write_str(&url),
            None => write!(f, "{}", self.hash),
        }
    }
}
