//! Error taxonomy and RPC error classification.
//!
//! Every fallible operation in the crate returns [`ReplaceError`]. Failures
//! coming back from a node or a wallet are additionally classified by message
//! into an [`RpcErrorKind`], which lets the submitter attach an actionable hint
//! and lets the prober tell "method not supported" apart from real failures.

use alloy::transports::RpcError;

use crate::config::USER_REJECTED_CODE;

// ============================================================================
// ReplaceError
// ============================================================================

/// Errors surfaced to the user.
///
/// All async operations convert their failures into one of these variants so
/// the caller can render them inline without losing form state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplaceError {
    /// No wallet provider is available in the host environment
    #[error("no wallet provider found, install a browser wallet to continue")]
    WalletNotFound,

    /// The user declined the request in the wallet (EIP-1193 code 4001).
    /// The wallet's message is kept verbatim.
    #[error("{0}")]
    UserRejected(String),

    /// The wallet answered with an empty account list
    #[error("no accounts found, connect your wallet and try again")]
    NoAccounts,

    /// The wallet returned something that is not an address
    #[error("invalid Ethereum address from wallet: {0}")]
    InvalidAddress(String),

    /// The wallet refused the connection for a reason other than rejection
    #[error("failed to connect wallet: {0}")]
    ConnectionFailed(String),

    /// Another connection attempt is still waiting on its wallet
    #[error("a connection to {0} is already in progress")]
    ConnectionInProgress(String),

    /// Neither the wallet nor the node could report a nonce.
    /// Non-fatal: the last known nonce is kept.
    #[error("failed to get current nonce: {0}")]
    NonceFetchFailed(String),

    /// The node does not expose its transaction pool.
    /// Non-fatal: treated as "no pending transaction".
    #[error("pending transaction lookup not supported: {0}")]
    PendingProbeUnsupported(String),

    /// A required form field is missing or malformed
    #[error("{0}")]
    InvalidInput(String),

    /// Submission was attempted without a connected wallet
    #[error("no wallet connected, connect a wallet and try again")]
    MissingWallet,

    /// The wallet or node rejected the replacement; message passed through
    #[error("{0}")]
    SubmissionError(String),

    /// A replacement is already being submitted or awaiting confirmation
    #[error("a replacement transaction is already in flight")]
    SubmissionInProgress,
}

impl ReplaceError {
    /// Build the error for a failed wallet call, mapping the EIP-1193
    /// rejection code to `UserRejected` and everything else through `other`.
    pub fn from_wallet<F>(code: i64, message: &str, other: F) -> Self
    where
        F: FnOnce(String) -> ReplaceError,
    {
        if is_user_rejection(code) {
            ReplaceError::UserRejected(message.to_string())
        } else {
            other(message.to_string())
        }
    }

    /// True for failures the workflow logs and continues past.
    pub fn is_non_fatal(&self) -> bool {
        matches!(
            self,
            ReplaceError::NonceFetchFailed(_) | ReplaceError::PendingProbeUnsupported(_)
        )
    }
}

/// Check an EIP-1193 error code for a user rejection.
pub fn is_user_rejection(code: i64) -> bool {
    code == USER_REJECTED_CODE
}

// ============================================================================
// Error Classification Types
// ============================================================================

/// Classified node/wallet error types.
///
/// Nothing is retried automatically: a blind retry of a nonce-forcing
/// transaction may double-send if the first attempt actually landed. The kind
/// only drives hints and probe diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcErrorKind {
    /// Nonce is lower than the account's confirmed count (already mined)
    NonceTooLow,

    /// Nonce leaves a gap above the account's pending count
    NonceTooHigh,

    /// Replacement gas price does not beat the pending transaction
    ReplacementUnderpriced,

    /// Insufficient funds for gas * price + value
    InsufficientFunds,

    /// Gas limit too low for the transaction
    IntrinsicGasTooLow,

    /// Identical transaction already in the pool
    AlreadyKnown,

    /// The node does not implement the requested method
    MethodNotFound,

    /// Network/connection error
    NetworkError,

    /// Unknown or unclassified error
    Unknown,
}

impl RpcErrorKind {
    /// A short suggestion for the user, if this kind has one.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            RpcErrorKind::NonceTooLow => {
                Some("the nonce was already used by a mined transaction, fetch the current nonce")
            }
            RpcErrorKind::NonceTooHigh => {
                Some("the nonce is ahead of the account's pending transactions")
            }
            RpcErrorKind::ReplacementUnderpriced => {
                Some("raise the gas price above the pending transaction's gas price")
            }
            RpcErrorKind::InsufficientFunds => {
                Some("the account cannot cover gas price * gas limit + value")
            }
            RpcErrorKind::IntrinsicGasTooLow => Some("raise the gas limit to at least 21000"),
            RpcErrorKind::AlreadyKnown => {
                Some("an identical transaction is already pending, change the gas price")
            }
            RpcErrorKind::MethodNotFound
            | RpcErrorKind::NetworkError
            | RpcErrorKind::Unknown => None,
        }
    }
}

// ============================================================================
// Error Classification Functions
// ============================================================================

/// Classify an error message into a known error kind by pattern matching.
///
/// Different clients word the same condition differently, so several
/// patterns are checked for each kind.
pub fn classify_message(message: &str) -> RpcErrorKind {
    let error_str = message.to_lowercase();

    if error_str.contains("nonce too low")
        || error_str.contains("nonce is too low")
        || error_str.contains("invalid nonce")
            && (error_str.contains("too low") || error_str.contains("expected"))
    {
        return RpcErrorKind::NonceTooLow;
    }

    if error_str.contains("nonce too high")
        || error_str.contains("nonce is too high")
        || error_str.contains("nonce gap")
    {
        return RpcErrorKind::NonceTooHigh;
    }

    if error_str.contains("replacement transaction underpriced")
        || error_str.contains("underpriced")
        || error_str.contains("gas price too low")
        || error_str.contains("max fee per gas less than block base fee")
    {
        return RpcErrorKind::ReplacementUnderpriced;
    }

    if error_str.contains("insufficient funds")
        || error_str.contains("insufficient balance")
        || error_str.contains("exceeds balance")
    {
        return RpcErrorKind::InsufficientFunds;
    }

    if error_str.contains("intrinsic gas too low") || error_str.contains("gas limit too low") {
        return RpcErrorKind::IntrinsicGasTooLow;
    }

    if error_str.contains("already known")
        || error_str.contains("already imported")
        || error_str.contains("known transaction")
    {
        return RpcErrorKind::AlreadyKnown;
    }

    if error_str.contains("method not found")
        || error_str.contains("does not exist/is not available")
        || error_str.contains("not supported")
        || error_str.contains("unsupported method")
        || error_str.contains("not whitelisted")
    {
        return RpcErrorKind::MethodNotFound;
    }

    if error_str.contains("connection")
        || error_str.contains("timeout")
        || error_str.contains("network")
        || error_str.contains("transport")
        || error_str.contains("eof")
        || error_str.contains("broken pipe")
    {
        return RpcErrorKind::NetworkError;
    }

    RpcErrorKind::Unknown
}

/// Classify a node error, honouring the JSON-RPC "method not found" code.
pub fn classify_rpc_error<E: std::fmt::Display>(error: &RpcError<E>) -> RpcErrorKind {
    if let Some(payload) = error.as_error_resp() {
        if payload.code == -32601 {
            return RpcErrorKind::MethodNotFound;
        }
    }
    classify_message(&error.to_string())
}

/// Append the hint for a classified message, if any.
pub fn with_hint(message: &str) -> String {
    match classify_message(message).hint() {
        Some(hint) => format!("{message} ({hint})"),
        None => message.to_string(),
    }
}
