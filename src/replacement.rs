//! Building and submitting the replacement transaction.
//!
//! The replacement is a self-transfer that reuses the stuck transaction's
//! nonce at a higher gas price. The nonce is always forced: the wallet's own
//! idea of the next nonce is read only to warn when it differs.
//!
//! ## State Machine
//!
//! ```text
//!   Idle ──► Validating ──► Submitting ──► Submitted ──► Confirmed
//!                │               │
//!                └──► Failed ◄───┘
//! ```
//!
//! A failed submission is never retried automatically: the first attempt may
//! have reached the network even when the wallet reported an error.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use alloy::{
    primitives::{Address, B256, U256},
    rpc::types::TransactionRequest,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    config::ReplacerConfig,
    connection::first_account,
    ext::{
        parse_ether, parse_gwei, transaction_url, with_hint, ProviderHandle, ReceiptSummary,
        ReplaceError, WalletCallError, WalletClient,
    },
};

// ============================================================================
// ReplacementRequest
// ============================================================================

/// Raw replacement parameters as entered in the form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementRequest {
    pub rpc_url: String,
    pub nonce: Option<u64>,
    pub gas_price_gwei: String,
    pub gas_limit: Option<u64>,
    /// Ether amount; empty means zero
    pub value_eth: String,
}

/// A request whose fields are all present and well-formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedReplacement {
    pub nonce: u64,
    pub gas_price_wei: u128,
    pub gas_limit: u64,
    pub value_wei: U256,
}

impl ReplacementRequest {
    pub fn validate(&self) -> Result<ValidatedReplacement, ReplaceError> {
        if self.rpc_url.trim().is_empty() {
            return Err(ReplaceError::InvalidInput("RPC URL is required".into()));
        }
        let nonce = self
            .nonce
            .ok_or_else(|| ReplaceError::InvalidInput("nonce is required".into()))?;
        let gas_price_wei = parse_gwei(&self.gas_price_gwei)
            .and_then(|wei| u128::try_from(wei).ok())
            .ok_or_else(|| {
                ReplaceError::InvalidInput(format!(
                    "invalid gas price: {:?}",
                    self.gas_price_gwei
                ))
            })?;
        let gas_limit = self
            .gas_limit
            .filter(|limit| *limit > 0)
            .ok_or_else(|| ReplaceError::InvalidInput("gas limit is required".into()))?;
        let value_wei = if self.value_eth.trim().is_empty() {
            U256::ZERO
        } else {
            parse_ether(&self.value_eth).ok_or_else(|| {
                ReplaceError::InvalidInput(format!("invalid value: {:?}", self.value_eth))
            })?
        };

        Ok(ValidatedReplacement {
            nonce,
            gas_price_wei,
            gas_limit,
            value_wei,
        })
    }
}

impl ValidatedReplacement {
    /// Self-transfer from `account` with the nonce forced.
    pub fn to_transaction(&self, account: Address, chain_id: Option<u64>) -> TransactionRequest {
        let mut tx = TransactionRequest::default()
            .from(account)
            .to(account)
            .value(self.value_wei)
            .nonce(self.nonce)
            .gas_price(self.gas_price_wei)
            .gas_limit(self.gas_limit);
        tx.chain_id = chain_id;
        tx
    }
}

// ============================================================================
// Submission state
// ============================================================================

/// The wallet expected a different nonce than the one forced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceDiscrepancy {
    pub wallet_expected: u64,
    pub forced: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SubmissionState {
    #[default]
    Idle,
    Validating,
    Submitting,
    Submitted {
        hash: B256,
        nonce: u64,
        discrepancy: Option<NonceDiscrepancy>,
        explorer_url: Option<String>,
    },
    Confirmed {
        hash: B256,
        nonce: u64,
        block_number: Option<u64>,
        succeeded: bool,
        explorer_url: Option<String>,
    },
    Failed {
        error: ReplaceError,
    },
}

impl SubmissionState {
    /// True while a submission is being validated, sent or awaited.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SubmissionState::Validating
                | SubmissionState::Submitting
                | SubmissionState::Submitted { .. }
        )
    }
}

/// Outcome of a sent replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub hash: B256,
    pub nonce: u64,
    pub chain_id: Option<u64>,
    pub confirmed: bool,
    pub nonce_discrepancy: Option<NonceDiscrepancy>,
    pub explorer_url: Option<String>,
}

impl SubmissionReceipt {
    /// Success message for the form.
    pub fn message(&self) -> String {
        let mut message = format!("Transaction sent: {}", self.hash);
        if let Some(url) = &self.explorer_url {
            message.push_str(&format!(" ({url})"));
        }
        if let Some(d) = &self.nonce_discrepancy {
            message.push_str(&format!(
                ". Wallet expected nonce {} but {} was used",
                d.wallet_expected, d.forced
            ));
        }
        message
    }
}

// ============================================================================
// Submitter
// ============================================================================

/// Clears the in-flight flag when a submission ends.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn submission_error(e: WalletCallError) -> ReplaceError {
    match e.code() {
        Some(code) => ReplaceError::from_wallet(code, &e.message(), |m| {
            ReplaceError::SubmissionError(with_hint(&m))
        }),
        None => ReplaceError::SubmissionError(e.message()),
    }
}

/// Sends replacements through the connected wallet, one at a time.
#[derive(Clone)]
pub struct Submitter {
    poll_interval: Duration,
    in_flight: Arc<AtomicBool>,
    state: Arc<watch::Sender<SubmissionState>>,
}

impl Submitter {
    pub fn new(config: &ReplacerConfig) -> Self {
        let (state, _) = watch::channel(SubmissionState::Idle);
        Self {
            poll_interval: config.confirmation_poll_interval,
            in_flight: Arc::new(AtomicBool::new(false)),
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SubmissionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SubmissionState {
        self.state.borrow().clone()
    }

    fn publish(&self, state: SubmissionState) {
        self.state.send_replace(state);
    }

    fn begin(&self) -> Result<InFlight, ReplaceError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ReplaceError::SubmissionInProgress)?;
        Ok(InFlight(Arc::clone(&self.in_flight)))
    }

    /// Validate, send and wait for the replacement to be mined.
    pub async fn submit(
        &self,
        wallet: Option<&ProviderHandle>,
        request: &ReplacementRequest,
    ) -> Result<SubmissionReceipt, ReplaceError> {
        let _in_flight = self.begin()?;

        let result = async {
            let (client, sent) = self.send(wallet, request).await?;
            self.await_confirmation(&client, sent).await
        }
        .await;

        if let Err(error) = &result {
            warn!(%error, "replacement failed");
            self.publish(SubmissionState::Failed {
                error: error.clone(),
            });
        }
        result
    }

    async fn send(
        &self,
        wallet: Option<&ProviderHandle>,
        request: &ReplacementRequest,
    ) -> Result<(WalletClient, SubmissionReceipt), ReplaceError> {
        self.publish(SubmissionState::Validating);
        let replacement = request.validate()?;
        let wallet = WalletClient::new(wallet.ok_or(ReplaceError::MissingWallet)?.clone());

        let accounts = wallet.request_accounts().await.map_err(submission_error)?;
        let account = first_account(&accounts)?;

        let chain_id = match wallet.chain_id().await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "chain id unavailable, leaving it to the wallet");
                None
            }
        };

        let discrepancy = match wallet.signer_nonce(account).await {
            Ok(expected) if expected != replacement.nonce => {
                warn!(
                    %account,
                    wallet_expected = expected,
                    forced = replacement.nonce,
                    "wallet expects a different nonce, forcing the requested one"
                );
                Some(NonceDiscrepancy {
                    wallet_expected: expected,
                    forced: replacement.nonce,
                })
            }
            Ok(_) => None,
            Err(e) => {
                debug!(%account, error = %e, "wallet nonce unavailable");
                None
            }
        };

        self.publish(SubmissionState::Submitting);
        let tx = replacement.to_transaction(account, chain_id);
        debug!(
            %account,
            nonce = replacement.nonce,
            gas_price = replacement.gas_price_wei,
            gas_limit = replacement.gas_limit,
            ?chain_id,
            "sending replacement"
        );
        let hash = wallet.send_transaction(&tx).await.map_err(submission_error)?;

        let explorer_url = chain_id.and_then(|id| transaction_url(id, hash));
        info!(%account, %hash, nonce = replacement.nonce, "replacement sent");
        self.publish(SubmissionState::Submitted {
            hash,
            nonce: replacement.nonce,
            discrepancy,
            explorer_url: explorer_url.clone(),
        });

        let sent = SubmissionReceipt {
            hash,
            nonce: replacement.nonce,
            chain_id,
            confirmed: false,
            nonce_discrepancy: discrepancy,
            explorer_url,
        };
        Ok((wallet, sent))
    }

    /// Poll the wallet for a receipt until one appears. There is no timeout.
    async fn await_confirmation(
        &self,
        wallet: &WalletClient,
        mut sent: SubmissionReceipt,
    ) -> Result<SubmissionReceipt, ReplaceError> {
        let receipt: ReceiptSummary = loop {
            match wallet.transaction_receipt(sent.hash).await {
                Ok(Some(receipt)) => break receipt,
                Ok(None) => {}
                Err(e) => debug!(hash = %sent.hash, error = %e, "receipt poll failed"),
            }
            tokio::time::sleep(self.poll_interval).await;
        };

        let block_number = receipt.block_number.map(|n| n.to::<u64>());
        info!(hash = %sent.hash, ?block_number, succeeded = receipt.succeeded(), "replacement mined");
        self.publish(SubmissionState::Confirmed {
            hash: sent.hash,
            nonce: sent.nonce,
            block_number,
            succeeded: receipt.succeeded(),
            explorer_url: sent.explorer_url.clone(),
        });

        sent.confirmed = true;
        Ok(sent)
    }
}
