//! The replacement form workflow.
//!
//! [`ReplacementForm`] owns the user-editable fields and drives the
//! background work that fills them in:
//!
//! ```text
//!   set_rpc_url ──(debounce)──► auto-fetch: nonce ─► network gas price ─► probe
//!   set_nonce_text ───────────────────────────────────────────────────────► probe
//!   fetch_current_nonce ──► nonce (clears manual) ───────────────────────► probe
//!   probe hit ──► gas price = pending price + premium
//!   any gas/limit/value change ──► estimate
//! ```
//!
//! Every method needs a tokio runtime. State lives behind a `parking_lot`
//! mutex that is never held across an `.await`; a UI reads it through
//! [`ReplacementForm::snapshot`].

use std::{future::Future, sync::Arc, time::Duration};

use alloy::primitives::{Address, U256};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    config::ReplacerConfig,
    ext::{
        estimate, format_gwei, probe_pending, suggest_over_network, suggest_over_pending,
        Connection, GasEstimate, NodeConnector, NonceField, NonceResolver, PendingTransactionInfo,
        ProbeTracker, ProviderHandle, ReplaceError, ReplacementRequest, RpcEndpoint,
        SubmissionReceipt, SubmissionState, Submitter, WalletClient,
    },
};

// ============================================================================
// Debouncer
// ============================================================================

/// Runs at most one scheduled task; scheduling a new one aborts the previous.
#[derive(Default)]
struct Debouncer {
    scheduled: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
        if let Some(previous) = self.scheduled.lock().replace(handle) {
            previous.abort();
        }
    }

    fn cancel(&self) {
        if let Some(previous) = self.scheduled.lock().take() {
            previous.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ============================================================================
// State
// ============================================================================

#[derive(Debug, Clone)]
struct FormState {
    rpc_url: String,
    nonce: NonceField,
    gas_price_gwei: String,
    gas_limit: String,
    value_eth: String,
    pending: Option<PendingTransactionInfo>,
    network_gas_price_wei: Option<u128>,
    estimate: GasEstimate,
    fetching_nonce: bool,
    probing: bool,
    error: Option<ReplaceError>,
    success: Option<String>,
}

impl FormState {
    fn new(config: &ReplacerConfig) -> Self {
        let mut state = Self {
            rpc_url: config.default_rpc_url.clone(),
            nonce: NonceField::new(),
            gas_price_gwei: config.default_gas_price_gwei.clone(),
            gas_limit: config.default_gas_limit.to_string(),
            value_eth: "0".to_string(),
            pending: None,
            network_gas_price_wei: None,
            estimate: GasEstimate::default(),
            fetching_nonce: false,
            probing: false,
            error: None,
            success: None,
        };
        state.recompute_estimate();
        state
    }

    fn recompute_estimate(&mut self) {
        self.estimate = estimate(
            &self.gas_price_gwei,
            &self.gas_limit,
            &self.value_eth,
            self.network_gas_price_wei
                .map(|wei| format_gwei(U256::from(wei))),
        );
    }

    fn request(&self) -> ReplacementRequest {
        ReplacementRequest {
            rpc_url: self.rpc_url.clone(),
            nonce: self.nonce.value(),
            gas_price_gwei: self.gas_price_gwei.clone(),
            gas_limit: self.gas_limit.trim().parse().ok(),
            value_eth: self.value_eth.clone(),
        }
    }
}

/// Read-only view of the form for rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSnapshot {
    pub account: Address,
    pub rpc_url: String,
    pub nonce: String,
    pub manual_nonce: bool,
    pub gas_price_gwei: String,
    pub gas_limit: String,
    pub value_eth: String,
    pub pending: Option<PendingTransactionInfo>,
    /// Network gas price plus the premium, in whole gwei, once known
    pub network_suggestion_gwei: Option<String>,
    pub estimate: GasEstimate,
    pub fetching_nonce: bool,
    pub probing: bool,
    pub error: Option<ReplaceError>,
    pub success: Option<String>,
    pub submission: SubmissionState,
}

impl FormSnapshot {
    /// Inline error text. A rejection reminds the user that the wallet's
    /// displayed nonce is not the one being sent.
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(|error| match error {
            ReplaceError::UserRejected(_) => format!(
                "Transaction was rejected by user. The nonce shown in the wallet may be \
                 incorrect; the actual transaction will use nonce {}",
                self.nonce
            ),
            other => other.to_string(),
        })
    }
}

// ============================================================================
// Guards
// ============================================================================

/// Resets `fetching_nonce` however the fetch ends, including abort.
struct FetchingNonce(Arc<Inner>);

impl FetchingNonce {
    fn start(inner: &Arc<Inner>) -> Self {
        inner.state.lock().fetching_nonce = true;
        Self(Arc::clone(inner))
    }
}

impl Drop for FetchingNonce {
    fn drop(&mut self) {
        self.0.state.lock().fetching_nonce = false;
    }
}

/// Resets `probing` if this is still the newest probe when it ends.
struct Probing {
    inner: Arc<Inner>,
    generation: u64,
}

impl Drop for Probing {
    fn drop(&mut self) {
        if self.inner.probes.is_latest(self.generation) {
            self.inner.state.lock().probing = false;
        }
    }
}

// ============================================================================
// ReplacementForm
// ============================================================================

struct Inner {
    config: ReplacerConfig,
    account: Address,
    wallet: Option<ProviderHandle>,
    connector: Arc<dyn NodeConnector>,
    resolver: NonceResolver,
    submitter: Submitter,
    probes: ProbeTracker,
    debouncer: Debouncer,
    state: Mutex<FormState>,
}

/// Form for one connected account. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ReplacementForm {
    inner: Arc<Inner>,
}

impl ReplacementForm {
    /// `wallet` is the provider used for nonce lookup and submission; `None`
    /// leaves only the node for nonces and makes submission fail with
    /// `MissingWallet`.
    pub fn new(
        config: ReplacerConfig,
        account: Address,
        wallet: Option<ProviderHandle>,
        connector: Arc<dyn NodeConnector>,
    ) -> Self {
        let state = FormState::new(&config);
        let inner = Inner {
            submitter: Submitter::new(&config),
            resolver: NonceResolver::new(Arc::clone(&connector)),
            config,
            account,
            wallet,
            connector,
            probes: ProbeTracker::new(),
            debouncer: Debouncer::default(),
            state: Mutex::new(state),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn for_connection(
        config: ReplacerConfig,
        connection: &Connection,
        connector: Arc<dyn NodeConnector>,
    ) -> Self {
        Self::new(
            config,
            connection.address,
            Some(connection.provider.clone()),
            connector,
        )
    }

    pub fn account(&self) -> Address {
        self.inner.account
    }

    pub fn submitter(&self) -> &Submitter {
        &self.inner.submitter
    }

    pub fn snapshot(&self) -> FormSnapshot {
        let inner = &self.inner;
        let state = inner.state.lock().clone();
        FormSnapshot {
            account: inner.account,
            rpc_url: state.rpc_url,
            nonce: state.nonce.text().to_string(),
            manual_nonce: state.nonce.is_manual(),
            gas_price_gwei: state.gas_price_gwei,
            gas_limit: state.gas_limit,
            value_eth: state.value_eth,
            pending: state.pending,
            network_suggestion_gwei: state
                .network_gas_price_wei
                .and_then(|wei| suggest_over_network(wei, inner.config.gas_premium_percent)),
            estimate: state.estimate,
            fetching_nonce: state.fetching_nonce,
            probing: state.probing,
            error: state.error,
            success: state.success,
            submission: inner.submitter.state(),
        }
    }

    fn wallet_client(&self) -> Option<WalletClient> {
        self.inner.wallet.clone().map(WalletClient::new)
    }

    // ------------------------------------------------------------------------
    // Field edits
    // ------------------------------------------------------------------------

    /// Update the RPC URL and schedule an auto-fetch after the debounce.
    ///
    /// A newer edit within the debounce window cancels the pending fetch, as
    /// does an edit while a fetch is running.
    pub fn set_rpc_url(&self, url: impl Into<String>) {
        let url = url.into();
        self.inner.state.lock().rpc_url = url.clone();

        if RpcEndpoint::parse(&url).is_none() {
            self.inner.debouncer.cancel();
            return;
        }
        let form = self.clone();
        self.inner
            .debouncer
            .schedule(self.inner.config.auto_fetch_debounce, async move {
                form.auto_fetch().await;
            });
    }

    /// User edit of the nonce. A non-empty value takes the field over from
    /// auto-fetch and probes for a pending transaction at that nonce, unless
    /// a nonce fetch is already running.
    pub fn set_nonce_text(&self, text: impl Into<String>) {
        let nonce = {
            let mut state = self.inner.state.lock();
            state.nonce.edit(text);
            if state.fetching_nonce {
                None
            } else {
                state.nonce.value()
            }
        };
        if let Some(nonce) = nonce {
            let form = self.clone();
            tokio::spawn(async move {
                form.probe(nonce).await;
            });
        }
    }

    pub fn set_gas_price(&self, gwei: impl Into<String>) {
        let mut state = self.inner.state.lock();
        state.gas_price_gwei = gwei.into();
        state.recompute_estimate();
    }

    pub fn set_gas_limit(&self, limit: impl Into<String>) {
        let mut state = self.inner.state.lock();
        state.gas_limit = limit.into();
        state.recompute_estimate();
    }

    pub fn set_value(&self, eth: impl Into<String>) {
        let mut state = self.inner.state.lock();
        state.value_eth = eth.into();
        state.recompute_estimate();
    }

    // ------------------------------------------------------------------------
    // Background work
    // ------------------------------------------------------------------------

    /// Nonce, network gas price and pending probe for the current RPC URL.
    ///
    /// Failures are logged only; the form keeps its previous values.
    pub async fn auto_fetch(&self) {
        let rpc_url = self.inner.state.lock().rpc_url.clone();
        let Some(endpoint) = RpcEndpoint::parse(&rpc_url) else {
            return;
        };
        let _fetching = FetchingNonce::start(&self.inner);
        let account = self.inner.account;

        let resolved = match self
            .inner
            .resolver
            .resolve(account, self.wallet_client().as_ref(), Some(&endpoint))
            .await
        {
            Ok(resolved) => resolved,
            Err(e) => {
                warn!(%account, error = %e, "auto-fetch: nonce unavailable");
                return;
            }
        };

        let manual_nonce = {
            let mut state = self.inner.state.lock();
            if !state.nonce.apply_auto(resolved.value) {
                debug!(%account, resolved = resolved.value, "manual nonce kept");
            }
            state.nonce.is_manual().then(|| state.nonce.value())
        };

        let gas_price = match self.inner.connector.connect(&endpoint) {
            Ok(client) => client.gas_price().await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        match gas_price {
            Ok(wei) => {
                let mut state = self.inner.state.lock();
                state.network_gas_price_wei = Some(wei);
                state.recompute_estimate();
            }
            Err(e) => {
                warn!(%account, error = %e, "auto-fetch: gas price unavailable");
                return;
            }
        }

        let nonce = match manual_nonce {
            Some(manual) => manual,
            None => Some(resolved.value),
        };
        if let Some(nonce) = nonce {
            self.probe(nonce).await;
        }
    }

    /// Explicit "get current nonce": always overwrites the field and hands it
    /// back to auto-fetch. On failure the previous value is kept and the error
    /// is shown.
    pub async fn fetch_current_nonce(&self) -> Result<u64, ReplaceError> {
        let rpc_url = self.inner.state.lock().rpc_url.clone();
        let endpoint = RpcEndpoint::parse(&rpc_url);
        let account = self.inner.account;

        let resolved = {
            let _fetching = FetchingNonce::start(&self.inner);
            self.inner
                .resolver
                .resolve(account, self.wallet_client().as_ref(), endpoint.as_ref())
                .await
        };

        match resolved {
            Ok(resolved) => {
                {
                    let mut state = self.inner.state.lock();
                    state.nonce.apply_explicit(resolved.value);
                    state.error = None;
                }
                info!(%account, nonce = resolved.value, source = ?resolved.source, "nonce fetched");
                self.probe(resolved.value).await;
                Ok(resolved.value)
            }
            Err(e) => {
                warn!(%account, error = %e, "nonce fetch failed");
                self.inner.state.lock().error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Probe for a pending transaction at `nonce` and apply the result if no
    /// newer probe has started meanwhile.
    pub async fn probe(&self, nonce: u64) {
        let generation = self.inner.probes.begin();
        let _probing = Probing {
            inner: Arc::clone(&self.inner),
            generation,
        };
        let rpc_url = {
            let mut state = self.inner.state.lock();
            state.probing = true;
            state.rpc_url.clone()
        };

        let found = probe_pending(
            self.inner.connector.as_ref(),
            &rpc_url,
            self.inner.account,
            nonce,
        )
        .await;

        if !self.inner.probes.is_latest(generation) {
            debug!(nonce, generation, "stale probe result dropped");
            return;
        }

        let mut state = self.inner.state.lock();
        if let Some(info) = &found {
            if let Some(suggested) =
                suggest_over_pending(&info.gas_price_gwei, self.inner.config.gas_premium_percent)
            {
                state.gas_price_gwei = suggested;
                state.recompute_estimate();
            }
        }
        state.pending = found;
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Send the replacement and wait for it to be mined. Errors are stored on
    /// the form; no field is cleared.
    pub async fn submit(&self) -> Result<SubmissionReceipt, ReplaceError> {
        let request = {
            let mut state = self.inner.state.lock();
            state.error = None;
            state.success = None;
            state.request()
        };

        let result = self
            .inner
            .submitter
            .submit(self.inner.wallet.as_ref(), &request)
            .await;

        let mut state = self.inner.state.lock();
        match &result {
            Ok(receipt) => state.success = Some(receipt.message()),
            Err(e) => state.error = Some(e.clone()),
        }
        result
    }
}
