//! Connecting to a detected wallet.
//!
//! A successful connect yields a [`Connection`]: the active address and the
//! provider instance that produced it. The connection is passed explicitly to
//! whatever needs the wallet (the form, the submitter); there is no ambient
//! "selected provider" slot.

use std::sync::Arc;

use alloy::primitives::Address;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::ext::{DetectedWallet, ProviderHandle, ReplaceError, WalletClient};

/// An established wallet connection.
#[derive(Debug, Clone)]
pub struct Connection {
    pub address: Address,
    pub provider: ProviderHandle,
    pub wallet_id: String,
    pub wallet_name: String,
}

impl Connection {
    pub fn client(&self) -> WalletClient {
        WalletClient::new(self.provider.clone())
    }
}

/// Parse the first account a wallet returned.
pub(crate) fn first_account(accounts: &[String]) -> Result<Address, ReplaceError> {
    let raw = accounts.first().ok_or(ReplaceError::NoAccounts)?;
    raw.parse::<Address>()
        .map_err(|_| ReplaceError::InvalidAddress(raw.clone()))
}

// ============================================================================
// WalletConnector
// ============================================================================

/// Clears the in-flight marker when the attempt ends, however it ends.
struct InFlight {
    slot: Arc<Mutex<Option<String>>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.slot.lock().take();
    }
}

/// Runs connection attempts, one at a time.
#[derive(Debug, Clone, Default)]
pub struct WalletConnector {
    connecting: Arc<Mutex<Option<String>>>,
}

impl WalletConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the wallet currently being connected, if any.
    ///
    /// While this is `Some`, a UI should disable the other wallet entries.
    pub fn connecting(&self) -> Option<String> {
        self.connecting.lock().clone()
    }

    fn begin(&self, wallet_id: &str) -> Result<InFlight, ReplaceError> {
        let mut slot = self.connecting.lock();
        if let Some(busy) = slot.as_ref() {
            return Err(ReplaceError::ConnectionInProgress(busy.clone()));
        }
        *slot = Some(wallet_id.to_string());
        Ok(InFlight {
            slot: Arc::clone(&self.connecting),
        })
    }

    /// Ask the wallet for account access.
    pub async fn connect(&self, wallet: &DetectedWallet) -> Result<Connection, ReplaceError> {
        let _in_flight = self.begin(&wallet.id)?;
        debug!(wallet = %wallet.id, "requesting accounts");

        let client = WalletClient::new(wallet.provider.clone());
        let accounts = match client.request_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(wallet = %wallet.id, error = %e, "account request failed");
                return Err(match e.code() {
                    Some(code) => {
                        ReplaceError::from_wallet(code, &e.message(), ReplaceError::ConnectionFailed)
                    }
                    None => ReplaceError::ConnectionFailed(e.message()),
                });
            }
        };

        let address = first_account(&accounts)?;
        info!(wallet = %wallet.id, %address, "wallet connected");

        Ok(Connection {
            address,
            provider: wallet.provider.clone(),
            wallet_id: wallet.id.clone(),
            wallet_name: wallet.name.clone(),
        })
    }
}

// ============================================================================
// ConnectionState
// ============================================================================

/// Connected / disconnected state of the session.
#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    connection: Option<Connection>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn address(&self) -> Option<Address> {
        self.connection.as_ref().map(|c| c.address)
    }

    pub fn selected_provider(&self) -> Option<&ProviderHandle> {
        self.connection.as_ref().map(|c| &c.provider)
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// Connect through `connector`; on success the new connection replaces any previous one.
    /// On failure the current state is left untouched.
    pub async fn connect(
        &mut self,
        connector: &WalletConnector,
        wallet: &DetectedWallet,
    ) -> Result<&Connection, ReplaceError> {
        let connection = connector.connect(wallet).await?;
        Ok(self.connection.insert(connection))
    }

    /// Explicit user reset: forget the address and the provider.
    pub fn disconnect(&mut self) {
        if let Some(previous) = self.connection.take() {
            info!(address = %previous.address, wallet = %previous.wallet_id, "wallet disconnected");
        }
    }
}
