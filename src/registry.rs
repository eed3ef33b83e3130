//! Wallet discovery and deduplication.
//!
//! Three strategies run during one discovery pass:
//!
//! 1. **Announcements**: a discovery request is broadcast and providers answer
//!    with `{uuid, name, icon, rdns}` metadata plus their handle (EIP-6963).
//! 2. **Multi-provider array**: the host's injected slot holds several providers.
//! 3. **Legacy single provider**: the injected slot holds exactly one provider.
//!
//! Results are merged by provider instance first, then by normalized id.
//! [`DiscoverySession`] yields the merged list after every announcement;
//! [`discover_wallets`] waits for the whole window.
//!
//! ```text
//!   injected slot ──┐
//!                   ├──► WalletRegistry::insert ──► Discovery
//!   announcements ──┘      (instance merge, id collision)
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, time::Instant};
use tracing::{debug, trace};

use crate::ext::{slugify, ProviderHandle, WalletKind};

// ============================================================================
// Host environment
// ============================================================================

/// Metadata carried by a provider announcement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub uuid: String,
    pub name: String,
    pub icon: String,
    pub rdns: String,
}

/// One announcement: metadata plus the provider it describes.
#[derive(Debug, Clone)]
pub struct ProviderDetail {
    pub info: ProviderInfo,
    pub provider: ProviderHandle,
}

/// Contents of the host's global injected-provider slot.
#[derive(Debug, Clone)]
pub enum InjectedProviders {
    Single(ProviderHandle),
    Many(Vec<ProviderHandle>),
}

/// Token identifying a registered announcement listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// The environment wallets are injected into (a browser window, or a test double).
pub trait WalletHost: Send + Sync {
    /// The global injected slot, if anything is there.
    fn injected(&self) -> Option<InjectedProviders>;

    /// Register a listener receiving every announcement until removed.
    fn add_announce_listener(&self, sink: mpsc::UnboundedSender<ProviderDetail>) -> ListenerId;

    fn remove_announce_listener(&self, id: ListenerId);

    /// Broadcast the discovery request that prompts providers to announce.
    fn request_providers(&self);
}

/// Deregisters the announcement listener when dropped.
struct ListenerGuard<'a, H: WalletHost + ?Sized> {
    host: &'a H,
    id: ListenerId,
}

impl<'a, H: WalletHost + ?Sized> ListenerGuard<'a, H> {
    fn register(host: &'a H, sink: mpsc::UnboundedSender<ProviderDetail>) -> Self {
        let id = host.add_announce_listener(sink);
        trace!(listener = id.0, "registered announce listener");
        Self { host, id }
    }
}

impl<H: WalletHost + ?Sized> Drop for ListenerGuard<'_, H> {
    fn drop(&mut self) {
        self.host.remove_announce_listener(self.id);
        trace!(listener = self.id.0, "removed announce listener");
    }
}

// ============================================================================
// DetectedWallet
// ============================================================================

/// A wallet found during discovery.
#[derive(Debug, Clone)]
pub struct DetectedWallet {
    /// Normalized slug (`metamask`, `coinbase`, or derived from rdns/name)
    pub id: String,
    pub name: String,
    /// Icon as a data or http URI
    pub icon: Option<String>,
    pub provider: ProviderHandle,
    /// Reverse-DNS id from the announcement, if any
    pub rdns: Option<String>,
    pub kind: WalletKind,
}

impl DetectedWallet {
    /// Build from an announcement.
    pub fn from_announcement(detail: ProviderDetail) -> Self {
        let ProviderDetail { info, provider } = detail;
        let key = if info.rdns.is_empty() {
            &info.name
        } else {
            &info.rdns
        };
        let kind = WalletKind::from_identifier(key);
        let id = match kind.id() {
            Some(id) => id.to_string(),
            None => [&info.rdns, &info.name, &info.uuid]
                .into_iter()
                .map(|raw| slugify(raw))
                .find(|slug| !slug.is_empty())
                .unwrap_or_else(|| "wallet".to_string()),
        };
        let name = if info.name.is_empty() {
            kind.display_name().to_string()
        } else {
            info.name
        };

        Self {
            id,
            name,
            icon: non_empty(info.icon),
            provider,
            rdns: non_empty(info.rdns),
            kind,
        }
    }

    /// Build from an injected provider using its capability flags.
    ///
    /// `index` disambiguates unrecognized entries of a multi-provider array.
    pub fn from_injected(provider: ProviderHandle, index: Option<usize>) -> Self {
        let kind = WalletKind::classify(provider.flags());
        let id = match (kind.id(), index) {
            (Some(id), _) => id.to_string(),
            (None, Some(index)) => format!("injected-{index}"),
            (None, None) => "injected".to_string(),
        };

        Self {
            id,
            name: kind.display_name().to_string(),
            icon: None,
            provider,
            rdns: None,
            kind,
        }
    }

    pub fn has_icon(&self) -> bool {
        self.icon.is_some()
    }

    /// Merge two records for the same instance, keeping the richer one as base.
    ///
    /// An icon wins first. Without one on either side, an announced record
    /// (it has an rdns) wins over one classified from flags alone, so the
    /// announced name and id survive.
    fn merged_with(self, other: DetectedWallet) -> DetectedWallet {
        let other_is_richer = match (self.has_icon(), other.has_icon()) {
            (false, true) => true,
            (true, false) => false,
            _ => self.rdns.is_none() && other.rdns.is_some(),
        };
        let (mut base, extra) = if other_is_richer {
            (other, self)
        } else {
            (self, other)
        };
        if base.icon.is_none() {
            base.icon = extra.icon;
        }
        if base.rdns.is_none() {
            base.rdns = extra.rdns;
        }
        if base.kind == WalletKind::Unknown && extra.kind != WalletKind::Unknown {
            base.kind = extra.kind;
        }
        base
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

// ============================================================================
// WalletRegistry
// ============================================================================

/// Merged set of detected wallets, at most one per provider instance.
#[derive(Debug, Default, Clone)]
pub struct WalletRegistry {
    wallets: Vec<DetectedWallet>,
}

impl WalletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a wallet, merging with existing records.
    ///
    /// Re-inserting an instance that is already present never adds a record.
    pub fn insert(&mut self, wallet: DetectedWallet) {
        // Instance-level merge first.
        if let Some(pos) = self
            .wallets
            .iter()
            .position(|w| w.provider.same_instance(&wallet.provider))
        {
            let existing = self.wallets.remove(pos);
            let merged = existing.merged_with(wallet);
            trace!(id = %merged.id, "merged wallet announced twice");
            self.insert_by_id(merged, Some(pos));
            return;
        }
        self.insert_by_id(wallet, None);
    }

    /// Resolve an id collision between distinct instances: prefer the icon.
    fn insert_by_id(&mut self, wallet: DetectedWallet, at: Option<usize>) {
        if let Some(pos) = self.wallets.iter().position(|w| w.id == wallet.id) {
            if wallet.has_icon() && !self.wallets[pos].has_icon() {
                debug!(id = %wallet.id, "replacing wallet without icon");
                self.wallets[pos] = wallet;
            } else {
                debug!(id = %wallet.id, "discarding duplicate wallet id");
            }
            return;
        }
        match at {
            Some(pos) if pos <= self.wallets.len() => self.wallets.insert(pos, wallet),
            _ => self.wallets.push(wallet),
        }
    }

    pub fn wallets(&self) -> &[DetectedWallet] {
        &self.wallets
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn into_discovery(self) -> Discovery {
        Discovery {
            wallets: self.wallets,
        }
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// Outcome of a discovery pass. Empty is a valid state, not an error.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub wallets: Vec<DetectedWallet>,
}

impl Discovery {
    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&DetectedWallet> {
        self.wallets.iter().find(|w| w.id == id)
    }

    /// Install links to show when nothing was detected.
    pub fn install_suggestions(&self) -> Vec<(&'static str, &'static str)> {
        if !self.is_empty() {
            return Vec::new();
        }
        WalletKind::KNOWN
            .iter()
            .filter_map(|kind| kind.install_url().map(|url| (kind.display_name(), url)))
            .collect()
    }
}

/// A discovery pass in progress, yielding the merged wallet list as
/// announcements arrive until the window closes.
///
/// The announcement listener stays registered for as long as the session
/// lives and is removed when it is dropped or finished.
///
/// ```ignore
/// let mut session = DiscoverySession::start(&host, config.discovery_window);
/// while let Some(wallets) = session.next_update().await {
///     render(wallets);
/// }
/// let discovery = session.finish();
/// ```
pub struct DiscoverySession<'h, H: WalletHost + ?Sized> {
    _listener: ListenerGuard<'h, H>,
    announcements: mpsc::UnboundedReceiver<ProviderDetail>,
    deadline: Instant,
    registry: WalletRegistry,
    injected_reported: bool,
}

impl<'h, H: WalletHost + ?Sized> DiscoverySession<'h, H> {
    /// Register the listener, broadcast the discovery request and read the
    /// injected slot. Announcements are accepted until `window` elapses.
    pub fn start(host: &'h H, window: Duration) -> Self {
        let (tx, announcements) = mpsc::unbounded_channel();
        let listener = ListenerGuard::register(host, tx);
        host.request_providers();

        let mut registry = WalletRegistry::new();
        match host.injected() {
            Some(InjectedProviders::Many(providers)) => {
                debug!(count = providers.len(), "found multi-provider array");
                for (index, provider) in providers.into_iter().enumerate() {
                    registry.insert(DetectedWallet::from_injected(provider, Some(index)));
                }
            }
            Some(InjectedProviders::Single(provider)) => {
                debug!("found legacy injected provider");
                registry.insert(DetectedWallet::from_injected(provider, None));
            }
            None => trace!("no injected provider"),
        }

        Self {
            _listener: listener,
            announcements,
            deadline: Instant::now() + window,
            registry,
            injected_reported: false,
        }
    }

    /// Wait for the next change and return the merged list, or `None` once
    /// the window has closed.
    ///
    /// The first call returns the injected providers immediately when there
    /// are any.
    pub async fn next_update(&mut self) -> Option<&[DetectedWallet]> {
        if !self.injected_reported {
            self.injected_reported = true;
            if !self.registry.is_empty() {
                return Some(self.registry.wallets());
            }
        }

        match tokio::time::timeout_at(self.deadline, self.announcements.recv()).await {
            Ok(Some(detail)) => {
                trace!(name = %detail.info.name, rdns = %detail.info.rdns, "provider announced");
                self.registry.insert(DetectedWallet::from_announcement(detail));
                Some(self.registry.wallets())
            }
            // Every sender is gone; nothing more can arrive.
            Ok(None) => None,
            Err(_elapsed) => None,
        }
    }

    /// Wallets merged so far.
    pub fn wallets(&self) -> &[DetectedWallet] {
        self.registry.wallets()
    }

    /// End the session, removing the listener.
    pub fn finish(self) -> Discovery {
        debug!(count = self.registry.len(), "wallet discovery finished");
        self.registry.into_discovery()
    }
}

/// Run one discovery pass over `host`, collecting announcements for `window`.
///
/// The announcement listener is registered for the duration of the call only.
pub async fn discover_wallets<H: WalletHost + ?Sized>(host: &H, window: Duration) -> Discovery {
    let mut session = DiscoverySession::start(host, window);
    while session.next_update().await.is_some() {}
    session.finish()
}
