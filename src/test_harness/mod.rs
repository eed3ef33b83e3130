//! Mock-based test harness for the replacement workflow.
//!
//! Three doubles stand in for the outside world:
//!
//! - [`MockWallet`]: an EIP-1193 provider with scripted responses and a call log
//! - [`MockHost`]: the injected slot plus EIP-6963 announcement plumbing
//! - [`MockConnector`]: node connections backed by alloy's mock transport,
//!   with per-method gates
//!
//! # Example
//!
//! ```ignore
//! let scenario = ReplacementScenario::new().wallet_nonce(9);
//! scenario.node.push(&U64::from(30_000_000_000u64));
//! let form = scenario.form();
//! ```

#[cfg(test)]
mod submission_scenarios;

pub use scenario::*;

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    task,
};

use alloy::{
    primitives::{Address, B256, U64},
    providers::ProviderBuilder,
    rpc::{
        client::ClientBuilder,
        json_rpc::{RequestPacket, ResponsePacket},
    },
    transports::{
        mock::{Asserter, MockTransport},
        TransportError, TransportFut,
    },
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, Notify};
use tower::Service;

use crate::ext::{
    InjectedProviders, ListenerId, NodeClient, NodeConnector, ProviderDetail, ProviderFlags,
    ProviderHandle, ProviderInfo, ProviderRpcError, ReplaceError, RpcEndpoint, WalletHost,
    WalletProvider,
};

// ============================================================================
// MockWallet
// ============================================================================

type Response = Result<Value, ProviderRpcError>;

/// Scripted EIP-1193 provider.
///
/// Each method answers from its one-shot queue first, then from its sticky
/// response. Methods with neither answer `-32601 method not found`.
pub struct MockWallet {
    flags: ProviderFlags,
    once: Mutex<HashMap<String, VecDeque<Response>>>,
    sticky: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<(String, Value)>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
}

impl MockWallet {
    pub fn new() -> Self {
        Self {
            flags: ProviderFlags::default(),
            once: Mutex::new(HashMap::new()),
            sticky: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// A wallet authorized for `account` on `chain_id` whose signer reports `nonce`,
    /// accepting any transaction and mining it immediately.
    pub fn connected(account: Address, nonce: u64, chain_id: u64) -> Self {
        let hash = B256::repeat_byte(0xee);
        Self::new()
            .respond("eth_requestAccounts", json!([account]))
            .respond("eth_accounts", json!([account]))
            .respond("eth_getTransactionCount", json!(U64::from(nonce)))
            .respond("eth_chainId", json!(U64::from(chain_id)))
            .respond("eth_sendTransaction", json!(hash))
            .respond("eth_getTransactionReceipt", receipt_json(hash, 1))
    }

    pub fn with_flags(mut self, flags: ProviderFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sticky successful response for `method`.
    pub fn respond(self, method: &str, value: impl Serialize) -> Self {
        self.set(method, Ok(to_value(value)));
        self
    }

    /// Sticky error response for `method`.
    pub fn reject(self, method: &str, code: i64, message: &str) -> Self {
        self.set(method, Err(ProviderRpcError::new(code, message)));
        self
    }

    pub fn set(&self, method: &str, response: Response) {
        self.sticky.lock().insert(method.to_string(), response);
    }

    /// Answer the next call to `method` with `response`, ahead of the sticky one.
    pub fn push_once(&self, method: &str, response: Response) {
        self.once
            .lock()
            .entry(method.to_string())
            .or_default()
            .push_back(response);
    }

    /// Hold the next call to `method` until the returned notifier fires.
    pub fn gate(&self, method: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates
            .lock()
            .insert(method.to_string(), Arc::clone(&notify));
        notify
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    /// Params of every call to `method`, in order.
    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    /// Wrap a shared mock as a provider handle; the handle is this instance.
    pub fn handle(self: &Arc<Self>) -> ProviderHandle {
        ProviderHandle::from_arc(Arc::clone(self) as Arc<dyn WalletProvider>)
    }
}

impl Default for MockWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderRpcError> {
        self.calls.lock().push((method.to_string(), params));

        let gate = self.gates.lock().remove(method);
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if let Some(response) = self
            .once
            .lock()
            .get_mut(method)
            .and_then(|queue| queue.pop_front())
        {
            return response;
        }
        self.sticky
            .lock()
            .get(method)
            .cloned()
            .unwrap_or_else(|| Err(ProviderRpcError::new(-32601, "method not found")))
    }

    fn flags(&self) -> ProviderFlags {
        self.flags
    }
}

fn to_value(value: impl Serialize) -> Value {
    serde_json::to_value(value).unwrap()
}

// ============================================================================
// MockHost
// ============================================================================

/// In-memory stand-in for a browser window.
#[derive(Default)]
pub struct MockHost {
    injected: Mutex<Option<InjectedProviders>>,
    announcers: Mutex<Vec<ProviderDetail>>,
    listeners: Mutex<HashMap<u64, mpsc::UnboundedSender<ProviderDetail>>>,
    next_listener: AtomicU64,
    discovery_requests: AtomicUsize,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_injected(self, injected: InjectedProviders) -> Self {
        *self.injected.lock() = Some(injected);
        self
    }

    /// A provider that announces itself whenever discovery is requested.
    pub fn with_announcer(self, info: ProviderInfo, provider: ProviderHandle) -> Self {
        self.announcers.lock().push(ProviderDetail { info, provider });
        self
    }

    /// Deliver an unsolicited announcement to every current listener.
    pub fn announce(&self, detail: ProviderDetail) {
        for sink in self.listeners.lock().values() {
            let _ = sink.send(detail.clone());
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn discovery_requests(&self) -> usize {
        self.discovery_requests.load(Ordering::SeqCst)
    }
}

impl WalletHost for MockHost {
    fn injected(&self) -> Option<InjectedProviders> {
        self.injected.lock().clone()
    }

    fn add_announce_listener(&self, sink: mpsc::UnboundedSender<ProviderDetail>) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().insert(id, sink);
        ListenerId(id)
    }

    fn remove_announce_listener(&self, id: ListenerId) {
        self.listeners.lock().remove(&id.0);
    }

    fn request_providers(&self) {
        self.discovery_requests.fetch_add(1, Ordering::SeqCst);
        let announcers = self.announcers.lock().clone();
        for detail in announcers {
            self.announce(detail);
        }
    }
}

// ============================================================================
// MockConnector
// ============================================================================

/// Node connector whose clients all read from one shared response queue.
///
/// Responses are consumed in request order, whatever the method. A response
/// is only taken once a request gets past its gate, so a held request does
/// not hold a place in the queue.
pub struct MockConnector {
    asserter: Asserter,
    connects: AtomicUsize,
    endpoints: Mutex<Vec<String>>,
    gates: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
    methods: Arc<Mutex<Vec<String>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            asserter: Asserter::new(),
            connects: AtomicUsize::new(0),
            endpoints: Mutex::new(Vec::new()),
            gates: Arc::new(Mutex::new(HashMap::new())),
            methods: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a successful node response.
    pub fn push<T: Serialize>(&self, value: &T) {
        self.asserter.push_success(value);
    }

    /// Queue a node error with `message`.
    pub fn push_error(&self, message: &'static str) {
        self.asserter.push_failure_msg(message);
    }

    /// Hold the next node request for `method` until the returned notifier fires.
    pub fn gate(&self, method: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates
            .lock()
            .insert(method.to_string(), Arc::clone(&notify));
        notify
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().clone()
    }

    /// Number of node requests issued for `method`, held ones included.
    pub fn requests_to(&self, method: &str) -> usize {
        self.methods.lock().iter().filter(|m| *m == method).count()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeConnector for MockConnector {
    fn connect(&self, endpoint: &RpcEndpoint) -> Result<NodeClient, ReplaceError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().push(endpoint.to_string());
        let transport = GatedTransport {
            inner: MockTransport::new(self.asserter.clone()),
            gates: Arc::clone(&self.gates),
            methods: Arc::clone(&self.methods),
        };
        let client = ClientBuilder::default().transport(transport, true);
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_client(client);
        Ok(NodeClient::from_provider(provider))
    }
}

/// Mock transport that logs each method and can hold it on a gate.
#[derive(Clone)]
struct GatedTransport {
    inner: MockTransport,
    gates: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
    methods: Arc<Mutex<Vec<String>>>,
}

impl Service<RequestPacket> for GatedTransport {
    type Response = ResponsePacket;
    type Error = TransportError;
    type Future = TransportFut<'static>;

    fn poll_ready(&mut self, _cx: &mut task::Context<'_>) -> task::Poll<Result<(), Self::Error>> {
        task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: RequestPacket) -> Self::Future {
        let gate = match &request {
            RequestPacket::Single(single) => {
                self.methods.lock().push(single.method().to_string());
                self.gates.lock().remove(single.method())
            }
            RequestPacket::Batch(_) => None,
        };
        let mut inner = self.inner.clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            inner.call(request).await
        })
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// Receipt JSON as returned by `eth_getTransactionReceipt`.
pub fn receipt_json(hash: B256, status: u64) -> Value {
    json!({
        "transactionHash": hash,
        "blockNumber": "0x10",
        "status": U64::from(status),
    })
}

/// `txpool_content` JSON holding one legacy transaction from `from` at `nonce`.
pub fn pool_json(from: Address, nonce: u64, gas_price_wei: u64, section: &str) -> Value {
    let tx = json!({
        "hash": B256::repeat_byte(nonce as u8),
        "from": from,
        "to": from,
        "gas": "0x5208",
        "gasPrice": U64::from(gas_price_wei),
        "value": "0x0",
        "nonce": U64::from(nonce),
        "input": "0x",
    });
    let by_nonce = Map::from_iter([(nonce.to_string(), tx)]);
    let by_sender = Map::from_iter([(from.to_string(), Value::Object(by_nonce))]);
    let mut pool = json!({ "pending": {}, "queued": {} });
    pool[section] = Value::Object(by_sender);
    pool
}
