//! Exchange orchestration per peer.
//!
//! A peer connection produces a proxy whose receiver slot initially points
//! at an exchange processor wrapping a synchronizer. When the exchange
//! reaches `Ready`, the mediator attaches the finalized cipher package to
//! the proxy, swaps the receiver to the authorized sink, and marks the
//! peer authorized. On failure (or a dropped exchange) the receiver is
//! cleared and the peer stays unauthorized.
//!
//! Locking: the resolving-address set and the peer map have their own
//! mutexes with lock order (resolving, peers). The proxy's receiver lock
//! is held across sink swaps and never while the receiver runs. Observers
//! are notified outside every lock.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::catalog::SupportedAlgorithms;
use crate::error::SecurityError;
use crate::keystore::ExchangeRole;
use crate::package::CipherPackage;
use crate::synchronizer::{SynchronizationStatus, Synchronizer};

/// Wall-clock bound on a handshake; frames after this are rejected.
const EXCHANGE_EXPIRATION: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Sinks and observers
// ---------------------------------------------------------------------------

/// Destination for a peer's inbound messages. May produce a reply frame.
pub trait MessageSink: Send + Sync {
    fn collect(&self, buffer: &[u8]) -> Result<Option<Vec<u8>>, SecurityError>;
}

/// Terminal state of one exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExchangeStatus {
    Success,
    Failed,
}

/// Notified when an exchange concludes. Callbacks run outside the
/// mediator's locks.
pub trait ExchangeObserver: Send + Sync {
    fn on_exchange_close(&self, address: &str, status: ExchangeStatus);
}

// ---------------------------------------------------------------------------
// Peer proxy
// ---------------------------------------------------------------------------

/// Authorization standing of a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecurityState {
    Unauthorized,
    Authorized,
}

/// Per-peer connection state: the current receiver and, once an exchange
/// succeeds, the cipher package protecting traffic.
pub struct PeerProxy {
    address: String,
    state: Mutex<SecurityState>,
    receiver: Mutex<Option<Arc<dyn MessageSink>>>,
    package: Mutex<Option<Arc<CipherPackage>>>,
}

impl PeerProxy {
    fn new(address: String) -> Arc<Self> {
        Arc::new(Self {
            address,
            state: Mutex::new(SecurityState::Unauthorized),
            receiver: Mutex::new(None),
            package: Mutex::new(None),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> SecurityState {
        self.state.lock().map(|guard| *guard).unwrap_or(SecurityState::Unauthorized)
    }

    /// The cipher package for application traffic; present once
    /// authorized.
    pub fn cipher_package(&self) -> Option<Arc<CipherPackage>> {
        self.package.lock().ok().and_then(|guard| guard.clone())
    }

    /// Route one inbound message to the current receiver. The receiver
    /// handle is cloned under the lock and invoked after it is released.
    pub fn receive(&self, buffer: &[u8]) -> Result<Option<Vec<u8>>, SecurityError> {
        let receiver = self
            .receiver
            .lock()
            .map_err(|_| SecurityError::Backend("receiver lock poisoned"))?
            .clone();
        match receiver {
            Some(sink) => sink.collect(buffer),
            None => Err(SecurityError::NotReady("no message receiver attached")),
        }
    }

    fn set_receiver(&self, sink: Option<Arc<dyn MessageSink>>) {
        if let Ok(mut guard) = self.receiver.lock() {
            *guard = sink;
        }
    }

    fn set_state(&self, state: SecurityState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = state;
        }
    }

    fn attach_package(&self, package: CipherPackage) {
        if let Ok(mut guard) = self.package.lock() {
            *guard = Some(Arc::new(package));
        }
    }
}

// ---------------------------------------------------------------------------
// Exchange processor
// ---------------------------------------------------------------------------

/// Sink wrapping one synchronizer: the peer's receiver while the exchange
/// is resolving.
pub struct ExchangeProcessor {
    synchronizer: Mutex<Synchronizer>,
    mediator: Weak<Mediator>,
    proxy: Arc<PeerProxy>,
    deadline: Instant,
}

impl ExchangeProcessor {
    fn new(synchronizer: Synchronizer, mediator: Weak<Mediator>, proxy: Arc<PeerProxy>) -> Self {
        Self {
            synchronizer: Mutex::new(synchronizer),
            mediator,
            proxy,
            deadline: Instant::now() + EXCHANGE_EXPIRATION,
        }
    }

    /// Run `initialize`, returning the first outbound frame (empty for the
    /// accepting role).
    fn prepare(&self) -> Result<Vec<u8>, SecurityError> {
        let mut synchronizer = self
            .synchronizer
            .lock()
            .map_err(|_| SecurityError::Backend("synchronizer lock poisoned"))?;
        let result = synchronizer.initialize();
        match result.status {
            SynchronizationStatus::Error => Err(SecurityError::NotReady("exchange unstartable")),
            _ => Ok(result.message),
        }
    }

    fn conclude(&self, status: ExchangeStatus, package: Option<CipherPackage>) {
        if let Some(mediator) = self.mediator.upgrade() {
            mediator.conclude(&self.proxy, status, package);
        } else {
            // No active mediator: treat as no active exchange.
            self.proxy.set_receiver(None);
            self.proxy.set_state(SecurityState::Unauthorized);
        }
    }
}

impl MessageSink for ExchangeProcessor {
    fn collect(&self, buffer: &[u8]) -> Result<Option<Vec<u8>>, SecurityError> {
        if Instant::now() > self.deadline {
            self.conclude(ExchangeStatus::Failed, None);
            return Err(SecurityError::Expired);
        }

        let (result, package) = {
            let mut synchronizer = self
                .synchronizer
                .lock()
                .map_err(|_| SecurityError::Backend("synchronizer lock poisoned"))?;
            let result = synchronizer.synchronize(buffer);
            let package = match result.status {
                SynchronizationStatus::Ready => synchronizer.finalize(),
                _ => None,
            };
            (result, package)
        };

        match result.status {
            SynchronizationStatus::Processing => Ok(Some(result.message)),
            SynchronizationStatus::Ready => {
                self.conclude(ExchangeStatus::Success, package);
                if result.message.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(result.message))
                }
            }
            SynchronizationStatus::Error => {
                self.conclude(ExchangeStatus::Failed, None);
                Err(SecurityError::VerificationFailed)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Mediator
// ---------------------------------------------------------------------------

/// Outcome of declaring an exchange for an address.
pub enum ExchangeDisposition {
    /// A full handshake was started; send the frame (initiator only).
    Exchange { processor: Arc<ExchangeProcessor>, request: Vec<u8> },
    /// The peer is already authorized; probe liveness instead.
    Heartbeat,
}

/// Owns the per-address exchange bookkeeping and performs the sink swap.
pub struct Mediator {
    supported_algorithms: Arc<SupportedAlgorithms>,
    authorized_sink: Weak<dyn MessageSink>,
    resolving: Mutex<HashSet<String>>,
    peers: Mutex<HashMap<String, Arc<PeerProxy>>>,
    observers: Mutex<Vec<Arc<dyn ExchangeObserver>>>,
}

impl Mediator {
    pub fn new(
        supported_algorithms: Arc<SupportedAlgorithms>,
        authorized_sink: Weak<dyn MessageSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            supported_algorithms,
            authorized_sink,
            resolving: Mutex::new(HashSet::new()),
            peers: Mutex::new(HashMap::new()),
            observers: Mutex::new(Vec::new()),
        })
    }

    pub fn register_observer(&self, observer: Arc<dyn ExchangeObserver>) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(observer);
        }
    }

    /// The proxy tracked for `address`, created on first use.
    pub fn proxy(&self, address: &str) -> Arc<PeerProxy> {
        let mut peers = match self.peers.lock() {
            Ok(peers) => peers,
            Err(poisoned) => poisoned.into_inner(),
        };
        peers.entry(address.to_string()).or_insert_with(|| PeerProxy::new(address.to_string())).clone()
    }

    /// Start an exchange as the initiating side. Returns the first frame
    /// to transmit, or `Heartbeat` when the peer is already authorized.
    pub fn declare_initiator(
        self: &Arc<Self>,
        address: &str,
    ) -> Result<ExchangeDisposition, SecurityError> {
        self.declare(address, ExchangeRole::Initiator)
    }

    /// Start an exchange as the accepting side. The processor produces
    /// frames only in response to the initiator's.
    pub fn declare_acceptor(
        self: &Arc<Self>,
        address: &str,
    ) -> Result<Arc<ExchangeProcessor>, SecurityError> {
        match self.declare(address, ExchangeRole::Acceptor)? {
            ExchangeDisposition::Exchange { processor, .. } => Ok(processor),
            // The authorized short-circuit applies to the initiating side.
            ExchangeDisposition::Heartbeat => Err(SecurityError::NotReady("peer already authorized")),
        }
    }

    fn declare(
        self: &Arc<Self>,
        address: &str,
        role: ExchangeRole,
    ) -> Result<ExchangeDisposition, SecurityError> {
        // Lock order: resolving before peers.
        {
            let mut resolving = self
                .resolving
                .lock()
                .map_err(|_| SecurityError::Backend("resolving lock poisoned"))?;
            if resolving.contains(address) {
                return Err(SecurityError::ExchangeInProgress(address.to_string()));
            }
            resolving.insert(address.to_string());
        }

        let proxy = self.proxy(address);
        if role == ExchangeRole::Initiator && proxy.state() == SecurityState::Authorized {
            self.rescind_resolver(address);
            debug!(address, "peer already authorized, probing instead");
            return Ok(ExchangeDisposition::Heartbeat);
        }

        let synchronizer =
            Synchronizer::new(role, Arc::downgrade(&self.supported_algorithms));
        let processor = Arc::new(ExchangeProcessor::new(
            synchronizer,
            Arc::downgrade(self),
            proxy.clone(),
        ));

        let request = match processor.prepare() {
            Ok(request) => request,
            Err(error) => {
                self.rescind_resolver(address);
                warn!(address, %error, "exchange could not be prepared");
                return Err(error);
            }
        };

        proxy.set_receiver(Some(processor.clone() as Arc<dyn MessageSink>));
        debug!(address, ?role, "exchange started");
        Ok(ExchangeDisposition::Exchange { processor, request })
    }

    /// Forget a resolving address and detach its exchange sink. Idempotent:
    /// rescinding an address that is not resolving is a no-op, and an
    /// authorized peer's receiver is left alone.
    pub fn rescind_resolver(&self, address: &str) {
        if let Ok(mut resolving) = self.resolving.lock() {
            resolving.remove(address);
        }

        let proxy = match self.peers.lock() {
            Ok(peers) => peers.get(address).cloned(),
            Err(_) => None,
        };
        if let Some(proxy) = proxy {
            if proxy.state() != SecurityState::Authorized {
                proxy.set_receiver(None);
            }
        }
    }

    fn conclude(&self, proxy: &Arc<PeerProxy>, status: ExchangeStatus, package: Option<CipherPackage>) {
        self.rescind_resolver(proxy.address());

        match status {
            ExchangeStatus::Success => {
                if let Some(package) = package {
                    proxy.attach_package(package);
                }
                // The swap happens under the proxy's receiver lock; the
                // old exchange processor is dropped with it.
                proxy.set_receiver(self.authorized_sink.upgrade());
                proxy.set_state(SecurityState::Authorized);
                debug!(address = proxy.address(), "peer authorized");
            }
            ExchangeStatus::Failed => {
                proxy.set_receiver(None);
                proxy.set_state(SecurityState::Unauthorized);
                warn!(address = proxy.address(), "exchange failed, peer unauthorized");
            }
        }

        let observers = match self.observers.lock() {
            Ok(observers) => observers.clone(),
            Err(_) => Vec::new(),
        };
        for observer in observers {
            observer.on_exchange_close(proxy.address(), status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Algorithms;
    use crate::suite::ConfidentialityLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn catalog() -> Arc<SupportedAlgorithms> {
        let mut catalog = SupportedAlgorithms::new();
        catalog.insert(
            ConfidentialityLevel::High,
            Algorithms::new(vec!["ecdh-p-256"], vec!["aes-256-gcm"], vec!["sha256"]),
        );
        Arc::new(catalog)
    }

    struct CountingSink(AtomicUsize);

    impl MessageSink for CountingSink {
        fn collect(&self, _buffer: &[u8]) -> Result<Option<Vec<u8>>, SecurityError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    struct RecordingObserver(Mutex<Vec<(String, ExchangeStatus)>>);

    impl ExchangeObserver for RecordingObserver {
        fn on_exchange_close(&self, address: &str, status: ExchangeStatus) {
            self.0.lock().unwrap().push((address.to_string(), status));
        }
    }

    fn mediator_pair() -> (Arc<Mediator>, Arc<Mediator>, Arc<CountingSink>, Arc<CountingSink>) {
        let initiator_sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let acceptor_sink = Arc::new(CountingSink(AtomicUsize::new(0)));
        let initiator = Mediator::new(
            catalog(),
            Arc::downgrade(&initiator_sink) as Weak<dyn MessageSink>,
        );
        let acceptor = Mediator::new(
            catalog(),
            Arc::downgrade(&acceptor_sink) as Weak<dyn MessageSink>,
        );
        (initiator, acceptor, initiator_sink, acceptor_sink)
    }

    /// Pump frames between two proxies until neither produces output.
    fn run_exchange(
        initiator: &Arc<Mediator>,
        acceptor: &Arc<Mediator>,
    ) -> (Arc<PeerProxy>, Arc<PeerProxy>) {
        let disposition = initiator.declare_initiator("acceptor:9000").unwrap();
        let ExchangeDisposition::Exchange { request, .. } = disposition else {
            panic!("expected a full exchange");
        };
        acceptor.declare_acceptor("initiator:9000").unwrap();

        let initiator_proxy = initiator.proxy("acceptor:9000");
        let acceptor_proxy = acceptor.proxy("initiator:9000");

        let mut to_acceptor = Some(request);
        for _ in 0..4 {
            let Some(frame) = to_acceptor.take() else { break };
            let reply = acceptor_proxy.receive(&frame).unwrap();
            let Some(frame) = reply else { break };
            to_acceptor = initiator_proxy.receive(&frame).unwrap();
        }

        (initiator_proxy, acceptor_proxy)
    }

    #[test]
    fn successful_exchange_authorizes_both_peers() {
        let (initiator, acceptor, _is, _as) = mediator_pair();
        let (initiator_proxy, acceptor_proxy) = run_exchange(&initiator, &acceptor);

        assert_eq!(initiator_proxy.state(), SecurityState::Authorized);
        assert_eq!(acceptor_proxy.state(), SecurityState::Authorized);

        // Both proxies now carry packages that interoperate.
        let alpha = initiator_proxy.cipher_package().unwrap();
        let omega = acceptor_proxy.cipher_package().unwrap();
        let record = alpha.encrypt(b"post-handshake traffic").unwrap();
        assert_eq!(omega.decrypt(&record).unwrap(), b"post-handshake traffic");
    }

    #[test]
    fn authorized_peer_routes_to_authorized_sink() {
        let (initiator, acceptor, initiator_sink, _as) = mediator_pair();
        let (initiator_proxy, _) = run_exchange(&initiator, &acceptor);

        initiator_proxy.receive(b"application payload").unwrap();
        assert_eq!(initiator_sink.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_declaration_is_rejected() {
        let (initiator, _, _is, _as) = mediator_pair();
        initiator.declare_initiator("peer:1").unwrap();
        assert!(matches!(
            initiator.declare_initiator("peer:1"),
            Err(SecurityError::ExchangeInProgress(_))
        ));
    }

    #[test]
    fn rescission_is_idempotent() {
        let (initiator, _, _is, _as) = mediator_pair();
        initiator.declare_initiator("peer:1").unwrap();
        initiator.rescind_resolver("peer:1");
        initiator.rescind_resolver("peer:1");
        initiator.rescind_resolver("never-declared");
        // The address is free again.
        assert!(initiator.declare_initiator("peer:1").is_ok());
    }

    #[test]
    fn authorized_peer_short_circuits_to_heartbeat() {
        let (initiator, acceptor, _is, _as) = mediator_pair();
        run_exchange(&initiator, &acceptor);
        assert!(matches!(
            initiator.declare_initiator("acceptor:9000"),
            Ok(ExchangeDisposition::Heartbeat)
        ));
    }

    #[test]
    fn garbage_frame_fails_and_unauthorizes() {
        let (_, acceptor, _is, _as) = mediator_pair();
        let observer = Arc::new(RecordingObserver(Mutex::new(Vec::new())));
        acceptor.register_observer(observer.clone());
        acceptor.declare_acceptor("initiator:9000").unwrap();

        let proxy = acceptor.proxy("initiator:9000");
        assert!(proxy.receive(&[0xFF; 64]).is_err());
        assert_eq!(proxy.state(), SecurityState::Unauthorized);
        assert!(proxy.cipher_package().is_none());

        let closes = observer.0.lock().unwrap();
        assert_eq!(closes.as_slice(), &[("initiator:9000".to_string(), ExchangeStatus::Failed)]);

        // The exchange sink was cleared with the failure.
        drop(closes);
        assert!(matches!(proxy.receive(b"more"), Err(SecurityError::NotReady(_))));
    }
}
