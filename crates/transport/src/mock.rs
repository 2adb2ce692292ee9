//! Scriptable in-memory transport for tests and demos.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use herald_core::{Account, DeliveryAck};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::TransportError;
use crate::types::TransportEvent;
use crate::{Transport, TransportFactory};

/// One message captured by [`MockTransport::send_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRecord {
    pub target: String,
    pub text: String,
}

struct MockInner {
    events: broadcast::Sender<TransportEvent>,
    /// Per-connect event scripts, consumed front to back. An exhausted queue
    /// makes `connect` emit [`TransportEvent::Established`].
    scripts: Mutex<VecDeque<Vec<TransportEvent>>>,
    sent: Mutex<Vec<SentRecord>>,
    typing: Mutex<Vec<(String, bool)>>,
    connect_calls: AtomicU32,
    presence_pings: AtomicU32,
    fail_sends: AtomicBool,
    ack_counter: AtomicU32,
}

/// In-memory [`Transport`] whose connection behaviour is driven by the test.
///
/// Cloning is cheap and clones share state, so a test can keep a handle to
/// inspect captured sends while a session owns another.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            inner: Arc::new(MockInner {
                events,
                scripts: Mutex::new(VecDeque::new()),
                sent: Mutex::new(Vec::new()),
                typing: Mutex::new(Vec::new()),
                connect_calls: AtomicU32::new(0),
                presence_pings: AtomicU32::new(0),
                fail_sends: AtomicBool::new(false),
                ack_counter: AtomicU32::new(0),
            }),
        }
    }

    /// Queue the events one `connect` call will replay. Scripts are consumed
    /// in push order; once the queue is empty `connect` emits `Established`.
    /// An empty script makes that connect emit nothing.
    pub fn push_connect_script(&self, events: Vec<TransportEvent>) {
        self.inner
            .scripts
            .lock()
            .expect("scripts lock poisoned")
            .push_back(events);
    }

    /// Make subsequent `send_text` calls fail.
    pub fn set_fail_sends(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Push an event to all subscribers, as if it arrived from the wire.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Messages captured so far, oldest first.
    pub fn sent(&self) -> Vec<SentRecord> {
        self.inner.sent.lock().expect("sent lock poisoned").clone()
    }

    /// Typing-indicator toggles captured so far.
    pub fn typing_records(&self) -> Vec<(String, bool)> {
        self.inner
            .typing
            .lock()
            .expect("typing lock poisoned")
            .clone()
    }

    pub fn connect_count(&self) -> u32 {
        self.inner.connect_calls.load(Ordering::SeqCst)
    }

    pub fn presence_count(&self) -> u32 {
        self.inner.presence_pings.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.inner.connect_calls.fetch_add(1, Ordering::SeqCst);
        let script = self
            .inner
            .scripts
            .lock()
            .expect("scripts lock poisoned")
            .pop_front()
            .unwrap_or_else(|| vec![TransportEvent::Established]);
        debug!(events = script.len(), "mock transport connecting");
        for event in script {
            let _ = self.inner.events.send(event);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send_text(&self, target: &str, text: &str) -> Result<DeliveryAck, TransportError> {
        if self.inner.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("mock send failure".to_string()));
        }
        self.inner
            .sent
            .lock()
            .expect("sent lock poisoned")
            .push(SentRecord {
                target: target.to_string(),
                text: text.to_string(),
            });
        let n = self.inner.ack_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(DeliveryAck::new(format!("mock-{}", n)))
    }

    async fn send_typing(&self, target: &str, started: bool) -> Result<(), TransportError> {
        self.inner
            .typing
            .lock()
            .expect("typing lock poisoned")
            .push((target.to_string(), started));
        Ok(())
    }

    async fn send_presence(&self) -> Result<(), TransportError> {
        self.inner.presence_pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.events.subscribe()
    }
}

/// [`TransportFactory`] that hands out one [`MockTransport`] per account
/// address, so tests can reach the same instance the engine uses.
pub struct MockFactory {
    transports: Mutex<HashMap<String, MockTransport>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            transports: Mutex::new(HashMap::new()),
        }
    }

    /// The transport previously created for this account, if any.
    pub fn transport_for(&self, address: &str) -> Option<MockTransport> {
        self.transports
            .lock()
            .expect("factory lock poisoned")
            .get(address)
            .cloned()
    }
}

impl Default for MockFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for MockFactory {
    fn create(&self, account: &Account) -> Arc<dyn Transport> {
        let transport = self
            .transports
            .lock()
            .expect("factory lock poisoned")
            .entry(account.address.clone())
            .or_insert_with(MockTransport::new)
            .clone();
        Arc::new(transport)
    }
}
