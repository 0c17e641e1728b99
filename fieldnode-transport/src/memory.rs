//! In-process broker.
//!
//! [`MemoryBroker`] keeps retained messages, routes publishes to exact-match
//! subscribers and records the most recent publishes. It backs the demo mode
//! and lets tests simulate a broker that goes away and comes back.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{Result, TransportError};
use crate::transport::{ConnectionState, InboundMessage, Transport};

/// Number of publishes the broker remembers by default.
pub const DEFAULT_LOG_CAPACITY: usize = 1024;

/// A publish seen by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Client that published, `None` for broker-side injections.
    pub client_id: Option<String>,
    /// Topic.
    pub topic: String,
    /// Payload.
    pub payload: Vec<u8>,
    /// Whether the broker retained it.
    pub retained: bool,
    /// When it reached the broker.
    pub at: Instant,
}

impl PublishedMessage {
    /// Payload as text, replacing invalid UTF-8.
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Debug)]
struct ClientSlot {
    id: String,
    generation: u64,
    subscriptions: Vec<String>,
    tx: mpsc::UnboundedSender<InboundMessage>,
}

#[derive(Debug)]
struct BrokerState {
    online: bool,
    refused_connects: u32,
    next_generation: u64,
    retained: HashMap<String, Vec<u8>>,
    clients: Vec<ClientSlot>,
    log: VecDeque<PublishedMessage>,
    log_capacity: usize,
}

impl BrokerState {
    fn route(&mut self, client_id: Option<&str>, topic: &str, payload: Vec<u8>, retained: bool) {
        for client in &self.clients {
            if client.subscriptions.iter().any(|s| s == topic) {
                // A closed receiver just means that client is going away.
                let _ = client.tx.send(InboundMessage::new(topic, payload.clone()));
            }
        }

        if retained {
            self.retained.insert(topic.to_string(), payload.clone());
        }

        if self.log_capacity == 0 {
            return;
        }
        if self.log.len() == self.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(PublishedMessage {
            client_id: client_id.map(str::to_string),
            topic: topic.to_string(),
            payload,
            retained,
            at: Instant::now(),
        });
    }

    fn has_generation(&self, generation: u64) -> bool {
        self.clients.iter().any(|c| c.generation == generation)
    }
}

/// Shared handle to an in-process broker.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Create an online broker with no retained messages, remembering the
    /// last [`DEFAULT_LOG_CAPACITY`] publishes.
    pub fn new() -> Self {
        Self::with_log_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// Create a broker that remembers at most `capacity` publishes, oldest
    /// dropped first. Zero disables the log.
    pub fn with_log_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                online: true,
                refused_connects: 0,
                next_generation: 1,
                retained: HashMap::new(),
                clients: Vec::new(),
                log: VecDeque::new(),
                log_capacity: capacity,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a transport attached to this broker.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            broker: self.clone(),
            client_id: None,
            generation: 0,
            rx: None,
            state: ConnectionState::Disconnected,
        }
    }

    /// Publish from outside any client session.
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.lock().route(None, topic, payload.into(), false);
    }

    /// Publish and keep the payload as the topic's retained value.
    pub fn retain(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        self.lock().route(None, topic, payload.into(), true);
    }

    /// Retained value of a topic.
    pub fn retained(&self, topic: &str) -> Option<Vec<u8>> {
        self.lock().retained.get(topic).cloned()
    }

    /// Take the broker up or down. Going down drops every client session.
    pub fn set_online(&self, online: bool) {
        let mut state = self.lock();
        state.online = online;
        if !online {
            state.clients.clear();
        }
    }

    /// Whether the broker accepts connections.
    pub fn is_online(&self) -> bool {
        self.lock().online
    }

    /// Drop every client session while staying reachable.
    pub fn disconnect_all(&self) {
        self.lock().clients.clear();
    }

    /// Refuse the next `count` connect attempts.
    pub fn refuse_connects(&self, count: u32) {
        self.lock().refused_connects = count;
    }

    /// Whether a client with this identity currently holds a session.
    pub fn is_connected(&self, client_id: &str) -> bool {
        self.lock().clients.iter().any(|c| c.id == client_id)
    }

    /// Every remembered publish, in arrival order.
    pub fn published_all(&self) -> Vec<PublishedMessage> {
        self.lock().log.iter().cloned().collect()
    }

    /// Remembered publishes on one topic, in arrival order.
    pub fn published(&self, topic: &str) -> Vec<PublishedMessage> {
        self.lock()
            .log
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Forget the publish log.
    pub fn clear_log(&self) {
        self.lock().log.clear();
    }
}

/// Client side of a [`MemoryBroker`].
#[derive(Debug)]
pub struct MemoryTransport {
    broker: MemoryBroker,
    client_id: Option<String>,
    generation: u64,
    rx: Option<mpsc::UnboundedReceiver<InboundMessage>>,
    state: ConnectionState,
}

impl MemoryTransport {
    /// Broker this transport talks to.
    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    fn session_alive(&self) -> bool {
        self.generation != 0 && self.broker.lock().has_generation(self.generation)
    }

    fn drop_session(&mut self) {
        self.rx = None;
        self.generation = 0;
        self.state = ConnectionState::Disconnected;
    }
}

impl Transport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn state(&self) -> ConnectionState {
        if self.state == ConnectionState::Connected && !self.session_alive() {
            ConnectionState::Disconnected
        } else {
            self.state
        }
    }

    async fn connect(&mut self, client_id: &str) -> Result<()> {
        self.drop_session();
        self.state = ConnectionState::Connecting;

        let mut state = self.broker.lock();
        if !state.online {
            drop(state);
            self.state = ConnectionState::Disconnected;
            return Err(TransportError::connection("broker unreachable"));
        }
        if state.refused_connects > 0 {
            state.refused_connects -= 1;
            drop(state);
            self.state = ConnectionState::Disconnected;
            return Err(TransportError::Rejected("server unavailable".to_string()));
        }

        let generation = state.next_generation;
        state.next_generation += 1;
        state.clients.retain(|c| c.id != client_id);

        let (tx, rx) = mpsc::unbounded_channel();
        state.clients.push(ClientSlot {
            id: client_id.to_string(),
            generation,
            subscriptions: Vec::new(),
            tx,
        });
        drop(state);

        self.client_id = Some(client_id.to_string());
        self.generation = generation;
        self.rx = Some(rx);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        if !self.state().is_usable() {
            return Err(TransportError::NotConnected);
        }

        let mut state = self.broker.lock();
        let retained = state.retained.get(topic).cloned();
        let Some(slot) = state
            .clients
            .iter_mut()
            .find(|c| c.generation == self.generation)
        else {
            return Err(TransportError::NotConnected);
        };

        if !slot.subscriptions.iter().any(|s| s == topic) {
            slot.subscriptions.push(topic.to_string());
        }
        if let Some(payload) = retained {
            let _ = slot.tx.send(InboundMessage::new(topic, payload));
        }
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        if !self.state().is_usable() {
            return Err(TransportError::Publish {
                topic: topic.to_string(),
                message: "not connected".to_string(),
            });
        }

        let client_id = self.client_id.clone();
        self.broker
            .lock()
            .route(client_id.as_deref(), topic, payload, false);
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<InboundMessage>> {
        let Some(rx) = self.rx.as_mut() else {
            tokio::time::sleep(timeout).await;
            return Err(TransportError::NotConnected);
        };

        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => {
                self.drop_session();
                Err(TransportError::lost("session closed by broker"))
            }
            Err(_) if !self.session_alive() => {
                self.drop_session();
                Err(TransportError::lost("session closed by broker"))
            }
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_retained_delivered_on_subscribe() {
        let broker = MemoryBroker::new();
        broker.retain("/config/01", b"{\"channels\":1}".to_vec());

        let mut transport = broker.transport();
        assert_ok!(transport.connect("01").await);
        assert_ok!(transport.subscribe("/config/01").await);

        let message = transport.poll(Duration::from_millis(10)).await.unwrap();
        assert_eq!(
            message,
            Some(InboundMessage::new("/config/01", b"{\"channels\":1}".to_vec()))
        );
    }

    #[tokio::test]
    async fn test_publish_routes_to_subscribers() {
        let broker = MemoryBroker::new();
        let mut listener = broker.transport();
        let mut talker = broker.transport();

        assert_ok!(listener.connect("listener").await);
        assert_ok!(listener.subscribe("/firstConnect").await);
        assert_ok!(talker.connect("talker").await);
        assert_ok!(talker.publish("/firstConnect", b"AABB".to_vec()).await);
        assert_ok!(talker.publish("/temp", b"{}".to_vec()).await);

        let message = listener.poll(Duration::from_millis(10)).await.unwrap();
        assert_eq!(message.map(|m| m.payload), Some(b"AABB".to_vec()));
        assert_eq!(listener.poll(Duration::from_millis(10)).await.unwrap(), None);

        let log = broker.published("/firstConnect");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].client_id.as_deref(), Some("talker"));
        assert_eq!(log[0].payload_str(), "AABB");
    }

    #[tokio::test]
    async fn test_offline_broker_refuses_and_drops() {
        let broker = MemoryBroker::new();
        let mut transport = broker.transport();
        assert_ok!(transport.connect("node").await);
        assert!(transport.state().is_usable());

        broker.set_online(false);
        assert_eq!(transport.state(), ConnectionState::Disconnected);
        assert!(transport.poll(Duration::from_millis(10)).await.is_err());
        assert!(transport.connect("node").await.is_err());
        assert!(transport.publish("/temp", Vec::new()).await.is_err());

        broker.set_online(true);
        assert_ok!(transport.connect("node").await);
        assert!(broker.is_connected("node"));
    }

    #[tokio::test]
    async fn test_refused_connects_are_counted() {
        let broker = MemoryBroker::new();
        broker.refuse_connects(2);

        let mut transport = broker.transport();
        assert!(matches!(
            transport.connect("node").await,
            Err(TransportError::Rejected(_))
        ));
        assert!(transport.connect("node").await.is_err());
        assert_ok!(transport.connect("node").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_log_is_bounded() {
        let broker = MemoryBroker::with_log_capacity(100);
        let mut transport = broker.transport();
        assert_ok!(transport.connect("node").await);

        for i in 0..10_000u32 {
            assert_ok!(transport.publish("/temp", i.to_string().into_bytes()).await);
            tokio::time::sleep(Duration::from_millis(1000)).await;
        }

        let log = broker.published("/temp");
        assert_eq!(log.len(), 100);
        assert_eq!(log[0].payload_str(), "9900");
        assert_eq!(log[99].payload_str(), "9999");
    }

    #[tokio::test]
    async fn test_disabled_log_still_routes() {
        let broker = MemoryBroker::with_log_capacity(0);
        let mut listener = broker.transport();
        let mut talker = broker.transport();

        assert_ok!(listener.connect("listener").await);
        assert_ok!(listener.subscribe("/temp").await);
        assert_ok!(talker.connect("talker").await);
        assert_ok!(talker.publish("/temp", b"{}".to_vec()).await);

        let message = listener.poll(Duration::from_millis(10)).await.unwrap();
        assert!(message.is_some());
        assert!(broker.published_all().is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_replaces_old_session() {
        let broker = MemoryBroker::new();
        let mut first = broker.transport();
        let mut second = broker.transport();

        assert_ok!(first.connect("node").await);
        assert_ok!(second.connect("node").await);

        assert_eq!(first.state(), ConnectionState::Disconnected);
        assert_eq!(second.state(), ConnectionState::Connected);
    }
}
