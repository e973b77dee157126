use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tether_core::{Payload, Topic};

use crate::error::{Error, Result};
use crate::transport::{
    team_addresses, ConnectionEvent, ConnectionListener, Endpoint, PayloadListener, Publisher,
    Subscriber, Transport,
};

/// One targeting call seen by a [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub endpoint: Endpoint,
    pub at: Instant,
}

/// In-process transport
///
/// Connects instantly to any targeted endpoint marked reachable. Remote
/// behaviour is driven by hand: [`set_reachable`](Self::set_reachable),
/// [`drop_link`](Self::drop_link) and [`inject`](Self::inject).
#[derive(Default)]
pub struct MemoryTransport {
    connected: AtomicBool,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    identity: Option<String>,
    target: Option<Endpoint>,
    remote: Option<String>,
    reachable: HashSet<String>,
    attempts: Vec<Attempt>,
    listeners: Vec<ConnectionListener>,
    publishers: HashMap<String, Arc<MemoryPublisher>>,
    subscribers: HashMap<String, Arc<MemorySubscriber>>,
    publisher_count: HashMap<String, usize>,
    subscriber_count: HashMap<String, usize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark an address as accepting connections
    ///
    /// Making the current target reachable connects it; making the current
    /// remote unreachable drops the link.
    pub fn set_reachable(&self, address: &str, reachable: bool) {
        let change = {
            let mut inner = self.lock();
            if reachable {
                inner.reachable.insert(address.to_string());
            } else {
                inner.reachable.remove(address);
            }

            if inner.remote.as_deref() == Some(address) && !reachable {
                Some(self.disconnect(&mut inner))
            } else if inner.remote.is_none() {
                inner
                    .target
                    .clone()
                    .and_then(|target| self.try_connect(&mut inner, &target))
            } else {
                None
            }
        };
        self.notify(change);
    }

    /// Simulate link loss
    pub fn drop_link(&self) {
        let change = {
            let mut inner = self.lock();
            inner.remote.is_some().then(|| self.disconnect(&mut inner))
        };
        self.notify(change);
    }

    /// Deliver an update from the remote side to the subscriber of `path`
    ///
    /// Returns false if nothing subscribes to `path`.
    pub fn inject(&self, path: &str, payload: Payload) -> bool {
        let subscriber = self.lock().subscribers.get(path).cloned();
        match subscriber {
            Some(subscriber) => {
                subscriber.deliver(payload);
                true
            }
            None => false,
        }
    }

    /// Targeting calls made so far, oldest first
    pub fn attempts(&self) -> Vec<Attempt> {
        self.lock().attempts.clone()
    }

    pub fn clear_attempts(&self) {
        self.lock().attempts.clear();
    }

    pub fn identity(&self) -> Option<String> {
        self.lock().identity.clone()
    }

    pub fn remote(&self) -> Option<String> {
        self.lock().remote.clone()
    }

    /// Everything written to the publisher of `path`, oldest first
    pub fn written(&self, path: &str) -> Vec<Payload> {
        self.lock()
            .publishers
            .get(path)
            .map(|p| p.writes())
            .unwrap_or_default()
    }

    /// Number of publishers ever created for `path`
    pub fn publisher_count(&self, path: &str) -> usize {
        self.lock().publisher_count.get(path).copied().unwrap_or(0)
    }

    /// Number of subscribers ever created for `path`
    pub fn subscriber_count(&self, path: &str) -> usize {
        self.lock().subscriber_count.get(path).copied().unwrap_or(0)
    }

    fn try_connect(&self, inner: &mut Inner, target: &Endpoint) -> Option<ConnectionEvent> {
        let candidates = match target {
            Endpoint::Address(address) => vec![address.clone()],
            Endpoint::Team(team) => team_addresses(*team),
        };
        let remote = candidates
            .into_iter()
            .find(|c| inner.reachable.contains(c))?;
        inner.remote = Some(remote.clone());
        self.connected.store(true, Ordering::Release);
        Some(ConnectionEvent::connected(remote))
    }

    fn disconnect(&self, inner: &mut Inner) -> ConnectionEvent {
        inner.remote = None;
        self.connected.store(false, Ordering::Release);
        ConnectionEvent::disconnected()
    }

    fn target(&self, endpoint: Endpoint) -> Result<()> {
        let change = {
            let mut inner = self.lock();
            if inner.identity.is_none() {
                return Err(Error::NotStarted);
            }
            inner.attempts.push(Attempt {
                endpoint: endpoint.clone(),
                at: Instant::now(),
            });
            let dropped = inner.remote.is_some().then(|| self.disconnect(&mut inner));
            inner.target = Some(endpoint.clone());
            let connected = self.try_connect(&mut inner, &endpoint);
            [dropped, connected]
        };
        for event in change.into_iter().flatten() {
            self.notify(Some(event));
        }
        Ok(())
    }

    fn notify(&self, event: Option<ConnectionEvent>) {
        let Some(event) = event else { return };
        let listeners = self.lock().listeners.clone();
        for listener in listeners {
            listener(&event);
        }
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn start_client(&self, identity: &str) -> Result<()> {
        self.lock().identity = Some(identity.to_string());
        Ok(())
    }

    async fn set_server(&self, address: &str) -> Result<()> {
        if address.trim().is_empty() {
            return Err(Error::InvalidAddress(address.to_string()));
        }
        self.target(Endpoint::Address(address.to_string()))
    }

    async fn set_server_team(&self, team: u32) -> Result<()> {
        self.target(Endpoint::Team(team))
    }

    async fn stop_client(&self) -> Result<()> {
        let change = {
            let mut inner = self.lock();
            inner.identity = None;
            inner.target = None;
            inner.remote.is_some().then(|| self.disconnect(&mut inner))
        };
        self.notify(change);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn add_connection_listener(&self, listener: ConnectionListener) {
        self.lock().listeners.push(listener);
    }

    fn publisher(&self, topic: &Topic) -> Result<Arc<dyn Publisher>> {
        let publisher = Arc::new(MemoryPublisher {
            topic: topic.clone(),
            writes: Mutex::new(Vec::new()),
        });
        let mut inner = self.lock();
        *inner.publisher_count.entry(topic.path.clone()).or_default() += 1;
        inner
            .publishers
            .insert(topic.path.clone(), Arc::clone(&publisher));
        Ok(publisher)
    }

    fn subscriber(&self, topic: &Topic, default: Option<Payload>) -> Result<Arc<dyn Subscriber>> {
        let subscriber = Arc::new(MemorySubscriber {
            topic: topic.clone(),
            default,
            last: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        });
        let mut inner = self.lock();
        *inner.subscriber_count.entry(topic.path.clone()).or_default() += 1;
        inner
            .subscribers
            .insert(topic.path.clone(), Arc::clone(&subscriber));
        Ok(subscriber)
    }
}

struct MemoryPublisher {
    topic: Topic,
    writes: Mutex<Vec<Payload>>,
}

impl MemoryPublisher {
    fn writes(&self) -> Vec<Payload> {
        self.writes
            .lock()
            .map(|w| w.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }
}

impl Publisher for MemoryPublisher {
    fn topic(&self) -> &Topic {
        &self.topic
    }

    fn write(&self, payload: Payload) {
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(payload);
        }
    }
}

struct MemorySubscriber {
    topic: Topic,
    default: Option<Payload>,
    last: Mutex<Option<Payload>>,
    listeners: Mutex<Vec<PayloadListener>>,
}

impl MemorySubscriber {
    fn deliver(&self, payload: Payload) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(payload.clone());
        }
        let listeners = self
            .listeners
            .lock()
            .map(|l| l.clone())
            .unwrap_or_default();
        for listener in listeners {
            listener(&payload);
        }
    }
}

impl Subscriber for MemorySubscriber {
    fn topic(&self) -> &Topic {
        &self.topic
    }

    fn read(&self) -> Option<Payload> {
        self.last
            .lock()
            .ok()
            .and_then(|last| last.clone())
            .or_else(|| self.default.clone())
    }

    fn add_listener(&self, listener: PayloadListener) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener);
        }
    }
}
