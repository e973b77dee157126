use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tether_core::{Payload, Topic};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::frame::{self, Frame, FrameReader, FrameWriter};
use crate::transport::{
    team_addresses, ConnectionEvent, ConnectionListener, PayloadListener, Publisher, Subscriber,
    Transport,
};

/// Port used when an address doesn't carry one
pub const DEFAULT_PORT: u16 = 5810;

/// TCP client transport with length-prefix framing
///
/// Targeting a server spawns a session task that keeps trying the
/// resolved endpoints until it links up, and retries the same server after
/// link loss until it is retargeted or stopped. Publishers and subscribers
/// outlive sessions and are re-announced on every new link.
pub struct TcpTransport {
    shared: Arc<Shared>,
    identity: Mutex<Option<String>>,
    session: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    port: u16,
    connect_timeout: Duration,
    retry_delay: Duration,
    connected: AtomicBool,
    link: Mutex<Link>,
    listeners: Mutex<Vec<ConnectionListener>>,
    topics: Mutex<Topics>,
}

/// Current session; a bumped generation invalidates older sessions
#[derive(Default)]
struct Link {
    generation: u64,
    remote: Option<String>,
    outbound: Option<mpsc::UnboundedSender<Frame>>,
}

#[derive(Default)]
struct Topics {
    publishers: HashMap<String, Arc<TcpPublisher>>,
    subscribers: HashMap<String, Arc<TcpSubscriber>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl TcpTransport {
    /// Transport on the default port
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for configuring the transport
    pub fn builder() -> TcpTransportBuilder {
        TcpTransportBuilder::new()
    }

    fn target(&self, endpoints: Vec<String>) -> Result<()> {
        let identity = lock(&self.identity).clone().ok_or(Error::NotStarted)?;
        if let Some(old) = lock(&self.session).take() {
            old.abort();
        }
        let generation = self.shared.reset();

        debug!(?endpoints, generation, "targeting server");
        let handle = tokio::spawn(run_session(
            Arc::clone(&self.shared),
            generation,
            identity,
            endpoints,
        ));
        *lock(&self.session) = Some(handle);
        Ok(())
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(session) = lock(&self.session).take() {
            session.abort();
        }
    }
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
    async fn start_client(&self, identity: &str) -> Result<()> {
        *lock(&self.identity) = Some(identity.to_string());
        Ok(())
    }

    async fn set_server(&self, address: &str) -> Result<()> {
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::InvalidAddress(address.to_string()));
        }
        self.target(vec![with_port(address, self.shared.port)])
    }

    async fn set_server_team(&self, team: u32) -> Result<()> {
        let endpoints = team_addresses(team)
            .iter()
            .map(|host| with_port(host, self.shared.port))
            .collect();
        self.target(endpoints)
    }

    async fn stop_client(&self) -> Result<()> {
        if let Some(session) = lock(&self.session).take() {
            session.abort();
        }
        *lock(&self.identity) = None;
        self.shared.reset();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn add_connection_listener(&self, listener: ConnectionListener) {
        lock(&self.shared.listeners).push(listener);
    }

    fn publisher(&self, topic: &Topic) -> Result<Arc<dyn Publisher>> {
        let publisher = Arc::new(TcpPublisher {
            topic: topic.clone(),
            last: Mutex::new(None),
            shared: Arc::downgrade(&self.shared),
        });
        lock(&self.shared.topics)
            .publishers
            .insert(topic.path.clone(), Arc::clone(&publisher));
        self.shared.send(Frame::Announce {
            topic: topic.path.clone(),
            wire_type: topic.wire_type.to_string(),
        });
        Ok(publisher)
    }

    fn subscriber(&self, topic: &Topic, default: Option<Payload>) -> Result<Arc<dyn Subscriber>> {
        let subscriber = Arc::new(TcpSubscriber {
            topic: topic.clone(),
            default,
            last: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        });
        lock(&self.shared.topics)
            .subscribers
            .insert(topic.path.clone(), Arc::clone(&subscriber));
        self.shared.send(Frame::Subscribe {
            topic: topic.path.clone(),
            wire_type: topic.wire_type.to_string(),
        });
        Ok(subscriber)
    }
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        lock(&self.link).generation == generation
    }

    /// Invalidate the running session and drop its link
    fn reset(&self) -> u64 {
        let (generation, was_connected) = {
            let mut link = lock(&self.link);
            link.generation += 1;
            link.outbound = None;
            let was_connected = link.remote.take().is_some();
            self.connected.store(false, Ordering::Release);
            (link.generation, was_connected)
        };
        if was_connected {
            self.fire(&ConnectionEvent::disconnected());
        }
        generation
    }

    fn link_up(&self, generation: u64, remote: &str, outbound: mpsc::UnboundedSender<Frame>) -> bool {
        {
            let mut link = lock(&self.link);
            if link.generation != generation {
                return false;
            }
            link.remote = Some(remote.to_string());
            link.outbound = Some(outbound);
            self.connected.store(true, Ordering::Release);
        }
        info!("Linked to {}", remote);
        self.fire(&ConnectionEvent::connected(remote));
        true
    }

    fn link_down(&self, generation: u64) {
        {
            let mut link = lock(&self.link);
            if link.generation != generation || link.remote.is_none() {
                return;
            }
            link.remote = None;
            link.outbound = None;
            self.connected.store(false, Ordering::Release);
        }
        self.fire(&ConnectionEvent::disconnected());
    }

    fn fire(&self, event: &ConnectionEvent) {
        let listeners = lock(&self.listeners).clone();
        for listener in listeners {
            listener(event);
        }
    }

    /// Queue a frame on the live link, if any
    fn send(&self, frame: Frame) {
        if let Some(outbound) = &lock(&self.link).outbound {
            // A closed receiver means the session is ending; the frame is
            // replayed from the snapshot on the next link.
            let _ = outbound.send(frame);
        }
    }

    /// Frames that re-establish all topics on a fresh link
    fn snapshot(&self) -> Vec<Frame> {
        let topics = lock(&self.topics);
        let mut frames = Vec::new();
        for publisher in topics.publishers.values() {
            frames.push(Frame::Announce {
                topic: publisher.topic.path.clone(),
                wire_type: publisher.topic.wire_type.to_string(),
            });
            if let Some(payload) = lock(&publisher.last).clone() {
                frames.push(Frame::Update {
                    topic: publisher.topic.path.clone(),
                    payload,
                });
            }
        }
        for subscriber in topics.subscribers.values() {
            frames.push(Frame::Subscribe {
                topic: subscriber.topic.path.clone(),
                wire_type: subscriber.topic.wire_type.to_string(),
            });
        }
        frames
    }

    fn deliver(&self, path: &str, payload: Payload) {
        let subscriber = lock(&self.topics).subscribers.get(path).cloned();
        let Some(subscriber) = subscriber else {
            debug!(topic = path, "update for unsubscribed topic");
            return;
        };
        if payload.wire_type() != subscriber.topic.wire_type {
            warn!(
                topic = path,
                expected = %subscriber.topic.wire_type,
                received = %payload.wire_type(),
                "dropping update with mismatched type"
            );
            return;
        }
        subscriber.deliver(payload);
    }
}

async fn run_session(
    shared: Arc<Shared>,
    generation: u64,
    identity: String,
    endpoints: Vec<String>,
) {
    loop {
        for endpoint in &endpoints {
            if !shared.is_current(generation) {
                return;
            }
            match frame::connect(endpoint, shared.connect_timeout).await {
                Ok(stream) => {
                    let remote = stream
                        .peer_addr()
                        .map(|addr| addr.to_string())
                        .unwrap_or_else(|_| endpoint.clone());
                    match serve(&shared, generation, &identity, &remote, stream).await {
                        Ok(()) => debug!(remote = %remote, "link closed"),
                        Err(e) => info!("Link to {} lost: {}", remote, e),
                    }
                }
                Err(e) => debug!(endpoint = %endpoint, error = %e, "connect failed"),
            }
        }
        tokio::time::sleep(shared.retry_delay).await;
    }
}

async fn serve(
    shared: &Shared,
    generation: u64,
    identity: &str,
    remote: &str,
    stream: TcpStream,
) -> Result<()> {
    let (mut reader, mut writer) = frame::split(stream);
    let (outbound, mut queued) = mpsc::unbounded_channel();
    if !shared.link_up(generation, remote, outbound) {
        return Ok(());
    }

    let result = exchange(shared, identity, &mut reader, &mut writer, &mut queued).await;
    shared.link_down(generation);
    result
}

/// Handshake, replay topic state, then pump frames both ways
async fn exchange<R, W>(
    shared: &Shared,
    identity: &str,
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    queued: &mut mpsc::UnboundedReceiver<Frame>,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    writer
        .send(&Frame::Hello {
            identity: identity.to_string(),
        })
        .await?;
    for frame in shared.snapshot() {
        writer.send(&frame).await?;
    }
    tokio::select! {
        r = pump_outbound(writer, queued) => r,
        r = pump_inbound(shared, reader) => r,
    }
}

async fn pump_outbound<W: AsyncWrite + Unpin + Send>(
    writer: &mut FrameWriter<W>,
    queued: &mut mpsc::UnboundedReceiver<Frame>,
) -> Result<()> {
    // Ends when the link is reset and the sender dropped
    while let Some(frame) = queued.recv().await {
        writer.send(&frame).await?;
    }
    Ok(())
}

async fn pump_inbound<R: AsyncRead + Unpin + Send>(
    shared: &Shared,
    reader: &mut FrameReader<R>,
) -> Result<()> {
    loop {
        match reader.receive().await? {
            Frame::Update { topic, payload } => shared.deliver(&topic, payload),
            other => debug!(frame = ?other, "ignoring frame"),
        }
    }
}

/// Append the default port unless `address` carries one
fn with_port(address: &str, port: u16) -> String {
    if address.parse::<SocketAddr>().is_ok() {
        return address.to_string();
    }
    if let Ok(ip) = address.parse::<IpAddr>() {
        return SocketAddr::new(ip, port).to_string();
    }
    match address.rsplit_once(':') {
        Some((_, p)) if p.parse::<u16>().is_ok() => address.to_string(),
        _ => format!("{}:{}", address, port),
    }
}

struct TcpPublisher {
    topic: Topic,
    last: Mutex<Option<Payload>>,
    shared: Weak<Shared>,
}

impl Publisher for TcpPublisher {
    fn topic(&self) -> &Topic {
        &self.topic
    }

    fn write(&self, payload: Payload) {
        *lock(&self.last) = Some(payload.clone());
        if let Some(shared) = self.shared.upgrade() {
            shared.send(Frame::Update {
                topic: self.topic.path.clone(),
                payload,
            });
        }
    }
}

struct TcpSubscriber {
    topic: Topic,
    default: Option<Payload>,
    last: Mutex<Option<Payload>>,
    listeners: Mutex<Vec<PayloadListener>>,
}

impl TcpSubscriber {
    fn deliver(&self, payload: Payload) {
        *lock(&self.last) = Some(payload.clone());
        let listeners = lock(&self.listeners).clone();
        for listener in listeners {
            listener(&payload);
        }
    }
}

impl Subscriber for TcpSubscriber {
    fn topic(&self) -> &Topic {
        &self.topic
    }

    fn read(&self) -> Option<Payload> {
        lock(&self.last).clone().or_else(|| self.default.clone())
    }

    fn add_listener(&self, listener: PayloadListener) {
        lock(&self.listeners).push(listener);
    }
}

/// Builder for configuring TCP transport
pub struct TcpTransportBuilder {
    port: u16,
    connect_timeout: Duration,
    retry_delay: Duration,
}

impl Default for TcpTransportBuilder {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            connect_timeout: Duration::from_secs(1),
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl TcpTransportBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Port used for addresses without one
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the per-endpoint connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Delay between passes over a server's endpoints
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn build(self) -> TcpTransport {
        TcpTransport {
            shared: Arc::new(Shared {
                port: self.port,
                connect_timeout: self.connect_timeout,
                retry_delay: self.retry_delay,
                connected: AtomicBool::new(false),
                link: Mutex::new(Link::default()),
                listeners: Mutex::new(Vec::new()),
                topics: Mutex::new(Topics::default()),
            }),
            identity: Mutex::new(None),
            session: Mutex::new(None),
        }
    }
}
