use std::fmt;
use std::sync::Arc;

use tether_core::{Payload, Topic};

use crate::error::Result;

pub mod memory;
pub mod tcp;

pub use self::memory::{Attempt, MemoryTransport};
pub use self::tcp::{TcpTransport, TcpTransportBuilder, DEFAULT_PORT};

/// Change of link state reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    pub connected: bool,
    /// Remote identity, when connected
    pub remote_id: Option<String>,
}

impl ConnectionEvent {
    pub fn connected(remote_id: impl Into<String>) -> Self {
        Self {
            connected: true,
            remote_id: Some(remote_id.into()),
        }
    }

    pub fn disconnected() -> Self {
        Self {
            connected: false,
            remote_id: None,
        }
    }
}

/// Callback for link state changes
///
/// Invoked on whatever thread the transport reports events on.
pub type ConnectionListener = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Callback for values received on a subscribed topic
pub type PayloadListener = Arc<dyn Fn(&Payload) + Send + Sync>;

/// Where a client should look for its server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Host name or IP, optionally with `:port`
    Address(String),
    /// Team number, resolved with [`team_addresses`]
    Team(u32),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Address(address) => f.write_str(address),
            Endpoint::Team(team) => write!(f, "team {}", team),
        }
    }
}

/// Candidate hosts for a team number, most specific first
pub fn team_addresses(team: u32) -> Vec<String> {
    vec![
        format!("10.{}.{}.2", team / 100, team % 100),
        format!("roborio-{}-FRC.local", team),
        "172.22.11.2".to_string(),
        format!("roborio-{}-FRC.lan", team),
        format!("roborio-{}-FRC.frc-field.local", team),
    ]
}

/// Client side of a telemetry transport
///
/// Targeting calls are async and may be slow; everything else is a local,
/// non-blocking operation. Implementations keep the link alive on their
/// own once a server is set and report transitions to connection
/// listeners.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Take the client role under `identity`
    async fn start_client(&self, identity: &str) -> Result<()>;

    /// Target a server by address
    async fn set_server(&self, address: &str) -> Result<()>;

    /// Target a server by team number
    async fn set_server_team(&self, team: u32) -> Result<()>;

    /// Drop the client role and any live link
    async fn stop_client(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    fn add_connection_listener(&self, listener: ConnectionListener);

    /// Create the publisher for `topic`
    fn publisher(&self, topic: &Topic) -> Result<Arc<dyn Publisher>>;

    /// Create the subscriber for `topic`
    ///
    /// `default` is what [`Subscriber::read`] returns before any update.
    fn subscriber(&self, topic: &Topic, default: Option<Payload>) -> Result<Arc<dyn Subscriber>>;
}

/// Write side of a topic
pub trait Publisher: Send + Sync {
    fn topic(&self) -> &Topic;

    /// Queue a value for sending; never blocks on the network
    fn write(&self, payload: Payload);
}

/// Read side of a topic
pub trait Subscriber: Send + Sync {
    fn topic(&self) -> &Topic;

    /// Latest received value, else the default
    fn read(&self) -> Option<Payload>;

    /// Called once per received update, in arrival order
    fn add_listener(&self, listener: PayloadListener);
}
