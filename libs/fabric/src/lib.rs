//! Tether Fabric - Transport substrate for telemetry clients
//!
//! Defines the [`Transport`] interface a client drives (targeting,
//! link state, topic publishers and subscribers) and ships two
//! implementations: [`TcpTransport`], speaking length-prefixed bincode
//! [`Frame`]s over TCP, and the in-process [`MemoryTransport`].
//!
//! # Example
//!
//! ```no_run
//! use tether_core::{Topic, Value, WireType};
//! use tether_fabric::{TcpTransport, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = TcpTransport::new();
//! transport.start_client("dashboard").await?;
//! transport.set_server_team(5515).await?;
//!
//! let publisher = transport.publisher(&Topic::publish("speed", WireType::Double))?;
//! publisher.write(Value::Double(1.5).into());
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod frame;
pub mod transport;

// Re-exports for convenience
pub use error::{Error, Result};
pub use frame::Frame;
pub use transport::{
    ConnectionEvent, ConnectionListener, Endpoint, MemoryTransport, PayloadListener, Publisher,
    Subscriber, TcpTransport, Transport,
};
