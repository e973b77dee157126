//! Tether Client - Failover telemetry client
//!
//! A [`Client`] keeps one transport linked to the best reachable server from
//! a prioritized target list, and exposes topics as dynamically typed
//! values (`serde_json::Value`) or typed [`StructType`]s.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use tether_client::{Client, ClientConfig, Pose2d};
//! use tether_fabric::TcpTransport;
//!
//! # async fn example() -> tether_client::Result<()> {
//! let config = ClientConfig {
//!     identity: "dashboard".into(),
//!     team: Some(5515),
//!     ..ClientConfig::default()
//! };
//! let client = Client::open(&config, Arc::new(TcpTransport::new()))?;
//!
//! client.subscribe_with("speed", &json!(0.0), |path, value| {
//!     println!("{} = {}", path, value);
//! })?;
//! client.subscribe_struct::<Pose2d>("MyPose")?;
//! client.publish("enabled", &json!(true))?;
//!
//! if let Some(pose) = client.get_struct::<Pose2d>("MyPose") {
//!     println!("{}", pose);
//! }
//! client.closed().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod monitor;
pub mod pose;
pub mod registry;
pub mod structs;
pub mod target;

// Re-exports for convenience
pub use client::Client;
pub use config::{ClientConfig, MonitorConfig};
pub use dispatch::{Dispatcher, Event};
pub use error::{Error, Result};
pub use monitor::{ConnectionMonitor, ConnectionState, MonitorState};
pub use pose::Pose2d;
pub use registry::{TopicKind, TopicRegistry};
pub use structs::{StructTopics, StructType};
pub use target::{priority_list, Target, LOCALHOST};
