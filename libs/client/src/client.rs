use std::sync::{Arc, Mutex};

use serde_json::Value as Json;
use tether_core::{marshal, Payload, WireType};
use tether_fabric::{ConnectionEvent, Publisher, Transport};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{ClientConfig, MonitorConfig};
use crate::dispatch::{Dispatcher, Event, ValueCallback};
use crate::error::Result;
use crate::monitor::{ConnectionMonitor, ConnectionState, MonitorState};
use crate::registry::TopicRegistry;
use crate::structs::{StructTopics, StructType};
use crate::target::{priority_list, Target};

/// Telemetry client
///
/// Owns the failover monitor, the topic registry and the event dispatcher
/// for one transport. Topic calls are synchronous and never wait on the
/// network. After [`close`](Self::close) every call is a no-op or returns
/// its default.
pub struct Client {
    identity: String,
    transport: Arc<dyn Transport>,
    targets: Arc<[Target]>,
    registry: Arc<TopicRegistry>,
    structs: StructTopics,
    dispatcher: Dispatcher,
    monitor: Arc<MonitorState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Client {
    /// Open a client with the targets and timing from `config`
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(config: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::with_targets(
            config.identity.clone(),
            config.targets(),
            config.monitor.clone(),
            transport,
        )
    }

    /// Open a client over an explicit priority list
    ///
    /// Fails with [`Error::NoTargets`](crate::Error::NoTargets) on an empty
    /// list. Must be called from within a Tokio runtime.
    pub fn with_targets(
        identity: impl Into<String>,
        targets: Vec<Target>,
        timing: MonitorConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let identity = identity.into();
        let targets = priority_list(targets)?;

        let (dispatcher, dispatch_task) = Dispatcher::spawn();
        let events = dispatcher.clone();
        transport.add_connection_listener(Arc::new(move |event: &ConnectionEvent| {
            events.send(Event::Connection(event.clone()));
        }));

        let registry = Arc::new(TopicRegistry::new(
            Arc::clone(&transport),
            dispatcher.clone(),
        ));
        let structs = StructTopics::new(Arc::clone(&registry));

        let monitor = ConnectionMonitor::new(
            Arc::clone(&transport),
            Arc::clone(&targets),
            identity.clone(),
            timing,
        );
        let state = monitor.state();
        let monitor_task = monitor.spawn();

        info!(identity = %identity, targets = targets.len(), "client opened");

        Ok(Self {
            identity,
            transport,
            targets,
            registry,
            structs,
            dispatcher,
            monitor: state,
            tasks: Mutex::new(vec![monitor_task, dispatch_task]),
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Candidates in priority order
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn state(&self) -> ConnectionState {
        self.monitor.state()
    }

    /// Whether the transport currently has a live link
    pub fn is_connected(&self) -> bool {
        !self.is_closed() && self.transport.is_connected()
    }

    /// The target the monitor is bound to, while connected
    pub fn current_target(&self) -> Option<&Target> {
        if self.state() != ConnectionState::Connected {
            return None;
        }
        self.monitor
            .target_index()
            .and_then(|index| self.targets.get(index))
    }

    pub fn is_closed(&self) -> bool {
        self.monitor.is_closed()
    }

    /// Get or create the publisher for `path`
    ///
    /// The wire type comes from the first `sample`; later samples do not
    /// change it.
    ///
    /// Unlike the other calls this one fails after [`close`](Self::close)
    /// with [`Error::Closed`](crate::Error::Closed), since there is no handle to hand back.
    pub fn publisher(&self, path: &str, sample: &Json) -> Result<Arc<dyn Publisher>> {
        self.registry.publisher(path, sample)
    }

    /// Publish `value` on `path`, creating the topic on first use
    pub fn publish(&self, path: &str, value: &Json) -> Result<()> {
        self.registry.publish(path, value)
    }

    /// Subscribe to `path`, typed after `default`
    pub fn subscribe(&self, path: &str, default: &Json) -> Result<()> {
        self.registry.subscribe(path, default, None)
    }

    /// Subscribe to `path` and receive every update
    ///
    /// The callback runs on the dispatch task and must not block.
    pub fn subscribe_with<F>(&self, path: &str, default: &Json, callback: F) -> Result<()>
    where
        F: Fn(&str, &Json) + Send + Sync + 'static,
    {
        self.registry
            .subscribe(path, default, Some(json_listener(callback)))
    }

    /// Subscribe to `path` with an explicit wire type
    pub fn subscribe_typed(&self, path: &str, wire_type: WireType) -> Result<()> {
        self.registry.subscribe_typed(path, wire_type, None)
    }

    /// Attach another update listener to `path`
    pub fn add_listener<F>(&self, path: &str, callback: F)
    where
        F: Fn(&str, &Json) + Send + Sync + 'static,
    {
        self.registry.add_listener(path, json_listener(callback));
    }

    /// Be told about each link transition: `(connected, remote identity)`
    pub fn on_connection<F>(&self, callback: F)
    where
        F: Fn(bool, Option<&str>) + Send + Sync + 'static,
    {
        self.dispatcher
            .add_connection_listener(Arc::new(move |event: &ConnectionEvent| {
                callback(event.connected, event.remote_id.as_deref())
            }));
    }

    /// Latest value on `path`, or `default`
    pub fn get(&self, path: &str, default: &Json) -> Json {
        self.registry.get(path, default)
    }

    pub fn publish_struct<T: StructType>(&self, path: &str, value: &T) -> Result<()> {
        self.structs.publish(path, value)
    }

    pub fn subscribe_struct<T: StructType>(&self, path: &str) -> Result<()> {
        self.structs
            .subscribe::<T, fn(&str, &T)>(path, None)
            .map(|_| ())
    }

    pub fn subscribe_struct_with<T, F>(&self, path: &str, callback: F) -> Result<()>
    where
        T: StructType,
        F: Fn(&str, &T) + Send + Sync + 'static,
    {
        self.structs.subscribe(path, Some(callback)).map(|_| ())
    }

    /// Latest `T` on `path`; `None` unless `path` is subscribed as `T`
    pub fn get_struct<T: StructType>(&self, path: &str) -> Option<T> {
        self.structs.get(path)
    }

    /// Shut down; safe to call repeatedly and from any thread
    ///
    /// The monitor stops the transport's client role as it exits.
    pub fn close(&self) {
        if !self.monitor.close() {
            return;
        }
        info!(identity = %self.identity, "closing client");
        self.registry.close();
        self.dispatcher.close();
    }

    /// Close and wait for the background tasks to finish
    pub async fn closed(&self) {
        self.close();
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "background task failed");
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}

fn json_listener<F>(callback: F) -> ValueCallback
where
    F: Fn(&str, &Json) + Send + Sync + 'static,
{
    Arc::new(move |path: &str, payload: &Payload| {
        if let Some(value) = payload.as_value() {
            callback(path, &marshal::decode(value));
        }
    })
}
