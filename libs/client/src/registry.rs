//! Live publish and subscribe bindings, one per (path, direction).

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value as Json;
use tether_core::{marshal, Payload, Topic, WireType};
use tether_fabric::{Publisher, Subscriber, Transport};
use tracing::{debug, warn};

use crate::dispatch::{Dispatcher, Event, ValueCallback};
use crate::error::{Error, Result};

/// What a path carries; one kind per path across both directions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicKind {
    Primitive,
    Struct(String),
}

impl fmt::Display for TopicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicKind::Primitive => f.write_str("primitive"),
            TopicKind::Struct(type_id) => write!(f, "struct {}", type_id),
        }
    }
}

struct Binding<H: ?Sized> {
    kind: TopicKind,
    handle: Arc<H>,
}

#[derive(Default)]
struct Bindings {
    publishers: HashMap<String, Binding<dyn Publisher>>,
    subscribers: HashMap<String, Binding<dyn Subscriber>>,
}

impl Bindings {
    fn check_kind(&self, path: &str, kind: &TopicKind) -> Result<()> {
        let existing = self
            .publishers
            .get(path)
            .map(|b| &b.kind)
            .or_else(|| self.subscribers.get(path).map(|b| &b.kind));

        match existing {
            Some(existing) if existing != kind => Err(Error::TopicKindConflict {
                path: path.to_string(),
                existing: existing.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Source of truth for which paths have live bindings
///
/// The lock covers map lookups and local handle creation only; writes and
/// reads on the handles happen after it is released.
pub struct TopicRegistry {
    transport: Arc<dyn Transport>,
    dispatcher: Dispatcher,
    bindings: Mutex<Bindings>,
    closed: AtomicBool,
}

impl TopicRegistry {
    pub fn new(transport: Arc<dyn Transport>, dispatcher: Dispatcher) -> Self {
        Self {
            transport,
            dispatcher,
            bindings: Mutex::new(Bindings::default()),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Bindings> {
        self.bindings.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publisher for `path`, created with the wire type inferred from
    /// `sample` on first call and reused afterwards whatever `sample` is
    pub fn publisher(&self, path: &str, sample: &Json) -> Result<Arc<dyn Publisher>> {
        self.bind_publisher(path, TopicKind::Primitive, || {
            marshal::infer_wire_type(sample)
        })
    }

    /// Get or create the publisher for `path`
    pub(crate) fn bind_publisher(
        &self,
        path: &str,
        kind: TopicKind,
        wire_type: impl FnOnce() -> WireType,
    ) -> Result<Arc<dyn Publisher>> {
        let mut bindings = self.lock();
        if self.is_closed() {
            return Err(Error::Closed);
        }
        bindings.check_kind(path, &kind)?;
        if let Some(binding) = bindings.publishers.get(path) {
            return Ok(Arc::clone(&binding.handle));
        }

        let topic = Topic::publish(path, wire_type());
        debug!(topic = path, wire_type = %topic.wire_type, "creating publisher");
        let handle = self.transport.publisher(&topic)?;
        bindings.publishers.insert(
            path.to_string(),
            Binding {
                kind,
                handle: Arc::clone(&handle),
            },
        );
        Ok(handle)
    }

    /// Marshal `value` and write it to the publisher for `path`
    ///
    /// A value shaped differently from the topic's fixed type is coerced
    /// best-effort; one that cannot be coerced is dropped. No-op once closed.
    pub fn publish(&self, path: &str, value: &Json) -> Result<()> {
        let encoded = marshal::encode(value);
        let publisher = match self.bind_publisher(path, TopicKind::Primitive, || {
            marshal::infer_wire_type(value)
        }) {
            Ok(publisher) => publisher,
            Err(Error::Closed) => return Ok(()),
            Err(e) => return Err(e),
        };

        let wire_type = &publisher.topic().wire_type;
        let value = if *wire_type == encoded.wire_type() {
            Some(encoded)
        } else {
            marshal::encode_as(value, wire_type)
        };
        match value {
            Some(value) => publisher.write(value.into()),
            None => warn!(topic = path, wire_type = %wire_type, "dropping value of incompatible shape"),
        }
        Ok(())
    }

    /// Subscribe to `path` with the wire type inferred from `default`
    ///
    /// `callback` is registered only when this call creates the
    /// subscription; attach more with [`add_listener`](Self::add_listener).
    pub fn subscribe(
        &self,
        path: &str,
        default: &Json,
        callback: Option<ValueCallback>,
    ) -> Result<()> {
        self.subscribe_typed(path, marshal::infer_wire_type(default), callback)
    }

    /// Subscribe to `path` with an explicit wire type
    pub fn subscribe_typed(
        &self,
        path: &str,
        wire_type: WireType,
        callback: Option<ValueCallback>,
    ) -> Result<()> {
        self.bind_subscriber(path, TopicKind::Primitive, wire_type, None, callback)
            .map(|_| ())
    }

    /// Get or create the subscriber for `path`; true if it was created
    ///
    /// Once closed nothing is created and the result is `Ok(false)`.
    pub(crate) fn bind_subscriber(
        &self,
        path: &str,
        kind: TopicKind,
        wire_type: WireType,
        default: Option<Payload>,
        callback: Option<ValueCallback>,
    ) -> Result<bool> {
        let handle = {
            let mut bindings = self.lock();
            if self.is_closed() {
                return Ok(false);
            }
            bindings.check_kind(path, &kind)?;
            if bindings.subscribers.contains_key(path) {
                if callback.is_some() {
                    debug!(topic = path, "already subscribed, callback not registered");
                }
                return Ok(false);
            }

            let topic = Topic::subscribe(path, wire_type);
            debug!(topic = path, wire_type = %topic.wire_type, "creating subscriber");
            let handle = self.transport.subscriber(&topic, default)?;
            bindings.subscribers.insert(
                path.to_string(),
                Binding {
                    kind,
                    handle: Arc::clone(&handle),
                },
            );
            handle
        };

        if let Some(callback) = callback {
            self.dispatcher.add_value_listener(path, callback);
        }

        let dispatcher = self.dispatcher.clone();
        let topic = path.to_string();
        handle.add_listener(Arc::new(move |payload: &Payload| {
            dispatcher.send(Event::Value {
                path: topic.clone(),
                payload: payload.clone(),
            });
        }));
        Ok(true)
    }

    /// Attach another listener to `path`; runs after earlier ones
    pub fn add_listener(&self, path: &str, callback: ValueCallback) {
        if !self.is_closed() {
            self.dispatcher.add_value_listener(path, callback);
        }
    }

    /// Latest value received on `path`, or `default`
    ///
    /// `default` is returned when nothing has arrived yet, when `path` was
    /// never subscribed, when it is a struct topic and after close.
    pub fn get(&self, path: &str, default: &Json) -> Json {
        let value = self
            .read(path, &TopicKind::Primitive)
            .and_then(|payload| payload.as_value().map(marshal::decode));
        match value {
            Some(Json::Null) | None => default.clone(),
            Some(value) => value,
        }
    }

    /// Raw latest payload of a subscription of the given kind
    pub(crate) fn read(&self, path: &str, kind: &TopicKind) -> Option<Payload> {
        let handle = {
            let bindings = self.lock();
            if self.is_closed() {
                return None;
            }
            let binding = bindings.subscribers.get(path)?;
            if binding.kind != *kind {
                return None;
            }
            Arc::clone(&binding.handle)
        };
        handle.read()
    }

    /// Kind bound to `path`, if any
    pub fn kind(&self, path: &str) -> Option<TopicKind> {
        let bindings = self.lock();
        bindings
            .publishers
            .get(path)
            .map(|b| b.kind.clone())
            .or_else(|| bindings.subscribers.get(path).map(|b| b.kind.clone()))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Release every binding; later calls are no-ops
    pub fn close(&self) {
        let mut bindings = self.lock();
        self.closed.store(true, Ordering::Release);
        bindings.publishers.clear();
        bindings.subscribers.clear();
    }
}
