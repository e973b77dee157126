//! Event delivery on a dedicated consumer task.
//!
//! Transports report link changes and topic updates on their own threads.
//! Those producers only enqueue; the consumer task runs every callback, so
//! callbacks never execute on a transport thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tether_core::Payload;
use tether_fabric::ConnectionEvent;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

/// Something for listeners to hear about
#[derive(Debug, Clone)]
pub enum Event {
    Connection(ConnectionEvent),
    Value { path: String, payload: Payload },
}

/// Callback for topic updates: `(path, payload)`
pub type ValueCallback = Arc<dyn Fn(&str, &Payload) + Send + Sync>;

/// Callback for link changes
pub type ConnectionCallback = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

enum Envelope {
    Event(Event),
    Shutdown,
}

#[derive(Default)]
struct Listeners {
    values: HashMap<String, Vec<ValueCallback>>,
    connection: Vec<ConnectionCallback>,
}

/// Producer handle for the event consumer task
///
/// Callbacks must be short and must not block; they share one task.
#[derive(Clone)]
pub struct Dispatcher {
    tx: UnboundedSender<Envelope>,
    listeners: Arc<Mutex<Listeners>>,
}

impl Dispatcher {
    /// Start the consumer task
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listeners = Arc::new(Mutex::new(Listeners::default()));
        let handle = tokio::spawn(consume(rx, Arc::clone(&listeners)));
        (Self { tx, listeners }, handle)
    }

    /// Queue an event; dropped silently once the consumer has stopped
    pub fn send(&self, event: Event) {
        let _ = self.tx.send(Envelope::Event(event));
    }

    /// Listeners for one path run in registration order
    pub fn add_value_listener(&self, path: &str, callback: ValueCallback) {
        lock(&self.listeners)
            .values
            .entry(path.to_string())
            .or_default()
            .push(callback);
    }

    pub fn add_connection_listener(&self, callback: ConnectionCallback) {
        lock(&self.listeners).connection.push(callback);
    }

    /// Stop the consumer after everything already queued
    pub fn close(&self) {
        let _ = self.tx.send(Envelope::Shutdown);
    }
}

fn lock(listeners: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
    listeners.lock().unwrap_or_else(|e| e.into_inner())
}

async fn consume(mut rx: UnboundedReceiver<Envelope>, listeners: Arc<Mutex<Listeners>>) {
    let mut linked = false;

    while let Some(envelope) = rx.recv().await {
        let event = match envelope {
            Envelope::Event(event) => event,
            Envelope::Shutdown => break,
        };

        match event {
            Event::Connection(change) => {
                // Transitions only; never two connects in a row
                if linked == change.connected {
                    continue;
                }
                linked = change.connected;

                let callbacks = lock(&listeners).connection.clone();
                for callback in callbacks {
                    callback(&change);
                }
            }
            Event::Value { path, payload } => {
                let callbacks = lock(&listeners)
                    .values
                    .get(&path)
                    .cloned()
                    .unwrap_or_default();
                for callback in callbacks {
                    callback(&path, &payload);
                }
            }
        }
    }
    debug!("event dispatcher stopped");
}
