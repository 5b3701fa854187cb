//! Registry of connected WebSocket clients and the bridge from the message bus to them.

use fxhash::FxHashMap;
use lithium::domain::constants::topics;
use lithium::domain::events::{ConfigChanged, DeviceEvent, PreloadProgress, PropertyChanged};
use lithium::features::devices::DeviceManager;
use lithium_kernel::safe_nanoid;
use lithium_message_bus::{Event, Message, MessageBus, MessageBusError, Subscription};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Outbound frames buffered per client before new ones are dropped.
const CLIENT_BUFFER: usize = 256;

/// Receiving half handed to a connection task.
#[derive(Debug)]
pub struct Client {
    pub id: String,
    pub rx: mpsc::Receiver<String>,
}

#[derive(Serialize)]
struct EventFrame<'a, T> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    message: &'a Message<T>,
}

#[derive(Debug, Default)]
struct HubInner {
    clients: RwLock<FxHashMap<String, mpsc::Sender<String>>>,
    subscriptions: Mutex<Vec<Subscription>>,
    /// Property topic -> callback, one per registered device.
    properties: Mutex<FxHashMap<String, Subscription>>,
}

impl HubInner {
    fn deliver(&self, id: &str, sender: &mpsc::Sender<String>, frame: String) -> bool {
        match sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(client = id, "Client lagging, frame dropped");
                false
            },
            Err(TrySendError::Closed(_)) => {
                self.clients.write().remove(id);
                debug!(client = id, "Client gone");
                false
            },
        }
    }

    fn broadcast(&self, frame: &str) -> usize {
        let clients: Vec<(String, mpsc::Sender<String>)> =
            self.clients.read().iter().map(|(id, tx)| (id.clone(), tx.clone())).collect();
        clients.iter().filter(|(id, tx)| self.deliver(id, tx, frame.to_owned())).count()
    }
}

/// Fan-out point for WebSocket clients.
#[derive(Debug, Clone, Default)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> Client {
        let id = safe_nanoid!();
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        self.inner.clients.write().insert(id.clone(), tx);
        debug!(client = %id, "Client registered");
        Client { id, rx }
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.inner.clients.write().remove(id).is_some()
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.inner.clients.read().len()
    }

    /// Queues `frame` for one client; `false` if it is unknown, gone or lagging.
    pub fn send_to(&self, id: &str, frame: impl Into<String>) -> bool {
        let sender = self.inner.clients.read().get(id).cloned();
        sender.is_some_and(|tx| self.inner.deliver(id, &tx, frame.into()))
    }

    /// Queues `frame` for every client; returns how many accepted it.
    pub fn broadcast(&self, frame: &str) -> usize {
        self.inner.broadcast(frame)
    }

    /// Forwards device, config and preload notifications to every client, including
    /// property changes of devices registered now or later.
    ///
    /// # Errors
    /// [`MessageBusError`] when a callback cannot be registered (outside a runtime).
    pub fn attach(&self, bus: &MessageBus, devices: &DeviceManager) -> Result<(), MessageBusError> {
        let weak = Arc::downgrade(&self.inner);
        let mut subscriptions = Vec::new();

        for topic in [
            topics::DEVICE_ADDED,
            topics::DEVICE_REMOVED,
            topics::DEVICE_CONNECTED,
            topics::DEVICE_DISCONNECTED,
        ] {
            subscriptions.push(bus.on(topic, forward::<DeviceEvent>(weak.clone()))?);
        }
        subscriptions.push(bus.on(topics::CONFIG_CHANGED, forward::<ConfigChanged>(weak.clone()))?);
        subscriptions.push(bus.on(topics::PRELOAD_PROGRESS, forward::<PreloadProgress>(weak.clone()))?);

        let (added_bus, added_hub) = (bus.clone(), weak.clone());
        subscriptions.push(bus.on::<DeviceEvent, _>(topics::DEVICE_ADDED, move |message| {
            let event = &message.payload;
            if let Some(inner) = added_hub.upgrade()
                && let Err(e) = watch(&inner, &added_bus, &event.kind.to_string(), &event.name)
            {
                warn!(device = %event.name, error = %e, "Property forwarding failed");
            }
        })?);

        let removed_hub = weak;
        subscriptions.push(bus.on::<DeviceEvent, _>(topics::DEVICE_REMOVED, move |message| {
            let event = &message.payload;
            if let Some(inner) = removed_hub.upgrade() {
                let topic = topics::device_property(&event.kind.to_string(), &event.name);
                inner.properties.lock().remove(&topic);
            }
        })?);

        for info in devices.all_devices() {
            watch(&self.inner, bus, &info.kind.to_string(), &info.name)?;
        }

        let forwarded = subscriptions.len();
        self.inner.subscriptions.lock().extend(subscriptions);
        debug!(forwarded, "Hub attached to the message bus");
        Ok(())
    }

    /// Drops every bus callback; clients stay registered.
    pub fn detach(&self) {
        self.inner.subscriptions.lock().clear();
        self.inner.properties.lock().clear();
    }
}

fn forward<T: Event + Serialize>(hub: Weak<HubInner>) -> impl Fn(&Message<T>) + Send + Sync + 'static {
    move |message| {
        let Some(inner) = hub.upgrade() else { return };
        match serde_json::to_string(&EventFrame { kind: "event", message }) {
            Ok(frame) => {
                inner.broadcast(&frame);
            },
            Err(e) => warn!(topic = %message.topic, error = %e, "Event frame not serializable"),
        }
    }
}

fn watch(inner: &Arc<HubInner>, bus: &MessageBus, kind: &str, name: &str) -> Result<(), MessageBusError> {
    let topic = topics::device_property(kind, name);
    let mut properties = inner.properties.lock();
    if !properties.contains_key(&topic) {
        let subscription = bus.on(&topic, forward::<PropertyChanged>(Arc::downgrade(inner)))?;
        properties.insert(topic, subscription);
    }
    Ok(())
}
