use crate::callbacks::{CallbackSet, ErasedCallbacks, SubscribeOptions};
use crate::error::{MessageBusError, MessageBusErrorExt};
use crate::message::{Message, SubscriptionId, Topic};
use fxhash::FxHashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

pub(crate) const DEFAULT_CAPACITY: usize = 128;
pub(crate) const DEFAULT_HISTORY: usize = 100;
const MIN_CAPACITY: usize = 1;

/// Supported channel kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Fan-out to every receiver.
    Broadcast { capacity: usize },
    /// Single-consumer queue.
    Mpsc { capacity: usize },
    /// Latest value only.
    Watch,
}

/// Anything that can travel over the bus.
pub trait Event: Any + Send + Sync + 'static {}
impl<T: Any + Send + Sync + 'static> Event for T {}

/// Sizing knobs for a [`MessageBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusSettings {
    /// Buffer size for broadcast channels created implicitly.
    pub channel_capacity: usize,
    /// Number of JSON envelopes retained per topic by [`MessageBus::publish_json`].
    pub history_capacity: usize,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self { channel_capacity: DEFAULT_CAPACITY, history_capacity: DEFAULT_HISTORY }
    }
}

type ChannelKey = (Arc<str>, TypeId);

/// Type-erased channel sender.
trait ErasedSender: Send + Sync {
    fn subscribers(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Event> ErasedSender for broadcast::Sender<Arc<Message<T>>> {
    fn subscribers(&self) -> usize {
        self.receiver_count()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<T: Event> ErasedSender for watch::Sender<Arc<Message<T>>> {
    fn subscribers(&self) -> usize {
        self.receiver_count()
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct MpscChannel<T> {
    sender: mpsc::Sender<Arc<Message<T>>>,
    receiver: Option<mpsc::Receiver<Arc<Message<T>>>>,
}

impl<T: Event> ErasedSender for MpscChannel<T> {
    fn subscribers(&self) -> usize {
        usize::from(self.receiver.is_none() && !self.sender.is_closed())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct ChannelState {
    kind: ChannelKind,
    sender: Box<dyn ErasedSender>,
}

#[derive(Default)]
struct Registry {
    channels: FxHashMap<ChannelKey, ChannelState>,
    callbacks: FxHashMap<ChannelKey, Arc<dyn ErasedCallbacks>>,
}

struct BusInner {
    settings: BusSettings,
    registry: RwLock<Registry>,
    history: RwLock<FxHashMap<Arc<str>, VecDeque<serde_json::Value>>>,
    sequence: AtomicU64,
}

/// Topic-keyed publish/subscribe hub.
///
/// Channels are indexed by `(topic, payload type)`, so `device.added` can carry a
/// `DeviceInfo` for one subscriber and a `serde_json::Value` for another without
/// either seeing the other's traffic. Cloning is cheap and shares the registry.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.inner.registry.read();
        f.debug_struct("MessageBus")
            .field("settings", &self.inner.settings)
            .field("channels", &registry.channels.len())
            .field("callbacks", &registry.callbacks.len())
            .finish_non_exhaustive()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::with_settings(BusSettings::default())
    }
}

impl MessageBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero capacities fall back to the defaults.
    #[must_use]
    pub fn with_settings(settings: BusSettings) -> Self {
        let settings = BusSettings {
            channel_capacity: if settings.channel_capacity == 0 {
                DEFAULT_CAPACITY
            } else {
                settings.channel_capacity
            },
            history_capacity: settings.history_capacity,
        };
        Self {
            inner: Arc::new(BusInner {
                settings,
                registry: RwLock::new(Registry::default()),
                history: RwLock::new(FxHashMap::default()),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn settings(&self) -> BusSettings {
        self.inner.settings
    }

    /// Fan-out receiver for `(topic, T)` using the bus default capacity.
    ///
    /// # Errors
    /// [`MessageBusError::InvalidTopic`], or [`MessageBusError::ChannelKindMismatch`] if the
    /// pair already has an mpsc or watch channel.
    ///
    /// # Examples
    /// ```rust
    /// use lithium_message_bus::{MessageBus, MessageReceiverExt};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), lithium_message_bus::MessageBusError> {
    /// let bus = MessageBus::new();
    /// let mut rx = bus.subscribe::<u32>("focuser.position")?;
    /// bus.publish("focuser.position", 1200_u32)?;
    /// assert_eq!(rx.recv().await.unwrap().payload, 1200);
    /// # Ok(())
    /// # }
    /// ```
    pub fn subscribe<T: Event>(
        &self,
        topic: &str,
    ) -> Result<broadcast::Receiver<Arc<Message<T>>>, MessageBusError> {
        self.subscribe_with_capacity::<T>(topic, self.inner.settings.channel_capacity)
    }

    /// Fan-out receiver with an explicit buffer size.
    ///
    /// The capacity only applies when this call creates the channel.
    ///
    /// # Errors
    /// As [`subscribe`](Self::subscribe), plus [`MessageBusError::InvalidCapacity`] for zero.
    pub fn subscribe_with_capacity<T: Event>(
        &self,
        topic: &str,
        capacity: usize,
    ) -> Result<broadcast::Receiver<Arc<Message<T>>>, MessageBusError> {
        let topic = Topic::parse(topic)?;
        let capacity = validate_capacity(capacity)?;
        self.broadcast_receiver::<T>(&topic, capacity)
    }

    /// Single-consumer queue for `(topic, T)`. The receiver can be taken once.
    ///
    /// # Errors
    /// [`MessageBusError::ChannelKindMismatch`] if another kind exists or the receiver
    /// was already taken; [`MessageBusError::InvalidCapacity`] for zero.
    pub fn subscribe_mpsc<T: Event>(
        &self,
        topic: &str,
        capacity: usize,
    ) -> Result<mpsc::Receiver<Arc<Message<T>>>, MessageBusError> {
        let topic = Topic::parse(topic)?;
        let capacity = validate_capacity(capacity)?;
        let key = key::<T>(&topic);

        let mut registry = self.inner.registry.write();
        let state = registry.channels.entry(key).or_insert_with(|| {
            trace!(%topic, capacity, "Initializing mpsc channel");
            let (sender, receiver) = mpsc::channel::<Arc<Message<T>>>(capacity);
            ChannelState {
                kind: ChannelKind::Mpsc { capacity },
                sender: Box::new(MpscChannel { sender, receiver: Some(receiver) }),
            }
        });
        expect_kind::<T>(&topic, state.kind, ChannelKind::Mpsc { capacity })?;

        let channel = state
            .sender
            .as_any_mut()
            .downcast_mut::<MpscChannel<T>>()
            .ok_or_else(|| type_mismatch::<T>(&topic))?;
        channel.receiver.take().ok_or_else(|| MessageBusError::ChannelKindMismatch {
            message: "mpsc receiver already taken".into(),
            context: Some(topic.to_string().into()),
        })
    }

    /// Latest-value receiver for `(topic, T)`, seeded with `initial` if the channel is new.
    ///
    /// # Errors
    /// [`MessageBusError::InvalidTopic`] or [`MessageBusError::ChannelKindMismatch`].
    pub fn subscribe_watch<T: Event>(
        &self,
        topic: &str,
        initial: T,
    ) -> Result<watch::Receiver<Arc<Message<T>>>, MessageBusError> {
        let topic = Topic::parse(topic)?;
        let sender = self.ensure_watch(&topic, initial)?;
        Ok(sender.subscribe())
    }

    /// Registers a callback for `(topic, T)`.
    ///
    /// Callbacks for the same pair run one after another on a dedicated task, in
    /// publish order. The returned guard unsubscribes on drop.
    ///
    /// # Errors
    /// [`MessageBusError::InvalidTopic`], or [`MessageBusError::Internal`] when called
    /// outside a Tokio runtime.
    pub fn on<T, F>(&self, topic: &str, handler: F) -> Result<Subscription, MessageBusError>
    where
        T: Event,
        F: Fn(&Message<T>) + Send + Sync + 'static,
    {
        self.on_with(topic, SubscribeOptions::new(), handler)
    }

    /// [`on`](Self::on) with delivery options (`once`, `filter`).
    ///
    /// # Errors
    /// See [`on`](Self::on).
    pub fn on_with<T, F>(
        &self,
        topic: &str,
        options: SubscribeOptions<T>,
        handler: F,
    ) -> Result<Subscription, MessageBusError>
    where
        T: Event,
        F: Fn(&Message<T>) + Send + Sync + 'static,
    {
        let topic = Topic::parse(topic)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            MessageBusError::Internal {
                message: e.to_string().into(),
                context: Some("callbacks need a Tokio runtime".into()),
            }
        })?;

        let key = key::<T>(&topic);
        let set = {
            let mut registry = self.inner.registry.write();
            let erased = registry
                .callbacks
                .entry(key)
                .or_insert_with(|| {
                    let set: Arc<dyn ErasedCallbacks> =
                        CallbackSet::<T>::spawn(&runtime, topic.as_str());
                    set
                })
                .clone();
            drop(registry);
            downcast_set::<T>(&erased, &topic)?
        };

        let id = set.add(options, Arc::new(handler));
        debug!(%topic, %id, "Callback subscribed");
        Ok(Subscription { id, bus: Arc::downgrade(&self.inner), active: true })
    }

    /// Removes a callback; returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id)
    }

    /// Drops every channel and callback on `topic`; returns how many were removed.
    ///
    /// Existing receivers observe the channel as closed.
    pub fn unsubscribe_all(&self, topic: &str) -> usize {
        let mut registry = self.inner.registry.write();
        let channels_before = registry.channels.len();
        let callbacks_before = registry.callbacks.len();
        registry.channels.retain(|(t, _), _| &**t != topic);
        registry.callbacks.retain(|(t, _), _| &**t != topic);
        let removed = (channels_before - registry.channels.len())
            + (callbacks_before - registry.callbacks.len());
        drop(registry);
        if removed > 0 {
            debug!(topic, removed, "Topic cleared");
        }
        removed
    }

    /// Publishes `payload` to broadcast receivers and callbacks of `(topic, T)`.
    ///
    /// Returns how many receivers and callbacks were reached; zero when nobody
    /// listens.
    ///
    /// # Errors
    /// [`MessageBusError::InvalidTopic`], or [`MessageBusError::ChannelKindMismatch`] if
    /// the pair is an mpsc or watch channel.
    pub fn publish<T: Event>(&self, topic: &str, payload: T) -> Result<usize, MessageBusError> {
        let topic = Topic::parse(topic)?;
        let message = Arc::new(self.envelope(topic, payload));
        self.dispatch(message)
    }

    /// Like [`publish`](Self::publish) and additionally records a JSON snapshot of the
    /// envelope in the topic history.
    ///
    /// # Errors
    /// See [`publish`](Self::publish); [`MessageBusError::Serialization`] if the payload
    /// cannot be represented as JSON.
    pub fn publish_json<T: Event + Serialize>(
        &self,
        topic: &str,
        payload: T,
    ) -> Result<usize, MessageBusError> {
        let topic = Topic::parse(topic)?;
        let message = Arc::new(self.envelope(topic, payload));
        let snapshot = serde_json::to_value(&*message).context("capturing history")?;
        self.record(message.topic.shared(), snapshot);
        self.dispatch(message)
    }

    /// Publishes after `delay` on the current runtime.
    ///
    /// The topic is validated immediately; publish failures after the delay are logged.
    ///
    /// # Errors
    /// [`MessageBusError::InvalidTopic`] or [`MessageBusError::Internal`] outside a runtime.
    pub fn publish_delayed<T: Event>(
        &self,
        topic: &str,
        payload: T,
        delay: Duration,
    ) -> Result<JoinHandle<()>, MessageBusError> {
        let topic = Topic::parse(topic)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            MessageBusError::Internal {
                message: e.to_string().into(),
                context: Some("delayed publish needs a Tokio runtime".into()),
            }
        })?;

        let bus = self.clone();
        Ok(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = bus.publish(topic.as_str(), payload) {
                warn!(%topic, error = %e, "Delayed publish failed");
            }
        }))
    }

    /// Pushes into the single-consumer queue of `(topic, T)`, creating it if needed.
    ///
    /// # Errors
    /// [`MessageBusError::ChannelFull`] when the queue is full or its receiver is gone;
    /// [`MessageBusError::ChannelKindMismatch`] if another kind exists.
    pub fn publish_mpsc<T: Event>(&self, topic: &str, payload: T) -> Result<(), MessageBusError> {
        let topic = Topic::parse(topic)?;
        let capacity = self.inner.settings.channel_capacity;
        let key = key::<T>(&topic);

        let sender = {
            let mut registry = self.inner.registry.write();
            let state = registry.channels.entry(key).or_insert_with(|| {
                let (sender, receiver) = mpsc::channel::<Arc<Message<T>>>(capacity);
                ChannelState {
                    kind: ChannelKind::Mpsc { capacity },
                    sender: Box::new(MpscChannel { sender, receiver: Some(receiver) }),
                }
            });
            expect_kind::<T>(&topic, state.kind, ChannelKind::Mpsc { capacity })?;
            state
                .sender
                .as_any()
                .downcast_ref::<MpscChannel<T>>()
                .map(|c| c.sender.clone())
                .ok_or_else(|| type_mismatch::<T>(&topic))?
        };

        let message = Arc::new(self.envelope(topic.clone(), payload));
        sender.try_send(message).map_err(|e| MessageBusError::ChannelFull {
            message: e.to_string().into(),
            context: Some(topic.to_string().into()),
        })
    }

    /// Replaces the latest value of `(topic, T)`, creating the watch channel if needed.
    ///
    /// # Errors
    /// [`MessageBusError::InvalidTopic`] or [`MessageBusError::ChannelKindMismatch`].
    pub fn publish_watch<T: Event>(&self, topic: &str, payload: T) -> Result<(), MessageBusError> {
        let topic = Topic::parse(topic)?;
        let key = key::<T>(&topic);
        let existing = {
            let registry = self.inner.registry.read();
            match registry.channels.get(&key) {
                Some(state) => {
                    expect_kind::<T>(&topic, state.kind, ChannelKind::Watch)?;
                    Some(
                        state
                            .sender
                            .as_any()
                            .downcast_ref::<watch::Sender<Arc<Message<T>>>>()
                            .cloned()
                            .ok_or_else(|| type_mismatch::<T>(&topic))?,
                    )
                },
                None => None,
            }
        };

        match existing {
            Some(sender) => {
                sender.send_replace(Arc::new(self.envelope(topic, payload)));
            },
            None => {
                self.ensure_watch(&topic, payload)?;
            },
        }
        Ok(())
    }

    /// Current value of the watch channel for `(topic, T)`.
    ///
    /// # Errors
    /// [`MessageBusError::ChannelNotFound`] if no watch channel exists for the pair.
    pub fn latest<T: Event>(&self, topic: &str) -> Result<Arc<Message<T>>, MessageBusError> {
        let topic = Topic::parse(topic)?;
        let registry = self.inner.registry.read();
        let state = registry.channels.get(&key::<T>(&topic)).ok_or_else(|| not_found::<T>(&topic))?;
        expect_kind::<T>(&topic, state.kind, ChannelKind::Watch)?;
        state
            .sender
            .as_any()
            .downcast_ref::<watch::Sender<Arc<Message<T>>>>()
            .map(|tx| Arc::clone(&tx.borrow()))
            .ok_or_else(|| type_mismatch::<T>(&topic))
    }

    /// Distinct namespaces of active topics, sorted.
    ///
    /// Like [`topics`](Self::topics), this drops broadcast channels nobody listens to.
    #[must_use]
    pub fn namespaces(&self) -> Vec<String> {
        let topics = self.active_topics();
        let namespaces: BTreeSet<String> = topics
            .iter()
            .map(|t| t.split('.').next().unwrap_or(t).to_owned())
            .collect();
        namespaces.into_iter().collect()
    }

    /// Topics with at least one live receiver or callback, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.active_topics().into_iter().collect()
    }

    /// Receivers plus callbacks currently attached to `topic`, across payload types.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let registry = self.inner.registry.read();
        let channels: usize = registry
            .channels
            .iter()
            .filter(|((t, _), _)| &**t == topic)
            .map(|(_, state)| state.sender.subscribers())
            .sum();
        let callbacks: usize = registry
            .callbacks
            .iter()
            .filter(|((t, _), _)| &**t == topic)
            .map(|(_, set)| set.len())
            .sum();
        channels + callbacks
    }

    #[must_use]
    pub fn has_subscribers(&self, topic: &str) -> bool {
        self.subscriber_count(topic) > 0
    }

    /// Up to `limit` most recent JSON envelopes published on `topic`, oldest first.
    #[must_use]
    pub fn history(&self, topic: &str, limit: usize) -> Vec<serde_json::Value> {
        let history = self.inner.history.read();
        history.get(topic).map_or_else(Vec::new, |entries| {
            let skip = entries.len().saturating_sub(limit);
            entries.iter().skip(skip).cloned().collect()
        })
    }

    /// Drops every channel, callback and history entry.
    ///
    /// Returns the number of channels and callback sets closed.
    #[must_use]
    pub fn shutdown(&self) -> usize {
        let closed = {
            let mut registry = self.inner.registry.write();
            let count = registry.channels.len() + registry.callbacks.len();
            registry.channels.clear();
            registry.callbacks.clear();
            count
        };
        self.inner.history.write().clear();
        debug!(closed, "Message bus shut down");
        closed
    }

    fn envelope<T>(&self, topic: Topic, payload: T) -> Message<T> {
        let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        Message::new(topic, sequence, payload)
    }

    fn dispatch<T: Event>(&self, message: Arc<Message<T>>) -> Result<usize, MessageBusError> {
        let topic = &message.topic;
        let key = key::<T>(topic);

        let (sender, callbacks) = {
            let registry = self.inner.registry.read();
            let sender = match registry.channels.get(&key) {
                Some(state) => {
                    expect_kind::<T>(
                        topic,
                        state.kind,
                        ChannelKind::Broadcast { capacity: self.inner.settings.channel_capacity },
                    )?;
                    state.sender.as_any().downcast_ref::<broadcast::Sender<Arc<Message<T>>>>().cloned()
                },
                None => None,
            };
            (sender, registry.callbacks.get(&key).cloned())
        };

        let mut reached = match sender {
            Some(tx) => tx.send(Arc::clone(&message)).unwrap_or_else(|_| {
                self.prune_idle();
                0
            }),
            None => 0,
        };
        if let Some(erased) = callbacks
            && let Some(set) = erased.as_any().downcast_ref::<CallbackSet<T>>()
        {
            reached += set.enqueue(Arc::clone(&message));
        }

        trace!(%topic, sequence = message.sequence, reached, "Message dispatched");
        Ok(reached)
    }

    fn record(&self, topic: Arc<str>, snapshot: serde_json::Value) {
        let capacity = self.inner.settings.history_capacity;
        if capacity == 0 {
            return;
        }
        let mut history = self.inner.history.write();
        let entries = history.entry(topic).or_default();
        while entries.len() >= capacity {
            entries.pop_front();
        }
        entries.push_back(snapshot);
    }

    fn active_topics(&self) -> BTreeSet<String> {
        self.prune_idle();
        let registry = self.inner.registry.read();
        let channels = registry.channels.iter().filter(|(_, state)| state.sender.subscribers() > 0);
        let callbacks = registry.callbacks.iter().filter(|(_, set)| !set.is_empty());
        channels
            .map(|(key, _)| key)
            .chain(callbacks.map(|(key, _)| key))
            .map(|(topic, _)| topic.to_string())
            .collect()
    }

    /// Removes broadcast channels whose receivers are all gone.
    ///
    /// Watch and mpsc channels stay: they hold a latest value or queued messages.
    fn prune_idle(&self) {
        let mut registry = self.inner.registry.write();
        let before = registry.channels.len();
        registry.channels.retain(|_, state| {
            !matches!(state.kind, ChannelKind::Broadcast { .. }) || state.sender.subscribers() > 0
        });
        let pruned = before - registry.channels.len();
        if pruned > 0 {
            trace!(pruned, "Dropped idle broadcast channels");
        }
    }

    /// Subscribes while the registry lock is held, so pruning cannot orphan the receiver.
    fn broadcast_receiver<T: Event>(
        &self,
        topic: &Topic,
        capacity: usize,
    ) -> Result<broadcast::Receiver<Arc<Message<T>>>, MessageBusError> {
        let key = key::<T>(topic);
        let wanted = ChannelKind::Broadcast { capacity };

        {
            let registry = self.inner.registry.read();
            if let Some(state) = registry.channels.get(&key) {
                expect_kind::<T>(topic, state.kind, wanted)?;
                return downcast_broadcast::<T>(state, topic).map(|tx| tx.subscribe());
            }
        }

        let mut registry = self.inner.registry.write();
        let state = registry.channels.entry(key).or_insert_with(|| {
            trace!(%topic, capacity, "Initializing broadcast channel");
            let (tx, _) = broadcast::channel::<Arc<Message<T>>>(capacity);
            ChannelState { kind: wanted, sender: Box::new(tx) }
        });
        expect_kind::<T>(topic, state.kind, wanted)?;
        downcast_broadcast::<T>(state, topic).map(|tx| tx.subscribe())
    }

    fn ensure_watch<T: Event>(
        &self,
        topic: &Topic,
        initial: T,
    ) -> Result<watch::Sender<Arc<Message<T>>>, MessageBusError> {
        let key = key::<T>(topic);
        let mut registry = self.inner.registry.write();
        if let Some(state) = registry.channels.get(&key) {
            expect_kind::<T>(topic, state.kind, ChannelKind::Watch)?;
            return state
                .sender
                .as_any()
                .downcast_ref::<watch::Sender<Arc<Message<T>>>>()
                .cloned()
                .ok_or_else(|| type_mismatch::<T>(topic));
        }

        trace!(%topic, "Initializing watch channel");
        let (tx, _) = watch::channel(Arc::new(self.envelope(topic.clone(), initial)));
        registry
            .channels
            .insert(key, ChannelState { kind: ChannelKind::Watch, sender: Box::new(tx.clone()) });
        Ok(tx)
    }
}

impl BusInner {
    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.write();
        let Some(key) = registry
            .callbacks
            .iter()
            .find_map(|(key, set)| set.remove(id).then(|| key.clone()))
        else {
            return false;
        };
        if registry.callbacks.get(&key).is_some_and(|set| set.is_empty()) {
            registry.callbacks.remove(&key);
        }
        drop(registry);
        debug!(%id, topic = %key.0, "Callback unsubscribed");
        true
    }
}

/// Guard returned by [`MessageBus::on`]; dropping it removes the callback.
#[derive(Debug)]
#[must_use = "dropping the subscription removes the callback immediately"]
pub struct Subscription {
    id: SubscriptionId,
    bus: Weak<BusInner>,
    active: bool,
}

impl Subscription {
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Keeps the callback registered for the lifetime of the bus.
    pub fn detach(mut self) -> SubscriptionId {
        self.active = false;
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.active
            && let Some(bus) = self.bus.upgrade()
        {
            bus.unsubscribe(self.id);
        }
    }
}

impl std::fmt::Debug for BusInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusInner").field("settings", &self.settings).finish_non_exhaustive()
    }
}

fn key<T: Event>(topic: &Topic) -> ChannelKey {
    (topic.shared(), TypeId::of::<T>())
}

fn expect_kind<T: Event>(
    topic: &Topic,
    existing: ChannelKind,
    wanted: ChannelKind,
) -> Result<(), MessageBusError> {
    let same = matches!(
        (existing, wanted),
        (ChannelKind::Broadcast { .. }, ChannelKind::Broadcast { .. })
            | (ChannelKind::Mpsc { .. }, ChannelKind::Mpsc { .. })
            | (ChannelKind::Watch, ChannelKind::Watch)
    );
    if !same {
        return Err(MessageBusError::ChannelKindMismatch {
            message: format!(
                "expected {wanted:?} but found {existing:?} for {}",
                std::any::type_name::<T>()
            )
            .into(),
            context: Some(topic.to_string().into()),
        });
    }
    if existing != wanted && !matches!(existing, ChannelKind::Watch) {
        trace!(%topic, ?existing, ?wanted, "Channel already initialized with a different capacity");
    }
    Ok(())
}

fn downcast_broadcast<T: Event>(
    state: &ChannelState,
    topic: &Topic,
) -> Result<broadcast::Sender<Arc<Message<T>>>, MessageBusError> {
    state
        .sender
        .as_any()
        .downcast_ref::<broadcast::Sender<Arc<Message<T>>>>()
        .cloned()
        .ok_or_else(|| type_mismatch::<T>(topic))
}

fn downcast_set<T: Event>(
    erased: &Arc<dyn ErasedCallbacks>,
    topic: &Topic,
) -> Result<Arc<CallbackSet<T>>, MessageBusError> {
    Arc::clone(erased).into_any().downcast::<CallbackSet<T>>().map_err(|_| type_mismatch::<T>(topic))
}

fn type_mismatch<T: Event>(topic: &Topic) -> MessageBusError {
    MessageBusError::TypeMismatch {
        message: std::any::type_name::<T>().into(),
        context: Some(topic.to_string().into()),
    }
}

fn not_found<T: Event>(topic: &Topic) -> MessageBusError {
    MessageBusError::ChannelNotFound {
        message: std::any::type_name::<T>().into(),
        context: Some(topic.to_string().into()),
    }
}

fn validate_capacity(capacity: usize) -> Result<usize, MessageBusError> {
    if capacity < MIN_CAPACITY {
        return Err(MessageBusError::InvalidCapacity {
            message: format!("capacity must be >= {MIN_CAPACITY}").into(),
            context: None,
        });
    }
    Ok(capacity)
}
