use crate::bus::Event;
use crate::message::{Message, SubscriptionId};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{error, trace};

pub(crate) type Callback<T> = Arc<dyn Fn(&Message<T>) + Send + Sync>;
pub(crate) type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Delivery options for [`MessageBus::on_with`](crate::MessageBus::on_with).
pub struct SubscribeOptions<T> {
    pub(crate) once: bool,
    pub(crate) filter: Option<Filter<T>>,
}

impl<T> SubscribeOptions<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self { once: false, filter: None }
    }

    /// Remove the callback after its first delivery.
    #[must_use]
    pub const fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Only deliver payloads matching `predicate`.
    #[must_use]
    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(predicate));
        self
    }
}

impl<T> Default for SubscribeOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SubscribeOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("once", &self.once)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

struct Handler<T> {
    id: SubscriptionId,
    once: bool,
    filter: Option<Filter<T>>,
    callback: Callback<T>,
}

/// Type-erased view of a [`CallbackSet`], stored in the bus registry.
pub(crate) trait ErasedCallbacks: Send + Sync {
    fn remove(&self, id: SubscriptionId) -> bool;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Callbacks for one `(topic, T)` pair plus the queue feeding its processing task.
pub(crate) struct CallbackSet<T> {
    handlers: Mutex<Vec<Handler<T>>>,
    queue: mpsc::UnboundedSender<Arc<Message<T>>>,
}

impl<T: Event> CallbackSet<T> {
    /// Creates the set and spawns its processing task on `runtime`.
    ///
    /// The task holds only a weak reference; it ends once the registry drops the set.
    pub(crate) fn spawn(runtime: &tokio::runtime::Handle, topic: &str) -> Arc<Self> {
        let (queue, rx) = mpsc::unbounded_channel();
        let set = Arc::new(Self { handlers: Mutex::new(Vec::new()), queue });
        runtime.spawn(process(Arc::downgrade(&set), rx, topic.to_owned()));
        set
    }

    pub(crate) fn add(&self, options: SubscribeOptions<T>, callback: Callback<T>) -> SubscriptionId {
        let id = SubscriptionId::next();
        self.handlers.lock().push(Handler {
            id,
            once: options.once,
            filter: options.filter,
            callback,
        });
        id
    }

    /// Queues `message`; returns the number of callbacks registered at that moment.
    pub(crate) fn enqueue(&self, message: Arc<Message<T>>) -> usize {
        let listeners = self.handlers.lock().len();
        if listeners == 0 || self.queue.send(message).is_err() {
            return 0;
        }
        listeners
    }

    fn dispatch(&self, message: &Message<T>) {
        let due: Vec<Callback<T>> = {
            let mut handlers = self.handlers.lock();
            let mut due = Vec::with_capacity(handlers.len());
            handlers.retain(|handler| {
                if handler.filter.as_ref().is_some_and(|accept| !accept(&message.payload)) {
                    return true;
                }
                due.push(Arc::clone(&handler.callback));
                !handler.once
            });
            due
        };

        for callback in due {
            if catch_unwind(AssertUnwindSafe(|| callback(message))).is_err() {
                error!(topic = %message.topic, sequence = message.sequence, "Message callback panicked");
            }
        }
    }
}

impl<T: Event> ErasedCallbacks for CallbackSet<T> {
    fn remove(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|h| h.id != id);
        handlers.len() != before
    }

    fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

async fn process<T: Event>(
    set: Weak<CallbackSet<T>>,
    mut rx: mpsc::UnboundedReceiver<Arc<Message<T>>>,
    topic: String,
) {
    trace!(%topic, payload = std::any::type_name::<T>(), "Callback worker started");
    while let Some(message) = rx.recv().await {
        let Some(set) = set.upgrade() else { break };
        set.dispatch(&message);
    }
    trace!(%topic, "Callback worker stopped");
}
