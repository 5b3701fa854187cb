use crate::bus::Event;
use crate::message::Message;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

/// Uniform `recv` over the three receiver kinds handed out by the bus.
///
/// Broadcast receivers skip over lag instead of failing; watch receivers wait for
/// the next change and yield the latest value.
pub trait MessageReceiverExt<T> {
    /// Next message, or `None` once the channel is closed.
    fn recv(&mut self) -> impl Future<Output = Option<Arc<Message<T>>>> + Send;
}

impl<T: Event> MessageReceiverExt<T> for broadcast::Receiver<Arc<Message<T>>> {
    async fn recv(&mut self) -> Option<Arc<Message<T>>> {
        let mut skipped = 0u64;

        loop {
            match Self::recv(self).await {
                Ok(message) => {
                    if skipped > 0 {
                        warn!(
                            topic = %message.topic,
                            skipped,
                            "Receiver lagged; continuing from the oldest retained message"
                        );
                    }
                    return Some(message);
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    skipped = skipped.saturating_add(n);
                    debug!(payload = std::any::type_name::<T>(), skipped = n, "Receiver lagged");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl<T: Event> MessageReceiverExt<T> for mpsc::Receiver<Arc<Message<T>>> {
    async fn recv(&mut self) -> Option<Arc<Message<T>>> {
        Self::recv(self).await
    }
}

impl<T: Event> MessageReceiverExt<T> for watch::Receiver<Arc<Message<T>>> {
    async fn recv(&mut self) -> Option<Arc<Message<T>>> {
        match self.changed().await {
            Ok(()) => Some(Arc::clone(&self.borrow_and_update())),
            Err(_) => None,
        }
    }
}
