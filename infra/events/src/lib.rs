//! # Message Bus
//!
//! Topic-keyed publish/subscribe for Lithium components.
//!
//! Every channel is identified by a `(topic, payload type)` pair. Topics are dotted
//! names (`device.camera.exposure`) whose first segment is the namespace.
//!
//! * **Channels**: broadcast (fan-out), mpsc (single consumer) and watch (latest value).
//! * **Callbacks**: [`MessageBus::on`] runs handlers sequentially on a per-pair task,
//!   with `once` and `filter` options and an RAII [`Subscription`].
//! * **History**: [`MessageBus::publish_json`] keeps the last envelopes per topic.
//!
//! # Example
//!
//! ```rust
//! use lithium_message_bus::{MessageBus, MessageBusError, MessageReceiverExt};
//!
//! #[derive(Clone, Debug, PartialEq)]
//! struct Exposure { seconds: f64 }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), MessageBusError> {
//!     let bus = MessageBus::new();
//!
//!     let mut rx = bus.subscribe::<Exposure>("device.camera.exposure")?;
//!     bus.publish("device.camera.exposure", Exposure { seconds: 2.5 })?;
//!
//!     let message = rx.recv().await.unwrap();
//!     assert_eq!(message.payload.seconds, 2.5);
//!     assert_eq!(message.topic.namespace(), "device");
//!     Ok(())
//! }
//! ```

mod bus;
mod callbacks;
mod error;
mod message;
mod receiver;

pub use bus::{BusSettings, ChannelKind, Event, MessageBus, Subscription};
pub use callbacks::SubscribeOptions;
pub use error::{MessageBusError, MessageBusErrorExt};
pub use message::{Message, SubscriptionId, Topic};
pub use receiver::MessageReceiverExt;
