use crate::error::MessageBusError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const NAMESPACE_SEPARATOR: char = '.';

/// A validated topic name such as `device.camera.exposure`.
///
/// The segment before the first `.` is the topic's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Topic(Arc<str>);

impl Topic {
    /// Validates and wraps a topic name.
    ///
    /// # Errors
    /// Returns [`MessageBusError::InvalidTopic`] for empty names, names containing
    /// whitespace, and names with empty segments (`device..added`, `.x`).
    pub fn parse(raw: &str) -> Result<Self, MessageBusError> {
        if raw.is_empty() {
            return Err(MessageBusError::InvalidTopic {
                message: "topic cannot be empty".into(),
                context: None,
            });
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(MessageBusError::InvalidTopic {
                message: format!("'{raw}' contains whitespace").into(),
                context: None,
            });
        }
        if raw.split(NAMESPACE_SEPARATOR).any(str::is_empty) {
            return Err(MessageBusError::InvalidTopic {
                message: format!("'{raw}' has an empty segment").into(),
                context: None,
            });
        }
        Ok(Self(Arc::from(raw)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `device` for `device.camera.exposure`; the whole topic when it has no `.`.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.0.split(NAMESPACE_SEPARATOR).next().unwrap_or(&self.0)
    }

    pub(crate) fn shared(&self) -> Arc<str> {
        Arc::clone(&self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for Topic {
    type Error = MessageBusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Envelope delivered to every subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct Message<T> {
    pub topic: Topic,
    /// Bus-wide, strictly increasing publish counter.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

impl<T> Message<T> {
    pub(crate) fn new(topic: Topic, sequence: u64, payload: T) -> Self {
        Self { topic, sequence, timestamp: Utc::now(), payload }
    }
}

/// Identifies a callback registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_validation() {
        assert!(Topic::parse("device.camera.exposure").is_ok());
        assert!(Topic::parse("ping").is_ok());
        for bad in ["", " ", "device camera", "device..added", ".device", "device."] {
            assert!(
                matches!(Topic::parse(bad), Err(MessageBusError::InvalidTopic { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn namespace_is_first_segment() {
        assert_eq!(Topic::parse("device.camera.exposure").unwrap().namespace(), "device");
        assert_eq!(Topic::parse("status").unwrap().namespace(), "status");
    }

    #[test]
    fn subscription_ids_are_unique() {
        let a = SubscriptionId::next();
        let b = SubscriptionId::next();
        assert!(b > a);
    }
}
