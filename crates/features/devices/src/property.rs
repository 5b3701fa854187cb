use crate::error::DeviceError;
use fxhash::FxHashSet;
use lithium_domain::constants::topics;
use lithium_domain::device::DeviceType;
use lithium_domain::events::PropertyChanged;
use lithium_message_bus::MessageBus;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{trace, warn};

/// Property values of one device.
///
/// Every value change is published as [`PropertyChanged`] on
/// `device.<type>.<name>.property`. Writes that leave a value unchanged are silent.
#[derive(Debug)]
pub struct PropertyStore {
    kind: DeviceType,
    device: String,
    topic: String,
    values: RwLock<Map<String, Value>>,
    read_only: FxHashSet<&'static str>,
    bus: MessageBus,
}

impl PropertyStore {
    pub fn new(
        kind: DeviceType,
        device: &str,
        bus: MessageBus,
        defaults: impl IntoIterator<Item = (&'static str, Value)>,
        read_only: &[&'static str],
    ) -> Self {
        let values = defaults.into_iter().map(|(k, v)| (k.to_owned(), v)).collect();
        Self {
            kind,
            device: device.to_owned(),
            topic: topics::device_property(kind.as_ref(), device),
            values: RwLock::new(values),
            read_only: read_only.iter().copied().collect(),
            bus,
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.read().get(name).cloned()
    }

    /// Typed read of a numeric property; `default` when missing or not a number.
    #[must_use]
    pub fn f64_or(&self, name: &str, default: f64) -> f64 {
        self.values.read().get(name).and_then(Value::as_f64).unwrap_or(default)
    }

    #[must_use]
    pub fn i64_or(&self, name: &str, default: i64) -> i64 {
        self.values.read().get(name).and_then(Value::as_i64).unwrap_or(default)
    }

    #[must_use]
    pub fn bool_or(&self, name: &str, default: bool) -> bool {
        self.values.read().get(name).and_then(Value::as_bool).unwrap_or(default)
    }

    #[must_use]
    pub fn snapshot(&self) -> Map<String, Value> {
        self.values.read().clone()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.read().contains_key(name)
    }

    #[must_use]
    pub fn is_read_only(&self, name: &str) -> bool {
        self.read_only.contains(name)
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Checks that `name` exists and may be written by clients.
    ///
    /// # Errors
    /// [`DeviceError::UnknownProperty`] or [`DeviceError::ReadOnly`].
    pub fn check_writable(&self, name: &str) -> Result<(), DeviceError> {
        if !self.contains(name) {
            return Err(DeviceError::UnknownProperty {
                message: format!("'{name}' on {}", self.device).into(),
                context: None,
            });
        }
        if self.is_read_only(name) {
            return Err(DeviceError::ReadOnly {
                message: format!("'{name}' on {}", self.device).into(),
                context: None,
            });
        }
        Ok(())
    }

    /// Stores `value` regardless of the read-only set and publishes the change.
    ///
    /// Returns `true` if the stored value changed.
    pub fn update(&self, name: &str, value: Value) -> bool {
        {
            let mut values = self.values.write();
            if values.get(name) == Some(&value) {
                return false;
            }
            values.insert(name.to_owned(), value.clone());
        }

        trace!(device = %self.device, property = name, %value, "Property changed");
        let event = PropertyChanged {
            kind: self.kind,
            device: self.device.clone(),
            property: name.to_owned(),
            value,
        };
        if let Err(e) = self.bus.publish_json(&self.topic, event) {
            warn!(device = %self.device, property = name, error = %e, "Failed to publish property change");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(bus: &MessageBus) -> PropertyStore {
        PropertyStore::new(
            DeviceType::Focuser,
            "main",
            bus.clone(),
            [("position", json!(0)), ("backlash", json!(10))],
            &["position"],
        )
    }

    #[tokio::test]
    async fn update_publishes_only_on_change() {
        let bus = MessageBus::new();
        let store = store(&bus);
        let mut rx = bus.subscribe::<PropertyChanged>("device.focuser.main.property").unwrap();

        assert!(store.update("position", json!(100)));
        assert!(!store.update("position", json!(100)));

        let message = rx.recv().await.unwrap();
        assert_eq!(message.payload.property, "position");
        assert_eq!(message.payload.value, json!(100));
        assert!(rx.try_recv().is_err());
        assert_eq!(bus.history("device.focuser.main.property", 10).len(), 1);
    }

    #[test]
    fn writable_checks() {
        let store = store(&MessageBus::new());
        assert!(store.check_writable("backlash").is_ok());
        assert!(matches!(store.check_writable("position"), Err(DeviceError::ReadOnly { .. })));
        assert!(matches!(store.check_writable("speed"), Err(DeviceError::UnknownProperty { .. })));
    }

    #[test]
    fn typed_reads_fall_back() {
        let store = store(&MessageBus::new());
        assert_eq!(store.i64_or("backlash", 0), 10);
        assert_eq!(store.i64_or("missing", 7), 7);
        assert!((store.f64_or("position", 1.0)).abs() < f64::EPSILON);
        assert!(store.bool_or("position", true));
    }
}
