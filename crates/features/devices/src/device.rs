use crate::error::DeviceError;
use crate::property::PropertyStore;
use async_trait::async_trait;
use lithium_derive::api_model;
use lithium_domain::device::DeviceType;
use serde_json::{Map, Value};
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Snapshot of a registered device.
#[api_model]
#[derive(Clone, PartialEq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    #[cfg_attr(feature = "server", schema(value_type = String))]
    pub kind: DeviceType,
    pub driver: String,
    pub connected: bool,
    /// Primary device of its type.
    #[serde(default)]
    pub main: bool,
    #[cfg_attr(feature = "server", schema(value_type = Object))]
    pub properties: Map<String, Value>,
}

/// A piece of equipment managed by the [`DeviceManager`](crate::DeviceManager).
#[async_trait]
pub trait Device: Debug + Send + Sync {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn kind(&self) -> DeviceType;
    fn driver(&self) -> &str;
    fn is_connected(&self) -> bool;

    /// Connecting an already connected device is a no-op.
    async fn connect(&self) -> Result<(), DeviceError>;
    async fn disconnect(&self) -> Result<(), DeviceError>;

    /// # Errors
    /// [`DeviceError::UnknownProperty`] if the device has no such property.
    fn get_property(&self, name: &str) -> Result<Value, DeviceError>;

    /// # Errors
    /// [`DeviceError::ReadOnly`], [`DeviceError::InvalidValue`] or
    /// [`DeviceError::NotConnected`].
    async fn set_property(&self, name: &str, value: Value) -> Result<(), DeviceError>;
    fn properties(&self) -> Map<String, Value>;

    /// Names accepted by [`run_task`](Self::run_task).
    fn tasks(&self) -> &'static [&'static str];
    async fn run_task(&self, task: &str, params: Value) -> Result<Value, DeviceError>;

    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id().to_owned(),
            name: self.name().to_owned(),
            kind: self.kind(),
            driver: self.driver().to_owned(),
            connected: self.is_connected(),
            main: false,
            properties: self.properties(),
        }
    }
}

/// State every simulated driver shares.
#[derive(Debug)]
pub(crate) struct DeviceCore {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) kind: DeviceType,
    pub(crate) driver: String,
    pub(crate) props: Arc<PropertyStore>,
    connected: AtomicBool,
}

impl DeviceCore {
    pub(crate) fn new(
        kind: DeviceType,
        name: &str,
        driver: &str,
        props: PropertyStore,
    ) -> Self {
        Self {
            id: lithium_kernel::safe_nanoid!(),
            name: name.to_owned(),
            kind,
            driver: driver.to_owned(),
            props: Arc::new(props),
            connected: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_connected(&self) -> Result<(), DeviceError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(DeviceError::NotConnected {
                message: format!("{} '{}'", self.kind, self.name).into(),
                context: None,
            })
        }
    }
}

/// Driver-specific part of a simulated device.
#[async_trait]
pub(crate) trait Behavior: Debug + Default + Send + Sync + 'static {
    const KIND: DeviceType;
    const TASKS: &'static [&'static str];
    const READ_ONLY: &'static [&'static str];

    fn defaults() -> Vec<(&'static str, Value)>;

    /// Validates a client write of a writable property.
    fn validate(&self, _core: &DeviceCore, _name: &str, _value: &Value) -> Result<(), DeviceError> {
        Ok(())
    }

    /// Derived state after a client write was stored.
    fn after_set(&self, _core: &DeviceCore, _name: &str) {}

    /// Runs `task`; the name is already checked against `TASKS`.
    async fn run(&self, core: &DeviceCore, task: &str, params: Value) -> Result<Value, DeviceError>;

    /// Stops background activity (exposures, slews, guiding).
    fn on_disconnect(&self, _core: &DeviceCore) {}
}

/// A simulated device driven by a [`Behavior`].
#[derive(Debug)]
pub(crate) struct SimDevice<B> {
    core: DeviceCore,
    behavior: B,
}

impl<B: Behavior> SimDevice<B> {
    pub(crate) fn new(name: &str, driver: &str, bus: lithium_message_bus::MessageBus) -> Self {
        let props = PropertyStore::new(B::KIND, name, bus, B::defaults(), B::READ_ONLY);
        Self { core: DeviceCore::new(B::KIND, name, driver, props), behavior: B::default() }
    }
}

#[async_trait]
impl<B: Behavior> Device for SimDevice<B> {
    fn id(&self) -> &str {
        &self.core.id
    }

    fn name(&self) -> &str {
        &self.core.name
    }

    fn kind(&self) -> DeviceType {
        self.core.kind
    }

    fn driver(&self) -> &str {
        &self.core.driver
    }

    fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        if !self.core.connected.swap(true, Ordering::AcqRel) {
            info!(device = %self.core.name, kind = %self.core.kind, "Device connected");
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), DeviceError> {
        if self.core.connected.swap(false, Ordering::AcqRel) {
            self.behavior.on_disconnect(&self.core);
            info!(device = %self.core.name, kind = %self.core.kind, "Device disconnected");
        }
        Ok(())
    }

    fn get_property(&self, name: &str) -> Result<Value, DeviceError> {
        self.core.props.get(name).ok_or_else(|| DeviceError::UnknownProperty {
            message: format!("'{name}' on {}", self.core.name).into(),
            context: None,
        })
    }

    async fn set_property(&self, name: &str, value: Value) -> Result<(), DeviceError> {
        self.core.props.check_writable(name)?;
        self.core.ensure_connected()?;
        self.behavior.validate(&self.core, name, &value)?;
        debug!(device = %self.core.name, property = name, %value, "Setting property");
        self.core.props.update(name, value);
        self.behavior.after_set(&self.core, name);
        Ok(())
    }

    fn properties(&self) -> Map<String, Value> {
        self.core.props.snapshot()
    }

    fn tasks(&self) -> &'static [&'static str] {
        B::TASKS
    }

    async fn run_task(&self, task: &str, params: Value) -> Result<Value, DeviceError> {
        if !B::TASKS.contains(&task) {
            return Err(DeviceError::UnknownTask {
                message: format!("'{task}' on {} '{}'", self.core.kind, self.core.name).into(),
                context: None,
            });
        }
        self.core.ensure_connected()?;
        debug!(device = %self.core.name, task, "Running task");
        self.behavior.run(&self.core, task, params).await
    }
}
