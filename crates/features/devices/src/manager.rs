use crate::device::{Device, DeviceInfo};
use crate::drivers;
use crate::error::DeviceError;
use fxhash::FxHashMap;
use lithium_domain::constants::topics;
use lithium_domain::device::{DeviceSpec, DeviceType};
use lithium_domain::events::DeviceEvent;
use lithium_message_bus::MessageBus;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use strum::IntoEnumIterator;
use tracing::{info, warn};

/// Registry of devices keyed by type, in insertion order within a type.
///
/// Every type has at most one primary device: the one chosen with
/// [`set_main`](Self::set_main), else the first registered.
#[derive(Debug)]
pub struct DeviceManager {
    bus: MessageBus,
    devices: RwLock<FxHashMap<DeviceType, Vec<Arc<dyn Device>>>>,
    main: RwLock<FxHashMap<DeviceType, String>>,
}

fn not_found(kind: DeviceType, name: &str) -> DeviceError {
    DeviceError::NotFound { message: format!("{kind} '{name}'").into(), context: None }
}

fn validate_name(name: &str) -> Result<(), DeviceError> {
    if name.is_empty() || name.chars().any(|c| c.is_whitespace() || matches!(c, '.' | '/')) {
        return Err(DeviceError::InvalidName {
            message: format!("'{name}' (must be non-empty without whitespace, '.' or '/')").into(),
            context: None,
        });
    }
    Ok(())
}

impl DeviceManager {
    #[must_use]
    pub fn new(bus: MessageBus) -> Self {
        Self { bus, devices: RwLock::default(), main: RwLock::default() }
    }

    /// Creates a device with the named driver and registers it.
    ///
    /// # Errors
    /// [`DeviceError::InvalidName`], [`DeviceError::AlreadyExists`] or
    /// [`DeviceError::UnknownDriver`].
    pub fn add_device(
        &self,
        kind: DeviceType,
        name: &str,
        driver: &str,
    ) -> Result<DeviceInfo, DeviceError> {
        validate_name(name)?;
        if self.find_device(kind, name).is_some() {
            return Err(DeviceError::AlreadyExists {
                message: format!("{kind} '{name}'").into(),
                context: None,
            });
        }
        let device = drivers::create(kind, name, driver, self.bus.clone())?;
        self.insert(device)
    }

    /// Registers an already constructed device.
    ///
    /// # Errors
    /// [`DeviceError::InvalidName`] or [`DeviceError::AlreadyExists`].
    pub fn insert(&self, device: Arc<dyn Device>) -> Result<DeviceInfo, DeviceError> {
        let kind = device.kind();
        validate_name(device.name())?;
        {
            let mut devices = self.devices.write();
            let list = devices.entry(kind).or_default();
            if list.iter().any(|d| d.name() == device.name()) {
                return Err(DeviceError::AlreadyExists {
                    message: format!("{kind} '{}'", device.name()).into(),
                    context: None,
                });
            }
            list.push(Arc::clone(&device));
        }

        info!(kind = %kind, device = device.name(), driver = device.driver(), "Device added");
        self.notify(topics::DEVICE_ADDED, device.as_ref());
        Ok(self.info_of(device.as_ref()))
    }

    /// Unregisters a device, disconnecting it first.
    ///
    /// # Errors
    /// [`DeviceError::NotFound`].
    pub async fn remove_device(&self, kind: DeviceType, name: &str) -> Result<(), DeviceError> {
        let device = {
            let mut devices = self.devices.write();
            let list = devices.get_mut(&kind).ok_or_else(|| not_found(kind, name))?;
            let index =
                list.iter().position(|d| d.name() == name).ok_or_else(|| not_found(kind, name))?;
            let device = list.remove(index);
            if list.is_empty() {
                devices.remove(&kind);
            }
            device
        };

        {
            let mut main = self.main.write();
            if main.get(&kind).is_some_and(|m| m == name) {
                main.remove(&kind);
            }
        }

        if device.is_connected() {
            match device.disconnect().await {
                Ok(()) => self.notify(topics::DEVICE_DISCONNECTED, device.as_ref()),
                Err(e) => {
                    warn!(kind = %kind, device = name, error = %e, "Disconnect on removal failed");
                },
            }
        }

        info!(kind = %kind, device = name, "Device removed");
        self.notify(topics::DEVICE_REMOVED, device.as_ref());
        Ok(())
    }

    /// Removes every device called `name`, whatever its type. Returns the count removed.
    pub async fn remove_devices_by_name(&self, name: &str) -> usize {
        let kinds: Vec<DeviceType> = {
            let devices = self.devices.read();
            devices
                .iter()
                .filter(|(_, list)| list.iter().any(|d| d.name() == name))
                .map(|(kind, _)| *kind)
                .collect()
        };

        let mut removed = 0;
        for kind in kinds {
            if self.remove_device(kind, name).await.is_ok() {
                removed += 1;
            }
        }
        removed
    }

    /// Names of the devices of `kind` in insertion order.
    #[must_use]
    pub fn device_list(&self, kind: DeviceType) -> Vec<String> {
        self.devices
            .read()
            .get(&kind)
            .map(|list| list.iter().map(|d| d.name().to_owned()).collect())
            .unwrap_or_default()
    }

    /// Every device, ordered by type and then insertion.
    #[must_use]
    pub fn all_devices(&self) -> Vec<DeviceInfo> {
        let devices: Vec<Arc<dyn Device>> = {
            let guard = self.devices.read();
            DeviceType::iter().filter_map(|k| guard.get(&k)).flatten().cloned().collect()
        };
        devices.iter().map(|d| self.info_of(d.as_ref())).collect()
    }

    #[must_use]
    pub fn devices_of(&self, kind: DeviceType) -> Vec<DeviceInfo> {
        let devices: Vec<Arc<dyn Device>> =
            self.devices.read().get(&kind).cloned().unwrap_or_default();
        devices.iter().map(|d| self.info_of(d.as_ref())).collect()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.devices.read().values().map(Vec::len).sum()
    }

    /// Device counts per type, only for types with devices.
    #[must_use]
    pub fn counts(&self) -> Vec<(DeviceType, usize)> {
        let devices = self.devices.read();
        DeviceType::iter().filter_map(|k| devices.get(&k).map(|l| (k, l.len()))).collect()
    }

    #[must_use]
    pub fn find_device(&self, kind: DeviceType, name: &str) -> Option<Arc<dyn Device>> {
        self.devices.read().get(&kind)?.iter().find(|d| d.name() == name).cloned()
    }

    /// First device called `name` in type order.
    #[must_use]
    pub fn find_device_by_name(&self, name: &str) -> Option<Arc<dyn Device>> {
        let devices = self.devices.read();
        DeviceType::iter()
            .filter_map(|k| devices.get(&k))
            .flatten()
            .find(|d| d.name() == name)
            .cloned()
    }

    /// # Errors
    /// [`DeviceError::NotFound`].
    pub fn get_device(&self, kind: DeviceType, name: &str) -> Result<Arc<dyn Device>, DeviceError> {
        self.find_device(kind, name).ok_or_else(|| not_found(kind, name))
    }

    /// # Errors
    /// [`DeviceError::NotFound`].
    pub fn info(&self, kind: DeviceType, name: &str) -> Result<DeviceInfo, DeviceError> {
        let device = self.get_device(kind, name)?;
        Ok(self.info_of(device.as_ref()))
    }

    /// # Errors
    /// [`DeviceError::NotFound`] or the driver's connect error.
    pub async fn connect(&self, kind: DeviceType, name: &str) -> Result<DeviceInfo, DeviceError> {
        let device = self.get_device(kind, name)?;
        if !device.is_connected() {
            device.connect().await?;
            self.notify(topics::DEVICE_CONNECTED, device.as_ref());
        }
        Ok(self.info_of(device.as_ref()))
    }

    /// # Errors
    /// [`DeviceError::NotFound`] or the driver's disconnect error.
    pub async fn disconnect(
        &self,
        kind: DeviceType,
        name: &str,
    ) -> Result<DeviceInfo, DeviceError> {
        let device = self.get_device(kind, name)?;
        if device.is_connected() {
            device.disconnect().await?;
            self.notify(topics::DEVICE_DISCONNECTED, device.as_ref());
        }
        Ok(self.info_of(device.as_ref()))
    }

    /// Connects every registered device; failures are logged. Returns the number of
    /// devices connected by this call.
    pub async fn connect_all(&self) -> usize {
        let pending: Vec<Arc<dyn Device>> = {
            let devices = self.devices.read();
            devices.values().flatten().filter(|d| !d.is_connected()).cloned().collect()
        };

        let mut connected = 0;
        for device in pending {
            match device.connect().await {
                Ok(()) => {
                    connected += 1;
                    self.notify(topics::DEVICE_CONNECTED, device.as_ref());
                },
                Err(e) => {
                    warn!(kind = %device.kind(), device = device.name(), error = %e, "Connect failed");
                },
            }
        }
        connected
    }

    /// Disconnects every connected device. Returns the number disconnected.
    pub async fn disconnect_all(&self) -> usize {
        let connected: Vec<Arc<dyn Device>> = {
            let devices = self.devices.read();
            devices.values().flatten().filter(|d| d.is_connected()).cloned().collect()
        };

        let mut count = 0;
        for device in connected {
            if device.disconnect().await.is_ok() {
                count += 1;
                self.notify(topics::DEVICE_DISCONNECTED, device.as_ref());
            }
        }
        count
    }

    /// # Errors
    /// [`DeviceError::NotFound`] or [`DeviceError::UnknownProperty`].
    pub fn get_property(
        &self,
        kind: DeviceType,
        name: &str,
        property: &str,
    ) -> Result<Value, DeviceError> {
        self.get_device(kind, name)?.get_property(property)
    }

    /// # Errors
    /// [`DeviceError::NotFound`], [`DeviceError::ReadOnly`],
    /// [`DeviceError::NotConnected`] or [`DeviceError::InvalidValue`].
    pub async fn set_property(
        &self,
        kind: DeviceType,
        name: &str,
        property: &str,
        value: Value,
    ) -> Result<Value, DeviceError> {
        let device = self.get_device(kind, name)?;
        device.set_property(property, value).await?;
        device.get_property(property)
    }

    /// Runs a named task and returns its JSON result.
    ///
    /// # Errors
    /// [`DeviceError::NotFound`], [`DeviceError::UnknownTask`],
    /// [`DeviceError::NotConnected`] or a task-specific error.
    pub async fn run_task(
        &self,
        kind: DeviceType,
        name: &str,
        task: &str,
        params: Value,
    ) -> Result<Value, DeviceError> {
        let device = self.get_device(kind, name)?;
        device.run_task(task, params).await
    }

    /// Makes `name` the primary device of `kind`.
    ///
    /// # Errors
    /// [`DeviceError::NotFound`].
    pub fn set_main(&self, kind: DeviceType, name: &str) -> Result<(), DeviceError> {
        self.get_device(kind, name)?;
        self.main.write().insert(kind, name.to_owned());
        info!(kind = %kind, device = name, "Primary device set");
        Ok(())
    }

    #[must_use]
    pub fn main_device(&self, kind: DeviceType) -> Option<Arc<dyn Device>> {
        let chosen = self.main.read().get(&kind).cloned();
        chosen
            .and_then(|name| self.find_device(kind, &name))
            .or_else(|| self.devices.read().get(&kind)?.first().cloned())
    }

    /// Registers (and optionally connects) the boot devices from the configuration.
    ///
    /// # Errors
    /// The first registration error.
    pub async fn load_specs(&self, specs: &[DeviceSpec]) -> Result<usize, DeviceError> {
        for spec in specs {
            self.add_device(spec.kind, &spec.name, &spec.driver)?;
            if spec.connect {
                self.connect(spec.kind, &spec.name).await?;
            }
        }
        Ok(specs.len())
    }

    fn info_of(&self, device: &dyn Device) -> DeviceInfo {
        let mut info = device.info();
        info.main = self.main_device(device.kind()).is_some_and(|m| m.name() == device.name());
        info
    }

    fn notify(&self, topic: &str, device: &dyn Device) {
        let event = DeviceEvent {
            id: device.id().to_owned(),
            kind: device.kind(),
            name: device.name().to_owned(),
            driver: device.driver().to_owned(),
        };
        if let Err(e) = self.bus.publish_json(topic, event) {
            warn!(topic, device = device.name(), error = %e, "Failed to publish device event");
        }
    }
}
