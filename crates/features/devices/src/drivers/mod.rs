//! Built-in simulated drivers.
//!
//! Drivers are looked up by name in a static table; every device type ships with the
//! `sim` driver (alias `simulator`).

mod camera;
mod filterwheel;
mod focuser;
mod guider;
mod solver;
mod telescope;

use crate::device::{Device, SimDevice};
use crate::error::DeviceError;
use lithium_domain::device::DeviceType;
use lithium_message_bus::MessageBus;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

pub use camera::SimCamera;
pub use filterwheel::SimFilterWheel;
pub use focuser::SimFocuser;
pub use guider::SimGuider;
pub use solver::SimSolver;
pub use telescope::SimTelescope;

/// Driver names accepted for every device type.
pub const DRIVERS: &[&str] = &["sim", "simulator"];

/// Instantiates the driver `driver` for a device of type `kind`.
///
/// # Errors
/// [`DeviceError::UnknownDriver`] if no such driver exists.
pub fn create(
    kind: DeviceType,
    name: &str,
    driver: &str,
    bus: MessageBus,
) -> Result<Arc<dyn Device>, DeviceError> {
    if !DRIVERS.iter().any(|d| d.eq_ignore_ascii_case(driver)) {
        return Err(DeviceError::UnknownDriver {
            message: format!("'{driver}' for {kind}").into(),
            context: None,
        });
    }

    let device: Arc<dyn Device> = match kind {
        DeviceType::Camera => Arc::new(SimDevice::<SimCamera>::new(name, driver, bus)),
        DeviceType::Telescope => Arc::new(SimDevice::<SimTelescope>::new(name, driver, bus)),
        DeviceType::Focuser => Arc::new(SimDevice::<SimFocuser>::new(name, driver, bus)),
        DeviceType::FilterWheel => Arc::new(SimDevice::<SimFilterWheel>::new(name, driver, bus)),
        DeviceType::Solver => Arc::new(SimDevice::<SimSolver>::new(name, driver, bus)),
        DeviceType::Guider => Arc::new(SimDevice::<SimGuider>::new(name, driver, bus)),
    };
    Ok(device)
}

/// Decodes task parameters; `null` counts as an empty object.
pub(crate) fn params<T: DeserializeOwned>(params: Value) -> Result<T, DeviceError> {
    let params = if params.is_null() { Value::Object(Map::new()) } else { params };
    serde_json::from_value(params)
        .map_err(|e| DeviceError::invalid_value(format!("task parameters: {e}")))
}

/// A task listed in `Behavior::TASKS` without a handler.
pub(crate) fn unsupported(task: &str) -> DeviceError {
    DeviceError::UnknownTask { message: format!("'{task}' is not implemented").into(), context: None }
}

pub(crate) fn number_in(name: &str, value: &Value, min: f64, max: f64) -> Result<f64, DeviceError> {
    let number = value
        .as_f64()
        .ok_or_else(|| DeviceError::invalid_value(format!("'{name}' must be a number")))?;
    check_range(name, number, min, max)
}

pub(crate) fn check_range(name: &str, number: f64, min: f64, max: f64) -> Result<f64, DeviceError> {
    if (min..=max).contains(&number) {
        Ok(number)
    } else {
        Err(DeviceError::invalid_value(format!("'{name}' must be within {min}..={max}, got {number}")))
    }
}

pub(crate) fn int_in(name: &str, value: &Value, min: i64, max: i64) -> Result<i64, DeviceError> {
    let number = value
        .as_i64()
        .ok_or_else(|| DeviceError::invalid_value(format!("'{name}' must be an integer")))?;
    if (min..=max).contains(&number) {
        Ok(number)
    } else {
        Err(DeviceError::invalid_value(format!("'{name}' must be within {min}..={max}, got {number}")))
    }
}

pub(crate) fn boolean(name: &str, value: &Value) -> Result<bool, DeviceError> {
    value.as_bool().ok_or_else(|| DeviceError::invalid_value(format!("'{name}' must be a boolean")))
}
