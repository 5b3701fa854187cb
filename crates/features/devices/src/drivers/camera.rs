use super::{boolean, check_range, int_in, number_in, params, unsupported};
use crate::device::{Behavior, DeviceCore};
use crate::error::DeviceError;
use async_trait::async_trait;
use lithium_domain::device::DeviceType;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

const SENSOR_WIDTH: i64 = 4144;
const SENSOR_HEIGHT: i64 = 2822;
const AMBIENT: f64 = 20.0;
const MAX_EXPOSURE: f64 = 3600.0;

/// Simulated cooled CMOS camera.
///
/// Exposures finish after their duration on the Tokio timer and leave a
/// `<name>_<nnnn>.fits` file name in `last_image`. The cooler reaches its target
/// immediately.
#[derive(Debug, Default)]
pub struct SimCamera {
    exposure: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ExposureParams {
    duration: f64,
    #[serde(default)]
    light: Option<bool>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CoolerParams {
    on: bool,
    #[serde(default)]
    target: Option<f64>,
}

impl SimCamera {
    fn abort(&self, core: &DeviceCore) -> bool {
        let running = self.exposure.lock().take().is_some_and(|handle| {
            let running = !handle.is_finished();
            handle.abort();
            running
        });
        if running {
            core.props.update("state", json!("idle"));
        }
        running
    }

    /// Starts an exposure unless one is still running. The slot stays locked until
    /// the new handle is stored, so concurrent requests cannot both start.
    fn start(&self, core: &DeviceCore, duration: f64, light: bool) -> Result<(), DeviceError> {
        let mut slot = self.exposure.lock();
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Err(DeviceError::invalid_state("exposure already in progress"));
        }
        core.props.update("state", json!("exposing"));

        let props = core.props.clone();
        let name = core.name.clone();
        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(duration)).await;
            let count = props.i64_or("exposures", 0) + 1;
            let image = format!("{name}_{count:04}.fits");
            props.update("exposures", json!(count));
            props.update("last_exposure", json!(duration));
            props.update("last_image", Value::String(image.clone()));
            props.update("state", json!("idle"));
            info!(device = %name, duration, light, image, "Exposure complete");
        }));
        Ok(())
    }

    fn apply_cooler(core: &DeviceCore) {
        if core.props.bool_or("cooler_on", false) {
            let target = core.props.f64_or("target_temperature", AMBIENT);
            core.props.update("temperature", json!(target));
            core.props.update("cooler_power", json!(if target < AMBIENT { 60.0 } else { 0.0 }));
        } else {
            core.props.update("temperature", json!(AMBIENT));
            core.props.update("cooler_power", json!(0.0));
        }
    }

    fn status(core: &DeviceCore) -> Value {
        let props = core.props.snapshot();
        json!({
            "state": props.get("state"),
            "lastExposure": props.get("last_exposure"),
            "lastImage": props.get("last_image"),
            "exposures": props.get("exposures"),
        })
    }
}

#[async_trait]
impl Behavior for SimCamera {
    const KIND: DeviceType = DeviceType::Camera;
    const TASKS: &'static [&'static str] =
        &["start_exposure", "abort_exposure", "exposure_status", "set_cooler"];
    const READ_ONLY: &'static [&'static str] = &[
        "state",
        "temperature",
        "cooler_power",
        "last_exposure",
        "last_image",
        "exposures",
        "sensor_width",
        "sensor_height",
    ];

    fn defaults() -> Vec<(&'static str, Value)> {
        vec![
            ("state", json!("idle")),
            ("temperature", json!(AMBIENT)),
            ("cooler_on", json!(false)),
            ("cooler_power", json!(0.0)),
            ("target_temperature", json!(-10.0)),
            ("gain", json!(100)),
            ("offset", json!(10)),
            ("binning", json!(1)),
            ("frame", json!({ "x": 0, "y": 0, "width": SENSOR_WIDTH, "height": SENSOR_HEIGHT })),
            ("sensor_width", json!(SENSOR_WIDTH)),
            ("sensor_height", json!(SENSOR_HEIGHT)),
            ("last_exposure", Value::Null),
            ("last_image", Value::Null),
            ("exposures", json!(0)),
        ]
    }

    fn validate(&self, _core: &DeviceCore, name: &str, value: &Value) -> Result<(), DeviceError> {
        match name {
            "gain" => int_in(name, value, 0, 600).map(drop),
            "offset" => int_in(name, value, 0, 255).map(drop),
            "binning" => int_in(name, value, 1, 4).map(drop),
            "target_temperature" => number_in(name, value, -50.0, 30.0).map(drop),
            "cooler_on" => boolean(name, value).map(drop),
            "frame" => validate_frame(value),
            _ => Ok(()),
        }
    }

    fn after_set(&self, core: &DeviceCore, name: &str) {
        if matches!(name, "cooler_on" | "target_temperature") {
            Self::apply_cooler(core);
        }
    }

    async fn run(&self, core: &DeviceCore, task: &str, raw: Value) -> Result<Value, DeviceError> {
        match task {
            "start_exposure" => {
                let p: ExposureParams = params(raw)?;
                let duration = check_range("duration", p.duration, 0.0, MAX_EXPOSURE)?;
                self.start(core, duration, p.light.unwrap_or(true))?;
                Ok(json!({ "state": "exposing", "duration": duration }))
            },
            "abort_exposure" => Ok(json!({ "aborted": self.abort(core) })),
            "exposure_status" => Ok(Self::status(core)),
            "set_cooler" => {
                let p: CoolerParams = params(raw)?;
                if let Some(target) = p.target {
                    check_range("target", target, -50.0, 30.0)?;
                    core.props.update("target_temperature", json!(target));
                }
                core.props.update("cooler_on", json!(p.on));
                Self::apply_cooler(core);
                Ok(json!({
                    "coolerOn": p.on,
                    "temperature": core.props.get("temperature"),
                }))
            },
            other => Err(unsupported(other)),
        }
    }

    fn on_disconnect(&self, core: &DeviceCore) {
        self.abort(core);
    }
}

fn validate_frame(value: &Value) -> Result<(), DeviceError> {
    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_i64)
            .ok_or_else(|| DeviceError::invalid_value(format!("frame.{key} must be an integer")))
    };
    let (x, y, width, height) = (field("x")?, field("y")?, field("width")?, field("height")?);
    if x < 0 || y < 0 || width < 1 || height < 1 {
        return Err(DeviceError::invalid_value("frame origin must be >= 0 and size >= 1"));
    }
    if x > SENSOR_WIDTH - width || y > SENSOR_HEIGHT - height {
        return Err(DeviceError::invalid_value(format!(
            "frame exceeds the {SENSOR_WIDTH}x{SENSOR_HEIGHT} sensor"
        )));
    }
    Ok(())
}
