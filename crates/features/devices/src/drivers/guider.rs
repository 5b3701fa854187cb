use super::{check_range, number_in, params, unsupported};
use crate::device::{Behavior, DeviceCore};
use crate::error::DeviceError;
use async_trait::async_trait;
use lithium_domain::device::DeviceType;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

/// Dither offsets walk a golden-angle spiral so consecutive dithers never repeat.
const GOLDEN_ANGLE: f64 = 137.507_764;

/// Simulated autoguider.
#[derive(Debug, Default)]
pub struct SimGuider;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct DitherParams {
    #[serde(default)]
    pixels: Option<f64>,
}

fn ensure(core: &DeviceCore, property: &str, message: &str) -> Result<(), DeviceError> {
    if core.props.bool_or(property, false) {
        Ok(())
    } else {
        Err(DeviceError::invalid_state(format!("guider '{}' {message}", core.name)))
    }
}

#[async_trait]
impl Behavior for SimGuider {
    const KIND: DeviceType = DeviceType::Guider;
    const TASKS: &'static [&'static str] = &["calibrate", "start", "stop", "dither"];
    const READ_ONLY: &'static [&'static str] =
        &["guiding", "calibrated", "rms_ra", "rms_dec", "dithers", "last_dither"];

    fn defaults() -> Vec<(&'static str, Value)> {
        vec![
            ("guiding", json!(false)),
            ("calibrated", json!(false)),
            ("exposure", json!(2.0)),
            ("dither_pixels", json!(5.0)),
            ("rms_ra", json!(0.0)),
            ("rms_dec", json!(0.0)),
            ("dithers", json!(0)),
            ("last_dither", Value::Null),
        ]
    }

    fn validate(&self, _core: &DeviceCore, name: &str, value: &Value) -> Result<(), DeviceError> {
        match name {
            "exposure" => number_in(name, value, 0.1, 30.0).map(drop),
            "dither_pixels" => number_in(name, value, 0.1, 50.0).map(drop),
            _ => Ok(()),
        }
    }

    async fn run(&self, core: &DeviceCore, task: &str, raw: Value) -> Result<Value, DeviceError> {
        match task {
            "calibrate" => {
                core.props.update("calibrated", json!(true));
                info!(device = %core.name, "Guider calibrated");
                Ok(json!({ "calibrated": true }))
            },
            "start" => {
                ensure(core, "calibrated", "is not calibrated")?;
                core.props.update("guiding", json!(true));
                core.props.update("rms_ra", json!(0.42));
                core.props.update("rms_dec", json!(0.37));
                Ok(json!({ "guiding": true }))
            },
            "stop" => {
                core.props.update("guiding", json!(false));
                Ok(json!({ "guiding": false }))
            },
            "dither" => {
                ensure(core, "guiding", "is not guiding")?;
                let p: DitherParams = params(raw)?;
                let pixels = match p.pixels {
                    Some(pixels) => check_range("pixels", pixels, 0.1, 50.0)?,
                    None => core.props.f64_or("dither_pixels", 5.0),
                };
                let count = core.props.i64_or("dithers", 0) + 1;
                let angle = (GOLDEN_ANGLE * f64::from(i32::try_from(count).unwrap_or(i32::MAX)))
                    .to_radians();
                let offset = json!({ "dx": pixels * angle.cos(), "dy": pixels * angle.sin() });
                core.props.update("dithers", json!(count));
                core.props.update("last_dither", offset.clone());
                Ok(offset)
            },
            other => Err(unsupported(other)),
        }
    }

    fn on_disconnect(&self, core: &DeviceCore) {
        core.props.update("guiding", json!(false));
    }
}
