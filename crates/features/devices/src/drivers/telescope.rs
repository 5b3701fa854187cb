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

const PARK_RA: f64 = 0.0;
const PARK_DEC: f64 = 90.0;

/// Simulated equatorial mount. RA is in hours, Dec in degrees.
///
/// A slew takes `slew_time_ms`; zero completes it synchronously. Targets outside
/// `dec_min..=dec_max` are refused.
#[derive(Debug, Default)]
pub struct SimTelescope {
    slew: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SlewParams {
    ra: f64,
    dec: f64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TrackingParams {
    enabled: bool,
}

impl SimTelescope {
    fn abort(&self, core: &DeviceCore) -> bool {
        if let Some(handle) = self.slew.lock().take() {
            handle.abort();
        }
        core.props.update("slewing", json!(false))
    }

    fn ensure_unparked(core: &DeviceCore) -> Result<(), DeviceError> {
        if core.props.bool_or("parked", false) {
            Err(DeviceError::invalid_state(format!("telescope '{}' is parked", core.name)))
        } else {
            Ok(())
        }
    }

    fn slew(&self, core: &DeviceCore, ra: f64, dec: f64) -> Result<Value, DeviceError> {
        Self::ensure_unparked(core)?;
        let ra = check_range("ra", ra, 0.0, 24.0)?;
        let dec_min = core.props.f64_or("dec_min", -90.0);
        let dec_max = core.props.f64_or("dec_max", 90.0);
        let dec = check_range("dec", dec, dec_min, dec_max)?;

        self.abort(core);
        core.props.update("target_ra", json!(ra));
        core.props.update("target_dec", json!(dec));

        let delay = core.props.i64_or("slew_time_ms", 0);
        if delay <= 0 {
            core.props.update("ra", json!(ra));
            core.props.update("dec", json!(dec));
            return Ok(json!({ "slewing": false, "ra": ra, "dec": dec }));
        }

        core.props.update("slewing", json!(true));
        let props = core.props.clone();
        let name = core.name.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay.unsigned_abs())).await;
            props.update("ra", json!(ra));
            props.update("dec", json!(dec));
            props.update("slewing", json!(false));
            info!(device = %name, ra, dec, "Slew complete");
        });
        *self.slew.lock() = Some(handle);
        Ok(json!({ "slewing": true, "ra": ra, "dec": dec }))
    }
}

#[async_trait]
impl Behavior for SimTelescope {
    const KIND: DeviceType = DeviceType::Telescope;
    const TASKS: &'static [&'static str] = &["slew", "abort", "park", "unpark", "set_tracking"];
    const READ_ONLY: &'static [&'static str] =
        &["ra", "dec", "target_ra", "target_dec", "slewing", "parked"];

    fn defaults() -> Vec<(&'static str, Value)> {
        vec![
            ("ra", json!(PARK_RA)),
            ("dec", json!(PARK_DEC)),
            ("target_ra", Value::Null),
            ("target_dec", Value::Null),
            ("slewing", json!(false)),
            ("parked", json!(false)),
            ("tracking", json!(false)),
            ("slew_time_ms", json!(0)),
            ("dec_min", json!(-90.0)),
            ("dec_max", json!(90.0)),
        ]
    }

    fn validate(&self, core: &DeviceCore, name: &str, value: &Value) -> Result<(), DeviceError> {
        match name {
            "tracking" => {
                boolean(name, value)?;
                Self::ensure_unparked(core)
            },
            "slew_time_ms" => int_in(name, value, 0, 600_000).map(drop),
            "dec_min" => {
                let max = core.props.f64_or("dec_max", 90.0);
                number_in(name, value, -90.0, max).map(drop)
            },
            "dec_max" => {
                let min = core.props.f64_or("dec_min", -90.0);
                number_in(name, value, min, 90.0).map(drop)
            },
            _ => Ok(()),
        }
    }

    async fn run(&self, core: &DeviceCore, task: &str, raw: Value) -> Result<Value, DeviceError> {
        match task {
            "slew" => {
                let p: SlewParams = params(raw)?;
                self.slew(core, p.ra, p.dec)
            },
            "abort" => Ok(json!({ "aborted": self.abort(core) })),
            "park" => {
                self.abort(core);
                core.props.update("tracking", json!(false));
                core.props.update("ra", json!(PARK_RA));
                core.props.update("dec", json!(PARK_DEC));
                core.props.update("parked", json!(true));
                info!(device = %core.name, "Telescope parked");
                Ok(json!({ "parked": true }))
            },
            "unpark" => {
                core.props.update("parked", json!(false));
                Ok(json!({ "parked": false }))
            },
            "set_tracking" => {
                let p: TrackingParams = params(raw)?;
                Self::ensure_unparked(core)?;
                core.props.update("tracking", json!(p.enabled));
                Ok(json!({ "tracking": p.enabled }))
            },
            other => Err(unsupported(other)),
        }
    }

    fn on_disconnect(&self, core: &DeviceCore) {
        self.abort(core);
    }
}
