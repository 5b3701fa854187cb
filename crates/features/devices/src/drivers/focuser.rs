use super::{int_in, params, unsupported};
use crate::device::{Behavior, DeviceCore};
use crate::error::DeviceError;
use async_trait::async_trait;
use lithium_domain::device::DeviceType;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};

/// Simulated absolute focuser with backlash compensation.
///
/// Reversing direction costs `backlash` extra steps, accumulated in `steps_moved`.
#[derive(Debug, Default)]
pub struct SimFocuser {
    /// Sign of the previous move, 0 before the first one.
    direction: Mutex<i8>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MoveToParams {
    position: i64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MoveByParams {
    steps: i64,
}

impl SimFocuser {
    fn move_to(&self, core: &DeviceCore, target: i64) -> Result<Value, DeviceError> {
        let max = core.props.i64_or("max_position", 0);
        if !(0..=max).contains(&target) {
            return Err(DeviceError::invalid_value(format!(
                "position {target} outside 0..={max}"
            )));
        }

        let current = core.props.i64_or("position", 0);
        let delta = target - current;
        let sign: i8 = match delta.signum() {
            1 => 1,
            -1 => -1,
            _ => 0,
        };

        let mut direction = self.direction.lock();
        let compensation = if sign != 0 && *direction != 0 && *direction != sign {
            core.props.i64_or("backlash", 0)
        } else {
            0
        };
        if sign != 0 {
            *direction = sign;
        }
        drop(direction);

        let steps = delta.abs() + compensation;
        let total = core.props.i64_or("steps_moved", 0) + steps;
        core.props.update("position", json!(target));
        core.props.update("steps_moved", json!(total));

        Ok(json!({ "position": target, "steps": steps, "backlash": compensation }))
    }
}

#[async_trait]
impl Behavior for SimFocuser {
    const KIND: DeviceType = DeviceType::Focuser;
    const TASKS: &'static [&'static str] = &["move_to", "move_by", "halt"];
    const READ_ONLY: &'static [&'static str] = &["position", "temperature", "moving", "steps_moved"];

    fn defaults() -> Vec<(&'static str, Value)> {
        vec![
            ("position", json!(25_000)),
            ("max_position", json!(50_000)),
            ("backlash", json!(0)),
            ("temperature", json!(12.5)),
            ("moving", json!(false)),
            ("steps_moved", json!(0)),
        ]
    }

    fn validate(&self, core: &DeviceCore, name: &str, value: &Value) -> Result<(), DeviceError> {
        match name {
            "max_position" => {
                let position = core.props.i64_or("position", 0);
                int_in(name, value, position.max(1), 1_000_000).map(drop)
            },
            "backlash" => int_in(name, value, 0, 10_000).map(drop),
            _ => Ok(()),
        }
    }

    async fn run(&self, core: &DeviceCore, task: &str, raw: Value) -> Result<Value, DeviceError> {
        match task {
            "move_to" => {
                let p: MoveToParams = params(raw)?;
                self.move_to(core, p.position)
            },
            "move_by" => {
                let p: MoveByParams = params(raw)?;
                let target = core.props.i64_or("position", 0).saturating_add(p.steps);
                self.move_to(core, target)
            },
            "halt" => Ok(json!({ "position": core.props.get("position") })),
            other => Err(unsupported(other)),
        }
    }
}
