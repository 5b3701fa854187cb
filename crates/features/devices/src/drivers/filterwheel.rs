use super::{params, unsupported};
use crate::device::{Behavior, DeviceCore};
use crate::error::DeviceError;
use async_trait::async_trait;
use lithium_domain::device::DeviceType;
use serde::Deserialize;
use serde_json::{Value, json};

const SLOTS: usize = 5;

/// Simulated filter wheel with named slots. Positions are 0-based.
#[derive(Debug, Default)]
pub struct SimFilterWheel;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MoveParams {
    #[serde(default)]
    slot: Option<usize>,
    #[serde(default)]
    filter: Option<String>,
}

fn names(core: &DeviceCore) -> Vec<String> {
    core.props
        .get("filters")
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

fn select(core: &DeviceCore, slot: usize) -> Value {
    let filter = names(core).get(slot).cloned().unwrap_or_default();
    core.props.update("position", json!(slot));
    core.props.update("current_filter", json!(filter));
    json!({ "position": slot, "filter": filter })
}

#[async_trait]
impl Behavior for SimFilterWheel {
    const KIND: DeviceType = DeviceType::FilterWheel;
    const TASKS: &'static [&'static str] = &["move_to"];
    const READ_ONLY: &'static [&'static str] = &["position", "slots", "current_filter"];

    fn defaults() -> Vec<(&'static str, Value)> {
        vec![
            ("position", json!(0)),
            ("slots", json!(SLOTS)),
            ("filters", json!(["L", "R", "G", "B", "Ha"])),
            ("current_filter", json!("L")),
        ]
    }

    fn validate(&self, _core: &DeviceCore, name: &str, value: &Value) -> Result<(), DeviceError> {
        if name != "filters" {
            return Ok(());
        }
        let filters: Vec<String> = serde_json::from_value(value.clone())
            .map_err(|_| DeviceError::invalid_value("filters must be an array of names"))?;
        if filters.len() != SLOTS {
            return Err(DeviceError::invalid_value(format!(
                "expected {SLOTS} filter names, got {}",
                filters.len()
            )));
        }
        if filters.iter().any(|f| f.trim().is_empty()) {
            return Err(DeviceError::invalid_value("filter names must not be empty"));
        }
        Ok(())
    }

    fn after_set(&self, core: &DeviceCore, name: &str) {
        if name == "filters" {
            let slot = usize::try_from(core.props.i64_or("position", 0)).unwrap_or_default();
            select(core, slot);
        }
    }

    async fn run(&self, core: &DeviceCore, task: &str, raw: Value) -> Result<Value, DeviceError> {
        if task != "move_to" {
            return Err(unsupported(task));
        }

        let p: MoveParams = params(raw)?;
        let slot = match (p.slot, p.filter) {
            (Some(slot), None) if slot < SLOTS => slot,
            (Some(slot), None) => {
                return Err(DeviceError::invalid_value(format!(
                    "slot {slot} outside 0..{SLOTS}"
                )));
            },
            (None, Some(filter)) => names(core)
                .iter()
                .position(|name| name.eq_ignore_ascii_case(&filter))
                .ok_or_else(|| DeviceError::invalid_value(format!("no filter named '{filter}'")))?,
            _ => return Err(DeviceError::invalid_value("give exactly one of 'slot' or 'filter'")),
        };

        Ok(select(core, slot))
    }
}
