use super::{check_range, number_in, params, unsupported};
use crate::device::{Behavior, DeviceCore};
use crate::error::DeviceError;
use async_trait::async_trait;
use lithium_domain::device::DeviceType;
use serde::Deserialize;
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::info;

const FOV_WIDTH: f64 = 1.26;
const FOV_HEIGHT: f64 = 0.86;

/// Simulated plate solver.
///
/// The solution is derived from a hash of the image path and size, so the same file
/// always solves to the same coordinates. RA/Dec hints, when given, become the
/// solved center.
#[derive(Debug, Default)]
pub struct SimSolver;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SolveParams {
    image: PathBuf,
    #[serde(default)]
    ra: Option<f64>,
    #[serde(default)]
    dec: Option<f64>,
}

/// Maps `seed % modulus` to `0.0..modulus / 1000`.
fn scaled(seed: u64, modulus: u32) -> f64 {
    let bucket = u32::try_from(seed % u64::from(modulus)).unwrap_or_default();
    f64::from(bucket) / 1000.0
}

#[async_trait]
impl Behavior for SimSolver {
    const KIND: DeviceType = DeviceType::Solver;
    const TASKS: &'static [&'static str] = &["solve"];
    const READ_ONLY: &'static [&'static str] = &["last_solution", "solves"];

    fn defaults() -> Vec<(&'static str, Value)> {
        vec![("search_radius", json!(15.0)), ("last_solution", Value::Null), ("solves", json!(0))]
    }

    fn validate(&self, _core: &DeviceCore, name: &str, value: &Value) -> Result<(), DeviceError> {
        match name {
            "search_radius" => number_in(name, value, 0.1, 180.0).map(drop),
            _ => Ok(()),
        }
    }

    async fn run(&self, core: &DeviceCore, task: &str, raw: Value) -> Result<Value, DeviceError> {
        if task != "solve" {
            return Err(unsupported(task));
        }

        let p: SolveParams = params(raw)?;
        let metadata = tokio::fs::metadata(&p.image).await.ok().filter(std::fs::Metadata::is_file);
        let Some(metadata) = metadata else {
            return Err(DeviceError::invalid_value(format!(
                "image not found: {}",
                p.image.display()
            )));
        };

        let seed = fxhash::hash64(&p.image.to_string_lossy()) ^ metadata.len();
        let ra = match p.ra {
            Some(ra) => check_range("ra", ra, 0.0, 24.0)?,
            None => scaled(seed, 24_000),
        };
        let dec = match p.dec {
            Some(dec) => check_range("dec", dec, -90.0, 90.0)?,
            None => scaled(seed >> 16, 180_000) - 90.0,
        };
        let rotation = scaled(seed >> 32, 360_000);

        let solution = json!({
            "image": p.image.display().to_string(),
            "ra": ra,
            "dec": dec,
            "rotation": rotation,
            "fovWidth": FOV_WIDTH,
            "fovHeight": FOV_HEIGHT,
        });
        let solves = core.props.i64_or("solves", 0) + 1;
        core.props.update("last_solution", solution.clone());
        core.props.update("solves", json!(solves));
        info!(device = %core.name, image = %p.image.display(), ra, dec, "Plate solved");

        Ok(solution)
    }
}
