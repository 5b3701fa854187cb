//! Device kinds and boot-time device declarations.

use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Equipment category. String form is lower-case (`filterwheel`), parsing ignores case.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeviceType {
    Camera,
    Telescope,
    Focuser,
    FilterWheel,
    Solver,
    Guider,
}

impl<'de> Deserialize<'de> for DeviceType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::from_str(&raw).map_err(|_| {
            serde::de::Error::custom(format!("unknown device type '{raw}'"))
        })
    }
}

/// A device to register at startup (`[[devices.boot]]` in the config file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    #[serde(rename = "type")]
    pub kind: DeviceType,
    pub name: String,
    pub driver: String,
    /// Connect right after registration.
    #[serde(default)]
    pub connect: bool,
}
