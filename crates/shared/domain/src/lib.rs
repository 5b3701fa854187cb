//! # Domain Models
//!
//! Pure data shared across Lithium crates: application configuration, device kinds,
//! bus event payloads and the feature-slice registry. No I/O, networking or runtime code lives here.

pub mod config;
pub mod constants;
pub mod device;
pub mod events;
pub mod registry;
