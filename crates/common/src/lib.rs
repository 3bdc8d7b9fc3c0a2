//! Shared types for the volumetric terrain testbed.
//!
//! Holds the small value types every other crate speaks in (grid extents,
//! frame timing) and the testbed configuration loaded by the apps.

pub mod config;
mod types;

pub use config::{CameraConfig, ConfigError, TestbedConfig, WindowConfig};
pub use types::{FrameTime, GridDimension};

pub fn crate_info() -> &'static str {
    "volterra-common v0.1.0"
}
