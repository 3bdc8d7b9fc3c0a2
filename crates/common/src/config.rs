//! Testbed configuration.
//!
//! Stored as JSON. Every field has a default so partial files are accepted;
//! command line flags of the apps override individual values afterwards.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors from loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Projection settings for the free camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 90.0,
            near: 1.0,
            far: 10_000.0,
        }
    }
}

/// Window settings for the desktop app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            vsync: true,
        }
    }
}

/// Top-level testbed configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestbedConfig {
    /// Samples per axis of the generated density field.
    pub field_dimension: i32,
    /// Name of the initial rendering mode (parsed by the render crate).
    pub mode: String,
    pub camera: CameraConfig,
    pub window: WindowConfig,
    /// Periodically log the debug-info report.
    pub debug_overlay: bool,
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self {
            field_dimension: 256,
            mode: "ColorFromScreenSpacePosition".into(),
            camera: CameraConfig::default(),
            window: WindowConfig::default(),
            debug_overlay: true,
        }
    }
}

impl TestbedConfig {
    /// Load a configuration from a JSON file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path.as_ref())?;
        let config: Self = serde_json::from_reader(file)?;
        config.validate()?;
        tracing::debug!(path = %path.as_ref().display(), "configuration loaded");
        Ok(config)
    }

    /// Save the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.field_dimension < 1 {
            return Err(ConfigError::Invalid(format!(
                "field_dimension must be at least 1, got {}",
                self.field_dimension
            )));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid("window size must be non-zero".into()));
        }
        let cam = &self.camera;
        if cam.near <= 0.0 || cam.far <= cam.near {
            return Err(ConfigError::Invalid(format!(
                "camera clipping planes must satisfy 0 < near < far, got near={} far={}",
                cam.near, cam.far
            )));
        }
        if !(cam.fov_degrees > 0.0 && cam.fov_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "camera fov must be in (0, 180), got {}",
                cam.fov_degrees
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = TestbedConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.field_dimension, 256);
        assert_eq!(config.camera.fov_degrees, 90.0);
    }

    #[test]
    fn partial_file_uses_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, r#"{{ "field_dimension": 32, "camera": {{ "far": 500.0 }} }}"#).unwrap();

        let config = TestbedConfig::load(tmp.path()).unwrap();
        assert_eq!(config.field_dimension, 32);
        assert_eq!(config.camera.far, 500.0);
        assert_eq!(config.camera.near, 1.0);
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn save_and_load() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let config = TestbedConfig {
            mode: "FullVolumeRaycasting".into(),
            ..TestbedConfig::default()
        };
        config.save(tmp.path()).unwrap();

        let loaded = TestbedConfig::load(tmp.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn rejects_non_positive_dimension() {
        let config = TestbedConfig {
            field_dimension: 0,
            ..TestbedConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_inverted_clipping_planes() {
        let mut config = TestbedConfig::default();
        config.camera.near = 10.0;
        config.camera.far = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_an_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "not json").unwrap();
        assert!(matches!(
            TestbedConfig::load(tmp.path()),
            Err(ConfigError::Json(_))
        ));
    }
}
