use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FocuscamConfig {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub processing: ProcessingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Camera resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second requested from the device
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Video format (MJPG, YUYV, etc.)
    #[serde(default = "default_camera_format")]
    pub format: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectionConfig {
    /// Minimum confidence for a presence result to count
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// IoU threshold passed through to the detector backend
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f64,

    /// Path to the detection model, if the backend needs one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProcessingConfig {
    /// Target presence-detection rate, independent of camera fps
    #[serde(default = "default_target_fps")]
    pub target_fps: u32,

    /// Frame buffer capacity between capture and processing
    #[serde(default = "default_frame_buffer_size")]
    pub frame_buffer_size: usize,

    /// How long the processing loop waits for a frame before retrying
    #[serde(default = "default_pop_timeout_ms")]
    pub pop_timeout_ms: u64,

    /// Bound on waiting for the capture/processing loops to join on stop
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

impl ProcessingConfig {
    /// Interval between processed frames derived from the target rate.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.target_fps.max(1)))
    }

    pub fn pop_timeout(&self) -> Duration {
        Duration::from_millis(self.pop_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl FocuscamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("focuscam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("camera.index", default_camera_index())?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.format", default_camera_format())?
            .set_default(
                "detection.confidence_threshold",
                default_confidence_threshold(),
            )?
            .set_default("detection.iou_threshold", default_iou_threshold())?
            .set_default("processing.target_fps", default_target_fps())?
            .set_default(
                "processing.frame_buffer_size",
                default_frame_buffer_size() as i64,
            )?
            .set_default("processing.pop_timeout_ms", default_pop_timeout_ms() as i64)?
            .set_default(
                "processing.stop_timeout_secs",
                default_stop_timeout_secs() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with FOCUSCAM_ prefix
            .add_source(Environment::with_prefix("FOCUSCAM").separator("_"))
            .build()?;

        let config: FocuscamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.processing.target_fps == 0 {
            return Err(ConfigError::Message(
                "Processing target_fps must be greater than 0".to_string(),
            ));
        }

        if self.processing.frame_buffer_size == 0 {
            return Err(ConfigError::Message(
                "Frame buffer size must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(ConfigError::Message(
                "Detection confidence_threshold must be between 0 and 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detection.iou_threshold) {
            return Err(ConfigError::Message(
                "Detection iou_threshold must be between 0 and 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for FocuscamConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
                format: default_camera_format(),
            },
            detection: DetectionConfig {
                confidence_threshold: default_confidence_threshold(),
                iou_threshold: default_iou_threshold(),
                model_path: None,
            },
            processing: ProcessingConfig {
                target_fps: default_target_fps(),
                frame_buffer_size: default_frame_buffer_size(),
                pop_timeout_ms: default_pop_timeout_ms(),
                stop_timeout_secs: default_stop_timeout_secs(),
            },
        }
    }
}

fn default_camera_index() -> u32 {
    0
}

fn default_camera_resolution() -> (u32, u32) {
    (640, 480)
}

fn default_camera_fps() -> u32 {
    30
}

fn default_camera_format() -> String {
    "MJPG".to_string()
}

fn default_confidence_threshold() -> f64 {
    0.5
}

fn default_iou_threshold() -> f64 {
    0.45
}

fn default_target_fps() -> u32 {
    10
}

fn default_frame_buffer_size() -> usize {
    2
}

fn default_pop_timeout_ms() -> u64 {
    100
}

fn default_stop_timeout_secs() -> u64 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = FocuscamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.camera.resolution, (640, 480));
        assert_eq!(config.processing.target_fps, 10);
        assert_eq!(config.processing.frame_buffer_size, 2);
    }

    #[test]
    fn test_frame_interval() {
        let mut processing = FocuscamConfig::default().processing;
        assert_eq!(processing.frame_interval(), Duration::from_millis(100));

        processing.target_fps = 50;
        assert_eq!(processing.frame_interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = FocuscamConfig::default();
        config.camera.fps = 0;
        assert!(config.validate().is_err());

        let mut config = FocuscamConfig::default();
        config.processing.target_fps = 0;
        assert!(config.validate().is_err());

        let mut config = FocuscamConfig::default();
        config.processing.frame_buffer_size = 0;
        assert!(config.validate().is_err());

        let mut config = FocuscamConfig::default();
        config.detection.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "[camera]\nindex = 2\nfps = 15\n\n[processing]\ntarget_fps = 5\n"
        )
        .unwrap();

        let config = FocuscamConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.camera.index, 2);
        assert_eq!(config.camera.fps, 15);
        assert_eq!(config.processing.target_fps, 5);
        // Untouched values fall back to defaults
        assert_eq!(config.camera.resolution, (640, 480));
        assert_eq!(config.processing.frame_buffer_size, 2);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = FocuscamConfig::load_from_file("does-not-exist.toml").unwrap();
        assert_eq!(config.camera.index, 0);
        assert_eq!(config.processing.target_fps, 10);
    }
}
