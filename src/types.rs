// src/types.rs

use serde::{Deserialize, Serialize};

use crate::tracking::TrackerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub detector: DetectorConfig,
    pub actuator: ActuatorConfig,
    pub streams: Vec<StreamConfig>,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub confidence_threshold: f32,
    /// Class names to keep, resolved against the detector vocabulary
    pub allowed_classes: Vec<String>,
    /// COCO ids used when none of `allowed_classes` resolve
    pub fallback_class_ids: Vec<u32>,
    /// Run detection on every n-th frame; other frames only coast the tracker
    pub infer_every: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.30,
            allowed_classes: vec!["person".into(), "car".into(), "cup".into()],
            fallback_class_ids: vec![0, 2, 41],
            infer_every: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    /// Minimum spacing between two emitted pulses, across all streams
    pub cooldown_secs: f64,
    pub pulse_ms: u64,
    pub duty_percent: u8,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 0.5,
            pulse_ms: 200,
            duty_percent: 70,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    /// JSON-lines recording of frames + detections
    pub replay_path: String,
    #[serde(default = "default_fps")]
    pub fps: f64,
}

fn default_fps() -> f64 {
    12.0
}

/// Accepted frame-rate range for a stream.
pub const MIN_FPS: f64 = 0.1;
pub const MAX_FPS: f64 = 1000.0;

/// Longest accepted actuator cooldown.
pub const MAX_COOLDOWN_SECS: f64 = 3600.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for per-stream JSON-lines track records; disabled when unset
    pub records_dir: Option<String>,
    /// Minimum spacing between two persisted frames of one stream
    pub save_interval_secs: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            records_dir: None,
            save_interval_secs: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "approach_tracker=info".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub stream: String,
    pub index: u64,
    pub width: u32,
    pub height: u32,
    /// Opaque frame payload handed to the detector
    pub data: Vec<u8>,
}
