// src/pipeline/detector.rs
//
// Detector seam. The tracker never sees a model: it receives boxes and class
// ids. A single detector instance may be shared by every stream worker, in
// which case calls are serialized through `SharedDetector`'s mutex and the
// lock is released before any tracking work starts.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::tracking::Detection;
use crate::types::{DetectorConfig, Frame};

pub trait Detector: Send {
    /// Detect objects in one frame. Boxes are in frame pixel coordinates.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Class-id → name vocabulary, indexed by class id.
    fn class_names(&self) -> &[String];
}

pub type SharedDetector = Arc<Mutex<Box<dyn Detector>>>;

pub fn shared(detector: Box<dyn Detector>) -> SharedDetector {
    Arc::new(Mutex::new(detector))
}

/// Run the shared detector on `frame`, holding the lock only for the call.
pub async fn detect_serialized(detector: &SharedDetector, frame: &Frame) -> Result<Vec<Detection>> {
    let mut guard = detector.lock().await;
    guard.detect(frame)
}

// ============================================================================
// CLASS FILTER
// ============================================================================

/// Keeps detections of allowed classes above the confidence threshold.
#[derive(Debug, Clone)]
pub struct ClassFilter {
    allowed: HashSet<u32>,
    min_confidence: f32,
    class_names: Vec<String>,
}

impl ClassFilter {
    /// Resolve allowed class names against the detector vocabulary
    /// (case-insensitive), falling back to the configured ids when no name
    /// resolves.
    pub fn resolve(config: &DetectorConfig, class_names: &[String]) -> Self {
        let mut allowed: HashSet<u32> = HashSet::new();
        for wanted in &config.allowed_classes {
            if let Some(id) = class_names
                .iter()
                .position(|n| n.eq_ignore_ascii_case(wanted))
            {
                allowed.insert(id as u32);
            }
        }

        if allowed.is_empty() {
            warn!(
                "No allowed class names found in detector vocabulary, using fallback ids {:?}",
                config.fallback_class_ids
            );
            allowed.extend(config.fallback_class_ids.iter().copied());
        }

        let mut ids: Vec<u32> = allowed.iter().copied().collect();
        ids.sort_unstable();
        info!("Allowed classes: {:?}", ids);

        Self {
            allowed,
            min_confidence: config.confidence_threshold,
            class_names: class_names.to_vec(),
        }
    }

    /// Display name for a class id, `"?"` when unknown.
    pub fn name_of(&self, class_id: Option<u32>) -> &str {
        class_id
            .and_then(|c| self.class_names.get(c as usize))
            .map(String::as_str)
            .unwrap_or("?")
    }

    pub fn accepts(&self, det: &Detection) -> bool {
        let class_ok = det.class_id.map_or(false, |c| self.allowed.contains(&c));
        let conf_ok = det.confidence.map_or(true, |c| c >= self.min_confidence);
        class_ok && conf_ok
    }

    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections.into_iter().filter(|d| self.accepts(d)).collect()
    }
}

// ============================================================================
// REPLAY DETECTOR
// ============================================================================

/// One recorded frame, as stored in a replay file (one JSON object per line).
#[derive(Debug, Clone, Deserialize)]
pub struct RecordedFrame {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// Detector that decodes detections recorded alongside each replayed frame.
pub struct ReplayDetector {
    class_names: Vec<String>,
}

impl ReplayDetector {
    pub fn new(class_names: Vec<String>) -> Self {
        Self { class_names }
    }

    pub fn coco() -> Self {
        Self::new(COCO_CLASSES.iter().map(|s| s.to_string()).collect())
    }
}

impl Detector for ReplayDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let recorded: RecordedFrame = serde_json::from_slice(&frame.data).with_context(|| {
            format!("{}: frame {} has no decodable detections", frame.stream, frame.index)
        })?;
        debug!(
            "[{}] frame {}: {} recorded detections",
            frame.stream,
            frame.index,
            recorded.detections.len()
        );
        Ok(recorded.detections)
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }
}

pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];
