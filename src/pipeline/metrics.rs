// src/pipeline/metrics.rs
//
// Per-stream counters, shared between the worker and the supervisor.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct StreamMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub inferred_frames: Arc<AtomicU64>,
    pub detections: Arc<AtomicU64>,
    pub tracks_created: Arc<AtomicU64>,
    pub approach_events: Arc<AtomicU64>,
    pub pulses: Arc<AtomicU64>,
    pub detector_errors: Arc<AtomicU64>,
    pub inference_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            inferred_frames: Arc::new(AtomicU64::new(0)),
            detections: Arc::new(AtomicU64::new(0)),
            tracks_created: Arc::new(AtomicU64::new(0)),
            approach_events: Arc::new(AtomicU64::new(0)),
            pulses: Arc::new(AtomicU64::new(0)),
            detector_errors: Arc::new(AtomicU64::new(0)),
            inference_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            inferred_frames: self.inferred_frames.load(Ordering::Relaxed),
            fps: self.fps(),
            detections: self.detections.load(Ordering::Relaxed),
            tracks_created: self.tracks_created.load(Ordering::Relaxed),
            approach_events: self.approach_events.load(Ordering::Relaxed),
            pulses: self.pulses.load(Ordering::Relaxed),
            detector_errors: self.detector_errors.load(Ordering::Relaxed),
            last_inference_us: self.inference_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub inferred_frames: u64,
    pub fps: f64,
    pub detections: u64,
    pub tracks_created: u64,
    pub approach_events: u64,
    pub pulses: u64,
    pub detector_errors: u64,
    pub last_inference_us: u64,
    pub elapsed_secs: f64,
}
