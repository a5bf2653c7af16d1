// src/tracking/track.rs
//
// A single tracked object: one box filter plus lifecycle bookkeeping and the
// smoothed normalized-area history that drives the approach heuristic.
//
// Track ids come from one process-wide atomic counter so that trackers
// running on different camera streams never hand out the same id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use super::geometry::{box_area, BBox};
use super::kalman::KalmanBox;

/// Floor for any elapsed-time value used as a divisor or filter step.
pub const MIN_DT_SECS: f32 = 1e-3;

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next track id. Strictly increasing for the life of the process.
pub fn next_track_id() -> u64 {
    NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed)
}

/// Detection as handed to the tracker by the detector seam.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Detection {
    pub bbox: BBox, // [x1, y1, x2, y2] pixels
    #[serde(default)]
    pub class_id: Option<u32>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl Detection {
    pub fn new(bbox: BBox, class_id: Option<u32>) -> Self {
        Self {
            bbox,
            class_id,
            confidence: None,
        }
    }
}

// ============================================================================
// AREA TREND (approach heuristic state)
// ============================================================================

/// Smoothed normalized-area history.
///
/// Kept as two plain floats plus a seeded flag so that [`AreaTrend::advance`]
/// is a pure function of the previous trend and the new sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AreaTrend {
    pub area_ema: f32,
    pub last_area_ema: f32,
    pub seeded: bool,
}

impl AreaTrend {
    /// Blend `sample` into the trend and return the new trend with the rate of
    /// change of the smoothed area (per second).
    ///
    /// The first sample seeds the average directly and reports a zero rate, so
    /// a freshly created track never starts out approaching.
    pub fn advance(self, sample: f32, alpha: f32, dt: f32) -> (AreaTrend, f32) {
        let (prev, ema) = if self.seeded {
            (
                self.last_area_ema,
                (1.0 - alpha) * self.area_ema + alpha * sample,
            )
        } else {
            (sample, sample)
        };
        let rate = (ema - prev) / dt.max(MIN_DT_SECS);
        let next = AreaTrend {
            area_ema: ema,
            last_area_ema: ema,
            seeded: true,
        };
        (next, rate)
    }
}

// ============================================================================
// TRACK
// ============================================================================

#[derive(Debug, Clone)]
pub struct Track {
    pub id: u64,
    pub class_id: Option<u32>,
    pub hits: u32,
    pub age: u32,
    pub time_since_update: u32,
    pub approaching: bool,
    trend: AreaTrend,
    kf: KalmanBox,
    last_update_time: Instant,
}

impl Track {
    pub fn new(det: &Detection, now: Instant) -> Self {
        Self {
            id: next_track_id(),
            class_id: det.class_id,
            hits: 1,
            age: 0,
            time_since_update: 0,
            approaching: false,
            trend: AreaTrend::default(),
            kf: KalmanBox::new(&det.bbox),
            last_update_time: now,
        }
    }

    /// Advance the filter by the wall time elapsed since the last
    /// predict/update and age the track by one step.
    pub fn predict(&mut self, now: Instant) -> BBox {
        let dt = now
            .saturating_duration_since(self.last_update_time)
            .as_secs_f32()
            .max(MIN_DT_SECS);
        self.last_update_time = now;
        let bbox = self.kf.predict(dt);
        self.age += 1;
        self.time_since_update += 1;
        bbox
    }

    pub fn apply_match(&mut self, det: &Detection, now: Instant) {
        self.kf.update(&det.bbox);
        if det.class_id.is_some() {
            self.class_id = det.class_id;
        }
        self.hits += 1;
        self.time_since_update = 0;
        self.last_update_time = now;
    }

    pub fn bbox(&self) -> BBox {
        self.kf.bbox()
    }

    /// Recompute the normalized area, its smoothed rate of change and the
    /// `approaching` flag. Returns `(normalized_area, rate_per_sec)`.
    pub fn refresh_approach_state(
        &mut self,
        frame_w: f32,
        frame_h: f32,
        dt: f32,
        alpha: f32,
        rate_threshold: f32,
    ) -> (f32, f32) {
        let area = (box_area(&self.bbox()) / (frame_w * frame_h)).clamp(0.0, 1.0);
        let (trend, rate) = self.trend.advance(area, alpha, dt);
        self.trend = trend;
        self.approaching = rate > rate_threshold;
        (area, rate)
    }

    pub fn area_trend(&self) -> AreaTrend {
        self.trend
    }

    pub fn filter(&self) -> &KalmanBox {
        &self.kf
    }
}
