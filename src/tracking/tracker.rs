// src/tracking/tracker.rs
//
// SORT-style multi-object tracker with an approach heuristic.
//
// One tracker per camera stream. Each step:
//   1. predict every track forward to "now"
//   2. associate detections to predicted boxes (1 − IoU, Hungarian, IoU gate)
//   3. update matched tracks, spawn tracks for unmatched detections
//   4. prune tracks that went more than `max_age` steps without a match
//   5. refresh each survivor's area trend and report it
//
// Track states are implicit:
//   Active  time_since_update == 0
//   Stale   0 < time_since_update <= max_age (still reported, box coasts)
//   Deleted time_since_update >  max_age    (removed, id never reused)

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::association::associate;
use super::geometry::{is_bounded_box, is_finite_box, BBox};
use super::track::{Detection, Track, MIN_DT_SECS};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum IoU for an assigned detection/track pair to count as a match
    pub iou_threshold: f32,
    /// Steps a track survives without a match before deletion
    pub max_age: u32,
    /// Smoothing factor for the normalized-area EMA (weight of the new sample)
    pub ema_alpha: f32,
    /// Smoothed normalized-area growth per second above which a track is approaching
    pub approach_rate_threshold: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.30,
            max_age: 10,
            ema_alpha: 0.3,
            approach_rate_threshold: 0.008,
        }
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

/// Per-step report for one live track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub id: u64,
    pub class_id: Option<u32>,
    pub bbox: BBox,
    /// Box area / frame area, in [0, 1]
    pub area: f32,
    /// Rate of change of the smoothed normalized area, per second
    pub area_rate: f32,
    pub approaching: bool,
}

// ============================================================================
// TRACKER
// ============================================================================

pub struct SortTracker {
    pub config: TrackerConfig,
    tracks: Vec<Track>,
}

impl SortTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::with_capacity(16),
        }
    }

    /// Process one frame of detections using the wall clock for prediction.
    pub fn step(
        &mut self,
        detections: &[Detection],
        frame_w: f32,
        frame_h: f32,
        dt: f32,
    ) -> Vec<TrackRecord> {
        self.step_at(detections, frame_w, frame_h, dt, Instant::now())
    }

    /// Process one frame of detections observed at `now`.
    ///
    /// `dt` is the elapsed time since the previous step and only drives the
    /// area-rate computation; per-track filter prediction uses `now`.
    pub fn step_at(
        &mut self,
        detections: &[Detection],
        frame_w: f32,
        frame_h: f32,
        dt: f32,
        now: Instant,
    ) -> Vec<TrackRecord> {
        let frame_w = sanitize_dimension(frame_w);
        let frame_h = sanitize_dimension(frame_h);
        let dt = if dt.is_finite() {
            dt.max(MIN_DT_SECS)
        } else {
            MIN_DT_SECS
        };

        let valid: Vec<&Detection> = detections
            .iter()
            .filter(|d| {
                let ok = is_bounded_box(&d.bbox);
                if !ok {
                    warn!("Dropping detection with non-finite or out-of-range box {:?}", d.bbox);
                }
                ok
            })
            .collect();

        // 1. Predict
        let predicted: Vec<BBox> = self.tracks.iter_mut().map(|t| t.predict(now)).collect();

        // 2. Associate
        let det_boxes: Vec<BBox> = valid.iter().map(|d| d.bbox).collect();
        let assoc = associate(&predicted, &det_boxes, self.config.iou_threshold);

        // 3. Update matched, spawn new
        for &(ti, di) in &assoc.matches {
            self.tracks[ti].apply_match(valid[di], now);
        }
        for &di in &assoc.unmatched_detections {
            let track = Track::new(valid[di], now);
            debug!(
                "🆕 New track T{}: class={:?}, bbox=[{:.0},{:.0},{:.0},{:.0}]",
                track.id,
                track.class_id,
                det_boxes[di][0],
                det_boxes[di][1],
                det_boxes[di][2],
                det_boxes[di][3]
            );
            self.tracks.push(track);
        }

        // 4. Prune
        let max_age = self.config.max_age;
        self.tracks.retain(|t| {
            if !is_finite_box(&t.bbox()) {
                warn!("Track {} dropped, filter state diverged", t.id);
                return false;
            }
            if t.time_since_update > max_age {
                debug!(
                    "🗑️  Track {} pruned ({} steps without a match, {} hits)",
                    t.id, t.time_since_update, t.hits
                );
                return false;
            }
            true
        });

        // 5. Report
        let alpha = self.config.ema_alpha;
        let threshold = self.config.approach_rate_threshold;
        self.tracks
            .iter_mut()
            .map(|t| {
                let (area, area_rate) =
                    t.refresh_approach_state(frame_w, frame_h, dt, alpha, threshold);
                TrackRecord {
                    id: t.id,
                    class_id: t.class_id,
                    bbox: t.bbox(),
                    area,
                    area_rate,
                    approaching: t.approaching,
                }
            })
            .collect()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get_track(&self, id: u64) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Drop every track. Ids already handed out are not recycled.
    pub fn reset(&mut self) {
        self.tracks.clear();
    }
}

fn sanitize_dimension(v: f32) -> f32 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        1.0
    }
}

/// Convert a measured frame interval to seconds with the tracker's floor.
pub fn dt_secs(elapsed: Duration) -> f32 {
    elapsed.as_secs_f32().max(MIN_DT_SECS)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::edge_trigger::{EdgeKey, EdgeTrigger};

    const FRAME: f32 = 100.0;

    fn det(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new([x1, y1, x2, y2], Some(2))
    }

    /// Square detection centred in a 100×100 frame with the given normalized area.
    fn centred(area: f32) -> Detection {
        let half = (area * FRAME * FRAME).sqrt() / 2.0;
        det(50.0 - half, 50.0 - half, 50.0 + half, 50.0 + half)
    }

    fn at(t0: Instant, secs: f32) -> Instant {
        t0 + Duration::from_secs_f32(secs)
    }

    #[test]
    fn test_new_tracks_for_unmatched_detections() {
        let mut tracker = SortTracker::new(TrackerConfig::default());
        let t0 = Instant::now();
        let out = tracker.step_at(
            &[det(0.0, 0.0, 10.0, 10.0), det(50.0, 50.0, 70.0, 70.0)],
            FRAME,
            FRAME,
            0.1,
            t0,
        );
        assert_eq!(out.len(), 2);
        assert!(out[0].id < out[1].id);
        assert!(out.iter().all(|r| !r.approaching));
        assert!((out[0].area - 0.01).abs() < 1e-4);
    }

    #[test]
    fn test_identity_kept_across_frames() {
        let mut tracker = SortTracker::new(TrackerConfig::default());
        let t0 = Instant::now();
        let first = tracker.step_at(&[det(10.0, 10.0, 30.0, 30.0)], FRAME, FRAME, 0.1, t0);
        let id = first[0].id;

        for k in 1..5 {
            let dx = k as f32;
            let out = tracker.step_at(
                &[det(10.0 + dx, 10.0, 30.0 + dx, 30.0)],
                FRAME,
                FRAME,
                0.1,
                at(t0, 0.1 * k as f32),
            );
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].id, id);
        }
        let track = tracker.get_track(id).unwrap();
        assert_eq!(track.hits, 5);
        assert_eq!(track.time_since_update, 0);
    }

    #[test]
    fn test_unmatched_track_deleted_after_max_age() {
        let config = TrackerConfig::default();
        let max_age = config.max_age;
        let mut tracker = SortTracker::new(config);
        let t0 = Instant::now();
        let id = tracker.step_at(&[det(10.0, 10.0, 30.0, 30.0)], FRAME, FRAME, 0.1, t0)[0].id;
        assert_eq!(tracker.len(), 1);

        for k in 1..=max_age {
            let out = tracker.step_at(&[], FRAME, FRAME, 0.1, at(t0, 0.1 * k as f32));
            assert_eq!(out.len(), 1, "track should still be reported on step {}", k);
            assert_eq!(tracker.tracks()[0].time_since_update, k);
        }

        let out = tracker.step_at(&[], FRAME, FRAME, 0.1, at(t0, 0.1 * (max_age + 1) as f32));
        assert!(out.is_empty());
        assert_eq!(tracker.len(), 0);

        // Same box again gets a fresh identity
        let out = tracker.step_at(
            &[det(10.0, 10.0, 30.0, 30.0)],
            FRAME,
            FRAME,
            0.1,
            at(t0, 0.1 * (max_age + 2) as f32),
        );
        assert_eq!(out.len(), 1);
        assert!(out[0].id > id);
    }

    #[test]
    fn test_stale_track_recovers_on_match() {
        let mut tracker = SortTracker::new(TrackerConfig::default());
        let t0 = Instant::now();
        let id = tracker.step_at(&[det(10.0, 10.0, 30.0, 30.0)], FRAME, FRAME, 0.1, t0)[0].id;
        for k in 1..=3 {
            tracker.step_at(&[], FRAME, FRAME, 0.1, at(t0, 0.1 * k as f32));
        }
        assert_eq!(tracker.tracks()[0].time_since_update, 3);

        let out = tracker.step_at(&[det(10.0, 10.0, 30.0, 30.0)], FRAME, FRAME, 0.1, at(t0, 0.4));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, id);
        assert_eq!(tracker.tracks()[0].time_since_update, 0);
    }

    #[test]
    fn test_two_tracks_not_cross_matched() {
        let mut tracker = SortTracker::new(TrackerConfig::default());
        let t0 = Instant::now();
        let out = tracker.step_at(
            &[det(100.0, 100.0, 200.0, 200.0), det(185.0, 100.0, 285.0, 200.0)],
            400.0,
            300.0,
            0.1,
            t0,
        );
        let (id_a, id_b) = (out[0].id, out[1].id);

        // Detections arrive in swapped order, each slightly shifted
        let out = tracker.step_at(
            &[det(187.0, 101.0, 287.0, 201.0), det(100.0, 100.0, 200.0, 201.0)],
            400.0,
            300.0,
            0.1,
            at(t0, 0.1),
        );
        assert_eq!(out.len(), 2);
        let a = out.iter().find(|r| r.id == id_a).unwrap();
        let b = out.iter().find(|r| r.id == id_b).unwrap();
        assert!(a.bbox[0] < 150.0);
        assert!(b.bbox[0] > 150.0);
    }

    #[test]
    fn test_non_finite_detection_rejected() {
        let mut tracker = SortTracker::new(TrackerConfig::default());
        let out = tracker.step(
            &[
                det(f32::NAN, 0.0, 10.0, 10.0),
                det(0.0, 0.0, f32::INFINITY, 10.0),
                det(0.0, 0.0, 10.0, 10.0),
            ],
            FRAME,
            FRAME,
            0.1,
        );
        assert_eq!(out.len(), 1);
        assert!(out[0].bbox.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_huge_finite_box_never_reaches_filter() {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let mut tracker = SortTracker::new(TrackerConfig::default());
            let t0 = Instant::now();
            let huge = det(0.0, 0.0, 1e20, 1e20);
            let first = tracker.step_at(&[huge.clone()], FRAME, FRAME, 0.1, t0);
            let second = tracker.step_at(
                &[huge, det(10.0, 10.0, 30.0, 30.0)],
                FRAME,
                FRAME,
                0.1,
                at(t0, 0.1),
            );
            tx.send((first, second)).unwrap();
        });

        let (first, second) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("step_at returned");
        assert!(first.is_empty());
        assert_eq!(second.len(), 1);
        for r in &second {
            assert!(r.bbox.iter().all(|v| v.is_finite()));
            assert!((0.0..=1.0).contains(&r.area));
        }
    }

    #[test]
    fn test_bad_frame_and_dt_are_sanitized() {
        let mut tracker = SortTracker::new(TrackerConfig::default());
        let out = tracker.step(&[det(0.0, 0.0, 10.0, 10.0)], 0.0, f32::NAN, -1.0);
        assert_eq!(out.len(), 1);
        assert!(out[0].area.is_finite());
        assert!(out[0].area <= 1.0);
        assert!(out[0].area_rate.is_finite());
    }

    #[test]
    fn test_approach_scenario_fires_edge_once() {
        // Unsmoothed trend: 0.01 at t=0 grows to 0.03 at t=1 → 0.02/s
        let config = TrackerConfig {
            ema_alpha: 1.0,
            ..TrackerConfig::default()
        };
        let mut tracker = SortTracker::new(config);
        let mut edges = EdgeTrigger::new();
        let mut fired = 0;
        let t0 = Instant::now();

        let out = tracker.step_at(&[centred(0.01)], FRAME, FRAME, 1.0, t0);
        assert_eq!(out.len(), 1);
        assert!(!out[0].approaching);
        edges.update(EdgeKey::new("cam0", out[0].id), out[0].approaching, || fired += 1);

        let out = tracker.step_at(&[centred(0.03)], FRAME, FRAME, 1.0, at(t0, 1.0));
        assert_eq!(out.len(), 1);
        assert!((out[0].area_rate - 0.02).abs() < 1e-3, "rate {}", out[0].area_rate);
        assert!(out[0].approaching);
        edges.update(EdgeKey::new("cam0", out[0].id), out[0].approaching, || fired += 1);

        assert_eq!(fired, 1);
    }

    #[test]
    fn test_approach_with_default_smoothing() {
        let mut tracker = SortTracker::new(TrackerConfig::default());
        let t0 = Instant::now();
        let dt = 1.0 / 30.0;

        let out = tracker.step_at(&[centred(0.010)], FRAME, FRAME, dt, t0);
        assert!(!out[0].approaching);
        let out = tracker.step_at(&[centred(0.013)], FRAME, FRAME, dt, at(t0, dt));
        assert_eq!(out.len(), 1);
        assert!(out[0].approaching, "rate {}", out[0].area_rate);
    }

    #[test]
    fn test_static_object_not_approaching() {
        let mut tracker = SortTracker::new(TrackerConfig::default());
        let t0 = Instant::now();
        for k in 0..10 {
            let out = tracker.step_at(&[centred(0.02)], FRAME, FRAME, 0.1, at(t0, 0.1 * k as f32));
            assert_eq!(out.len(), 1);
            assert!(!out[0].approaching, "step {} rate {}", k, out[0].area_rate);
        }
    }

    #[test]
    fn test_ids_unique_across_concurrent_trackers() {
        let handles: Vec<_> = (0..3)
            .map(|s| {
                std::thread::spawn(move || {
                    let mut tracker = SortTracker::new(TrackerConfig::default());
                    let mut created = Vec::new();
                    let t0 = Instant::now();
                    for k in 0..40 {
                        // A new far-away box every step forces a new track,
                        // which is always reported last
                        let x = (k * 20) as f32;
                        let y = (s * 20) as f32;
                        let out = tracker.step_at(
                            &[det(x, y, x + 10.0, y + 10.0)],
                            2000.0,
                            2000.0,
                            0.05,
                            at(t0, 0.05 * k as f32),
                        );
                        created.push(out.last().unwrap().id);
                    }
                    assert!(created.windows(2).all(|w| w[0] < w[1]));
                    assert_eq!(tracker.len(), 11);
                    created
                })
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let n = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), n);
    }

    #[test]
    fn test_reset_clears_tracks() {
        let mut tracker = SortTracker::new(TrackerConfig::default());
        tracker.step(&[det(0.0, 0.0, 10.0, 10.0)], FRAME, FRAME, 0.1);
        assert!(!tracker.is_empty());
        tracker.reset();
        assert!(tracker.is_empty());
    }
}
