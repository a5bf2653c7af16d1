// src/pipeline/stream_worker.rs
//
// One worker per camera stream:
//   source → (shared detector) → class filter → tracker → edge trigger → actuator
//
// The worker owns its tracker and edge trigger. The detector and actuator
// are shared; the detector lock is held only while `detect` runs.

use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::actuator::SharedActuator;
use super::detector::{detect_serialized, ClassFilter, SharedDetector};
use super::edge_trigger::{EdgeKey, EdgeTrigger};
use super::metrics::{MetricsSummary, StreamMetrics};
use super::record_sink::RecordSink;
use super::source::FrameSource;
use crate::tracking::{tracker::dt_secs, Detection, SortTracker, TrackRecord, TrackerConfig};
use crate::types::{Frame, MAX_FPS, MIN_FPS};

/// How frames are clocked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Emit frames at `fps` and measure dt from the wall clock.
    Realtime { fps: f64 },
    /// Emit frames as fast as the source allows on a synthetic clock of
    /// `1 / fps` per frame.
    Replay { fps: f64 },
}

impl Pacing {
    fn frame_interval(&self) -> Duration {
        let fps = match *self {
            Pacing::Realtime { fps } | Pacing::Replay { fps } => fps,
        };
        let fps = if fps.is_finite() {
            fps.clamp(MIN_FPS, MAX_FPS)
        } else {
            MAX_FPS
        };
        Duration::from_secs_f64(1.0 / fps)
    }
}

pub struct StreamWorker {
    name: String,
    source: Box<dyn FrameSource>,
    detector: SharedDetector,
    filter: ClassFilter,
    actuator: SharedActuator,
    tracker: SortTracker,
    trigger: EdgeTrigger,
    sink: Option<RecordSink>,
    metrics: StreamMetrics,
    infer_every: u64,
    pacing: Pacing,
    max_seen_id: u64,
}

impl StreamWorker {
    pub fn new(
        name: impl Into<String>,
        source: Box<dyn FrameSource>,
        detector: SharedDetector,
        filter: ClassFilter,
        actuator: SharedActuator,
        tracker_config: TrackerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            detector,
            filter,
            actuator,
            tracker: SortTracker::new(tracker_config),
            trigger: EdgeTrigger::new(),
            sink: None,
            metrics: StreamMetrics::new(),
            infer_every: 1,
            pacing: Pacing::Replay { fps: 12.0 },
            max_seen_id: 0,
        }
    }

    pub fn with_infer_every(mut self, n: u64) -> Self {
        self.infer_every = n.max(1);
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_sink(mut self, sink: RecordSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Live counters, shared with whoever holds the clone.
    pub fn metrics(&self) -> StreamMetrics {
        self.metrics.clone()
    }

    /// Run until the source is exhausted or `stop` flips to `true`.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Result<MetricsSummary> {
        let interval = self.pacing.frame_interval();
        let realtime = matches!(self.pacing, Pacing::Realtime { .. });
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let start = Instant::now();
        let mut last_step: Option<Instant> = None;

        info!("[{}] ▶ worker started ({:?})", self.name, self.pacing);

        loop {
            if *stop.borrow() {
                break;
            }

            if realtime {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                        continue;
                    }
                }
            } else {
                tokio::task::yield_now().await;
            }

            let Some(frame) = self.source.next_frame()? else {
                info!("[{}] source exhausted", self.name);
                break;
            };

            let now = if realtime {
                Instant::now()
            } else {
                start + interval.mul_f64(frame.index as f64)
            };
            let dt = match last_step {
                Some(prev) => dt_secs(now.saturating_duration_since(prev)),
                None => interval.as_secs_f32(),
            };
            last_step = Some(now);

            self.process_frame(&frame, dt, now).await?;
        }

        if let Some(sink) = self.sink.as_mut() {
            sink.flush()?;
            info!(
                "[{}] wrote {} track records to {}",
                self.name,
                sink.written(),
                sink.path().display()
            );
        }

        let summary = self.metrics.summary();
        info!(
            "[{}] ■ worker stopped: {} frames, {} tracks, {} approach events, {} pulses",
            self.name,
            summary.total_frames,
            summary.tracks_created,
            summary.approach_events,
            summary.pulses
        );
        Ok(summary)
    }

    async fn process_frame(&mut self, frame: &Frame, dt: f32, now: Instant) -> Result<()> {
        self.metrics.inc(&self.metrics.total_frames);

        let inferred = frame.index % self.infer_every == 0;
        let detections = if inferred {
            self.detect(frame).await
        } else {
            Vec::new()
        };

        let records = self.tracker.step_at(
            &detections,
            frame.width as f32,
            frame.height as f32,
            dt,
            now,
        );

        let approaching = self.dispatch(&records);

        let live: Vec<u64> = records.iter().map(|r| r.id).collect();
        self.trigger.retain_tracks(&self.name, &live);

        if let Some(sink) = self.sink.as_mut() {
            sink.write_frame(&self.name, frame.index, &records, now)?;
        }

        if inferred {
            info!(
                "[{}] frame {} det={} tracks={} approaching={}",
                self.name,
                frame.index,
                detections.len(),
                records.len(),
                approaching
            );
        }
        Ok(())
    }

    async fn detect(&mut self, frame: &Frame) -> Vec<Detection> {
        let t0 = Instant::now();
        let raw = detect_serialized(&self.detector, frame).await;
        self.metrics.set_timing(
            &self.metrics.inference_time_us,
            t0.elapsed().as_micros() as u64,
        );
        self.metrics.inc(&self.metrics.inferred_frames);

        match raw {
            Ok(dets) => {
                let kept = self.filter.apply(dets);
                self.metrics
                    .add(&self.metrics.detections, kept.len() as u64);
                kept
            }
            Err(e) => {
                self.metrics.inc(&self.metrics.detector_errors);
                warn!("[{}] detector failed on frame {}: {:#}", self.name, frame.index, e);
                Vec::new()
            }
        }
    }

    /// Feed every record through the edge trigger; returns how many tracks
    /// are approaching this frame.
    fn dispatch(&mut self, records: &[TrackRecord]) -> usize {
        let mut approaching = 0;

        for rec in records {
            if rec.id > self.max_seen_id {
                self.max_seen_id = rec.id;
                self.metrics.inc(&self.metrics.tracks_created);
            }
            if rec.approaching {
                approaching += 1;
            }

            let actuator = &self.actuator;
            let mut pulse = None;
            let fired = self
                .trigger
                .update(EdgeKey::new(self.name.as_str(), rec.id), rec.approaching, || {
                    pulse = Some(actuator.pulse());
                });

            if rec.approaching && !fired {
                info!(
                    "[{}] APPROACH T{} {} area={:.4} rate={:.4}/s",
                    self.name,
                    rec.id,
                    self.filter.name_of(rec.class_id),
                    rec.area,
                    rec.area_rate
                );
            }
            if fired {
                self.metrics.inc(&self.metrics.approach_events);
                warn!(
                    "[{}] 🚨 APPROACH T{} {} area={:.4} rate={:.4}/s",
                    self.name,
                    rec.id,
                    self.filter.name_of(rec.class_id),
                    rec.area,
                    rec.area_rate
                );
                match pulse {
                    Some(Ok(true)) => self.metrics.inc(&self.metrics.pulses),
                    Some(Ok(false)) => debug!("[{}] pulse for T{} in cooldown", self.name, rec.id),
                    Some(Err(e)) => warn!("[{}] actuator error: {:#}", self.name, e),
                    None => {}
                }
            }
        }

        approaching
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::actuator::{CooldownActuator, LogActuator};
    use crate::pipeline::detector::{shared, ReplayDetector, COCO_CLASSES};
    use crate::pipeline::source::VecSource;
    use crate::types::DetectorConfig;
    use std::sync::Arc;

    fn frame(stream: &str, index: u64, boxes: &[([f32; 4], u32)]) -> Frame {
        let dets: Vec<serde_json::Value> = boxes
            .iter()
            .map(|(b, c)| serde_json::json!({ "bbox": b, "class_id": c, "confidence": 0.9 }))
            .collect();
        let body = serde_json::json!({ "width": 320, "height": 240, "detections": dets });
        Frame {
            stream: stream.to_string(),
            index,
            width: 320,
            height: 240,
            data: serde_json::to_vec(&body).unwrap(),
        }
    }

    fn centered(side: f32) -> [f32; 4] {
        [160.0 - side / 2.0, 120.0 - side / 2.0, 160.0 + side / 2.0, 120.0 + side / 2.0]
    }

    fn worker(name: &str, frames: Vec<Frame>) -> StreamWorker {
        let names: Vec<String> = COCO_CLASSES.iter().map(|s| s.to_string()).collect();
        let filter = ClassFilter::resolve(&DetectorConfig::default(), &names);
        let actuator: SharedActuator = Arc::new(CooldownActuator::new(LogActuator::default(), 0.0));
        StreamWorker::new(
            name,
            Box::new(VecSource::new(frames)),
            shared(Box::new(ReplayDetector::coco())),
            filter,
            actuator,
            TrackerConfig::default(),
        )
        .with_pacing(Pacing::Replay { fps: 10.0 })
    }

    #[tokio::test]
    async fn test_growing_box_pulses_once() {
        let frames: Vec<Frame> = (0..12)
            .map(|i| frame("cam0", i, &[(centered(40.0 + 6.0 * i as f32), 2)]))
            .collect();
        let (_tx, rx) = watch::channel(false);

        let w = worker("cam0", frames);
        let live = w.metrics();
        let summary = w.run(rx).await.unwrap();
        assert_eq!(summary.total_frames, 12);
        assert_eq!(live.summary().total_frames, 12);
        assert_eq!(live.summary().pulses, 1);
        assert_eq!(summary.tracks_created, 1);
        assert_eq!(summary.approach_events, 1);
        assert_eq!(summary.pulses, 1);
    }

    #[tokio::test]
    async fn test_static_box_never_approaches() {
        let frames: Vec<Frame> = (0..10)
            .map(|i| frame("cam1", i, &[(centered(50.0), 0)]))
            .collect();
        let (_tx, rx) = watch::channel(false);

        let summary = worker("cam1", frames).run(rx).await.unwrap();
        assert_eq!(summary.tracks_created, 1);
        assert_eq!(summary.approach_events, 0);
    }

    #[tokio::test]
    async fn test_disallowed_class_is_ignored() {
        let frames: Vec<Frame> = (0..5)
            .map(|i| frame("cam0", i, &[(centered(40.0 + 10.0 * i as f32), 7)]))
            .collect();
        let (_tx, rx) = watch::channel(false);

        let summary = worker("cam0", frames).run(rx).await.unwrap();
        assert_eq!(summary.detections, 0);
        assert_eq!(summary.tracks_created, 0);
    }

    #[tokio::test]
    async fn test_infer_every_skips_detection() {
        let frames: Vec<Frame> = (0..6)
            .map(|i| frame("cam0", i, &[(centered(50.0), 2)]))
            .collect();
        let (_tx, rx) = watch::channel(false);

        let summary = worker("cam0", frames)
            .with_infer_every(3)
            .run(rx)
            .await
            .unwrap();
        assert_eq!(summary.total_frames, 6);
        assert_eq!(summary.inferred_frames, 2);
        assert_eq!(summary.tracks_created, 1);
    }

    #[test]
    fn test_frame_interval_is_bounded() {
        let slow = Pacing::Realtime { fps: 1e-30 }.frame_interval();
        assert_eq!(slow, Duration::from_secs(10));
        let fast = Pacing::Replay { fps: f64::INFINITY }.frame_interval();
        assert_eq!(fast, Duration::from_millis(1));
        assert_eq!(Pacing::Replay { fps: 10.0 }.frame_interval(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_replay_clock_handles_large_frame_index() {
        let base = u32::MAX as u64 + 10;
        let frames: Vec<Frame> = (0..3)
            .map(|i| frame("cam0", base + i, &[(centered(50.0), 2)]))
            .collect();
        let (_tx, rx) = watch::channel(false);

        let summary = worker("cam0", frames).run(rx).await.unwrap();
        assert_eq!(summary.total_frames, 3);
        assert_eq!(summary.tracks_created, 1);
        assert_eq!(summary.approach_events, 0);
    }

    #[tokio::test]
    async fn test_stop_signal_halts_worker() {
        let frames: Vec<Frame> = (0..100)
            .map(|i| frame("cam0", i, &[(centered(50.0), 2)]))
            .collect();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let summary = worker("cam0", frames).run(rx).await.unwrap();
        assert_eq!(summary.total_frames, 0);
    }

    #[tokio::test]
    async fn test_two_streams_share_detector_and_actuator() {
        let detector = shared(Box::new(ReplayDetector::coco()));
        let names: Vec<String> = COCO_CLASSES.iter().map(|s| s.to_string()).collect();
        let filter = ClassFilter::resolve(&DetectorConfig::default(), &names);
        let actuator: SharedActuator = Arc::new(CooldownActuator::new(LogActuator::default(), 0.0));
        let (_tx, rx) = watch::channel(false);

        let mut handles = Vec::new();
        for name in ["cam0", "cam1"] {
            let frames: Vec<Frame> = (0..12)
                .map(|i| frame(name, i, &[(centered(40.0 + 6.0 * i as f32), 2)]))
                .collect();
            let w = StreamWorker::new(
                name,
                Box::new(VecSource::new(frames)),
                detector.clone(),
                filter.clone(),
                actuator.clone(),
                TrackerConfig::default(),
            )
            .with_pacing(Pacing::Replay { fps: 10.0 });
            handles.push(tokio::spawn(w.run(rx.clone())));
        }

        let mut events = 0;
        for h in handles {
            let s = h.await.unwrap().unwrap();
            assert_eq!(s.tracks_created, 1);
            events += s.approach_events;
        }
        assert_eq!(events, 2);
    }
}
