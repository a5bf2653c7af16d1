// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use approach_tracker::pipeline::{
    detector, run_streams, ClassFilter, CooldownActuator, Detector, LogActuator, Pacing,
    RecordSink, ReplayDetector, ReplaySource, SharedActuator, StreamWorker,
};
use approach_tracker::types::Config;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const PROGRESS_INTERVAL_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🎯 Approach tracker starting");
    info!("✓ Configuration loaded from {}", config_path);
    info!(
        "Tracker: iou_threshold={:.2}, max_age={}, ema_alpha={:.2}, approach_rate={:.4}/s",
        config.tracker.iou_threshold,
        config.tracker.max_age,
        config.tracker.ema_alpha,
        config.tracker.approach_rate_threshold
    );

    let replay = ReplayDetector::coco();
    let class_filter = ClassFilter::resolve(&config.detector, replay.class_names());
    let shared_detector = detector::shared(Box::new(replay));
    info!("✓ Detector ready");

    let actuator: SharedActuator = Arc::new(CooldownActuator::new(
        LogActuator::new(&config.actuator),
        config.actuator.cooldown_secs,
    ));
    info!(
        "✓ Actuator ready (cooldown {:.2}s)",
        config.actuator.cooldown_secs
    );

    let mut workers = Vec::with_capacity(config.streams.len());
    for stream in &config.streams {
        let source = ReplaySource::open(&stream.name, &stream.replay_path)?;
        let mut worker = StreamWorker::new(
            stream.name.as_str(),
            Box::new(source),
            shared_detector.clone(),
            class_filter.clone(),
            actuator.clone(),
            config.tracker.clone(),
        )
        .with_infer_every(config.detector.infer_every)
        .with_pacing(Pacing::Realtime { fps: stream.fps });

        if let Some(dir) = &config.output.records_dir {
            worker = worker.with_sink(RecordSink::create(
                dir,
                &stream.name,
                config.output.save_interval_secs,
            )?);
        }
        workers.push((stream.name.clone(), worker));
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    let finished = run_streams(
        workers,
        shutdown,
        Duration::from_secs(PROGRESS_INTERVAL_SECS),
    )
    .await;

    info!("\n========================================");
    let mut failures = 0;
    for done in finished {
        match done {
            (name, Ok(s)) => {
                info!("[{}] frames: {} ({:.1} FPS)", name, s.total_frames, s.fps);
                info!("[{}]   detections: {}", name, s.detections);
                info!("[{}]   tracks created: {}", name, s.tracks_created);
                info!("[{}]   🚨 approach events: {}", name, s.approach_events);
                info!("[{}]   📳 pulses: {}", name, s.pulses);
                if s.detector_errors > 0 {
                    warn!("[{}]   detector errors: {}", name, s.detector_errors);
                }
            }
            (name, Err(e)) => {
                error!("[{}] worker failed: {:#}", name, e);
                failures += 1;
            }
        }
    }
    info!("========================================");

    if failures > 0 {
        bail!("{} stream worker(s) failed", failures);
    }
    Ok(())
}
