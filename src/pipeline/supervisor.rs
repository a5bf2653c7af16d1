// src/pipeline/supervisor.rs
//
// Runs every stream worker to completion. The first worker to end, or the
// shutdown future resolving, stops all of them.

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::info;

use super::metrics::{MetricsSummary, StreamMetrics};
use super::stream_worker::StreamWorker;

pub type WorkerOutcome = (String, Result<MetricsSummary>);

pub async fn run_streams(
    workers: Vec<(String, StreamWorker)>,
    shutdown: impl Future<Output = ()>,
    progress_every: Duration,
) -> Vec<WorkerOutcome> {
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut set = JoinSet::new();
    let mut live: Vec<(String, StreamMetrics)> = Vec::with_capacity(workers.len());

    for (name, worker) in workers {
        live.push((name.clone(), worker.metrics()));
        let rx = stop_rx.clone();
        set.spawn(async move { (name, worker.run(rx).await) });
    }
    info!("Started {} stream worker(s)", live.len());

    let mut outcomes = Vec::with_capacity(live.len());
    let mut progress = tokio::time::interval(progress_every.max(Duration::from_millis(10)));
    progress.tick().await;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            done = set.join_next() => {
                if let Some(done) = done {
                    info!("A stream ended, stopping remaining workers");
                    outcomes.push(flatten(done));
                }
                break;
            }
            _ = &mut shutdown => {
                info!("Shutdown requested, stopping workers");
                break;
            }
            _ = progress.tick() => {
                for (name, m) in &live {
                    let s = m.summary();
                    info!(
                        "[{}] progress: {} frames ({:.1} FPS), {} tracks, {} approach events",
                        name, s.total_frames, s.fps, s.tracks_created, s.approach_events
                    );
                }
            }
        }
    }

    let _ = stop_tx.send(true);
    while let Some(done) = set.join_next().await {
        outcomes.push(flatten(done));
    }
    outcomes
}

fn flatten(
    joined: std::result::Result<WorkerOutcome, tokio::task::JoinError>,
) -> WorkerOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(e) => ("?".to_string(), Err(anyhow!("worker task panicked: {}", e))),
    }
}
