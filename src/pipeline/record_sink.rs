// src/pipeline/record_sink.rs
//
// Optional JSON-lines log of reported tracks, one file per stream. Frames
// closer than the save interval to the last persisted frame are skipped.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::tracking::TrackRecord;

#[derive(Debug, Serialize)]
struct RecordLine<'a> {
    timestamp: String,
    stream: &'a str,
    frame: u64,
    #[serde(flatten)]
    track: &'a TrackRecord,
}

pub struct RecordSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
    interval: Duration,
    last_saved: Option<Instant>,
}

impl RecordSink {
    pub fn create(dir: impl AsRef<Path>, stream: &str, save_interval_secs: f64) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create records dir {}", dir.display()))?;
        let path = dir.join(format!("{}_tracks.jsonl", stream));
        let file =
            File::create(&path).with_context(|| format!("cannot create {}", path.display()))?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: 0,
            interval: Duration::try_from_secs_f64(save_interval_secs.max(0.0))
                .unwrap_or(Duration::MAX),
            last_saved: None,
        })
    }

    /// Persist `records` for `frame` unless the previous save was less than
    /// the save interval before `now`. Returns whether the frame was written.
    pub fn write_frame(
        &mut self,
        stream: &str,
        frame: u64,
        records: &[TrackRecord],
        now: Instant,
    ) -> Result<bool> {
        if let Some(prev) = self.last_saved {
            if now.saturating_duration_since(prev) < self.interval {
                return Ok(false);
            }
        }
        self.last_saved = Some(now);

        let timestamp = Utc::now().to_rfc3339();
        for track in records {
            let line = RecordLine {
                timestamp: timestamp.clone(),
                stream,
                frame,
                track,
            };
            serde_json::to_writer(&mut self.writer, &line)?;
            self.writer.write_all(b"\n")?;
            self.written += 1;
        }
        Ok(true)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}
