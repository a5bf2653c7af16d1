// src/pipeline/source.rs
//
// Frame sources. A replay file is JSON lines, one frame per line:
//   {"width":320,"height":240,"detections":[{"bbox":[x1,y1,x2,y2],"class_id":2,"confidence":0.8}]}
// The raw line becomes the frame payload, which `ReplayDetector` decodes.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::detector::RecordedFrame;
use crate::types::Frame;

pub trait FrameSource: Send {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

pub struct ReplaySource {
    stream: String,
    path: String,
    lines: Lines<BufReader<File>>,
    line_no: usize,
    index: u64,
}

impl ReplaySource {
    pub fn open(stream: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("[{}] cannot open replay {}", stream, path.display()))?;
        info!("[{}] Replaying {}", stream, path.display());
        Ok(Self {
            stream: stream.to_string(),
            path: path.display().to_string(),
            lines: BufReader::new(file).lines(),
            line_no: 0,
            index: 0,
        })
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        for line in self.lines.by_ref() {
            self.line_no += 1;
            let line = line.with_context(|| format!("{}:{}", self.path, self.line_no))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let header: RecordedFrame = serde_json::from_str(trimmed)
                .with_context(|| format!("{}:{}: bad frame record", self.path, self.line_no))?;

            let frame = Frame {
                stream: self.stream.clone(),
                index: self.index,
                width: header.width,
                height: header.height,
                data: trimmed.as_bytes().to_vec(),
            };
            self.index += 1;
            return Ok(Some(frame));
        }

        debug!("[{}] replay exhausted after {} frames", self.stream, self.index);
        Ok(None)
    }
}

/// In-memory source, mostly for tests.
#[derive(Debug, Default)]
pub struct VecSource {
    frames: VecDeque<Frame>,
}

impl VecSource {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

impl FrameSource for VecSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}
