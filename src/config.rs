// src/config.rs

use crate::types::{Config, StreamConfig, MAX_COOLDOWN_SECS, MAX_FPS, MIN_FPS};
use anyhow::{ensure, Context, Result};
use std::collections::HashSet;
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        let config = Self::from_yaml(&contents).with_context(|| format!("Invalid config {}", path))?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(contents)?;
        if config.streams.is_empty() {
            config.streams = default_streams();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.tracker;
        ensure!(
            (0.0..=1.0).contains(&t.iou_threshold),
            "tracker.iou_threshold must be in [0, 1], got {}",
            t.iou_threshold
        );
        ensure!(
            t.ema_alpha > 0.0 && t.ema_alpha <= 1.0,
            "tracker.ema_alpha must be in (0, 1], got {}",
            t.ema_alpha
        );
        ensure!(
            t.approach_rate_threshold.is_finite(),
            "tracker.approach_rate_threshold must be finite"
        );

        let d = &self.detector;
        ensure!(d.infer_every >= 1, "detector.infer_every must be >= 1");
        ensure!(
            (0.0..=1.0).contains(&d.confidence_threshold),
            "detector.confidence_threshold must be in [0, 1], got {}",
            d.confidence_threshold
        );

        ensure!(
            (0.0..=MAX_COOLDOWN_SECS).contains(&self.actuator.cooldown_secs),
            "actuator.cooldown_secs must be in [0, {}], got {}",
            MAX_COOLDOWN_SECS,
            self.actuator.cooldown_secs
        );
        ensure!(
            (0.0..=MAX_COOLDOWN_SECS).contains(&self.output.save_interval_secs),
            "output.save_interval_secs must be in [0, {}], got {}",
            MAX_COOLDOWN_SECS,
            self.output.save_interval_secs
        );
        ensure!(
            self.actuator.duty_percent <= 100,
            "actuator.duty_percent must be <= 100"
        );

        ensure!(!self.streams.is_empty(), "at least one stream is required");
        let mut names = HashSet::new();
        for s in &self.streams {
            ensure!(!s.name.is_empty(), "stream name must not be empty");
            ensure!(names.insert(s.name.as_str()), "duplicate stream name {}", s.name);
            ensure!(
                (MIN_FPS..=MAX_FPS).contains(&s.fps),
                "stream {}: fps must be in [{}, {}], got {}",
                s.name,
                MIN_FPS,
                MAX_FPS,
                s.fps
            );
        }
        Ok(())
    }
}

fn default_streams() -> Vec<StreamConfig> {
    ["cam0", "cam1"]
        .iter()
        .map(|name| StreamConfig {
            name: name.to_string(),
            replay_path: format!("demos/{}.jsonl", name),
            fps: 12.0,
        })
        .collect()
}
