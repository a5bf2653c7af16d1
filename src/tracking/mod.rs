// src/tracking/mod.rs

pub mod assignment;
pub mod association;
pub mod geometry;
pub mod kalman;
pub mod track;
pub mod tracker;

pub use association::{associate, Association};
pub use geometry::BBox;
pub use kalman::KalmanBox;
pub use track::{next_track_id, AreaTrend, Detection, Track};
pub use tracker::{SortTracker, TrackRecord, TrackerConfig};
