// src/pipeline/mod.rs

pub mod actuator;
pub mod detector;
pub mod edge_trigger;
pub mod metrics;
pub mod record_sink;
pub mod source;
pub mod stream_worker;
pub mod supervisor;

pub use actuator::{Actuator, CooldownActuator, LogActuator, SharedActuator};
pub use detector::{ClassFilter, Detector, ReplayDetector, SharedDetector};
pub use edge_trigger::{EdgeKey, EdgeTrigger};
pub use metrics::{MetricsSummary, StreamMetrics};
pub use record_sink::RecordSink;
pub use source::{FrameSource, ReplaySource, VecSource};
pub use stream_worker::{Pacing, StreamWorker};
pub use supervisor::{run_streams, WorkerOutcome};
