//! Live person detection: captures frames, runs the detector, and serves the
//! annotated stream plus the latest detections over HTTP.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `engine`: One resize → infer → filter → annotate cycle.
//! - `pipeline`: Lifecycle of the single producer thread.
//! - `relay`: Drop-oldest hand-off of encoded frames to stream consumers.
//! - `snapshot`: Latest detection snapshot shared with the JSON endpoint.
//! - `server`: Actix Web endpoints.
//! - `runtime`: Process wiring and shutdown ordering.
//! - `telemetry`: Tracing and Prometheus setup.
//! - `data`: Shared structs passed between stages.
//! - `annotation`, `encoding`: Drawing primitives and JPEG output.

/// Re-export settings so callers can configure runs without reaching into
/// submodules.
pub use config::{VisionCliArgs, VisionConfig};
pub use data::{
    Detection, DetectionSnapshot, DetectionsResponse, EncodedFrame, ExecutionMode,
    PERSON_CLASS_ID, PipelineState,
};
pub use engine::{CycleOutput, DetectorEngine};
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineOptions, PipelineStatus, SourceOpener, StatusReport};
pub use relay::{ConsumeError, FrameRelay, RELAY_CAPACITY, RelayConsumer};
/// Launch the vision runtime with a ready-made configuration.
pub use runtime::{VisionRuntime, run};
pub use server::{
    PreviewServer, ServerState, configure, cors_headers, multipart_part, spawn_preview_server,
};
pub use snapshot::SnapshotPublisher;

mod annotation;
mod config;
mod data;
mod encoding;
mod engine;
mod error;
mod pipeline;
mod relay;
mod runtime;
mod server;
mod snapshot;
pub mod telemetry;
