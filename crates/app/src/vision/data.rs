use std::fmt;

use actix_web::web::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Class id the detector reports on; everything else is discarded.
pub const PERSON_CLASS_ID: i64 = 0;

/// Accepted detection in source-frame pixel coordinates.
///
/// Only `bbox`, `confidence` and `timestamp` are part of the JSON contract.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    #[serde(skip)]
    pub class_id: i64,
    #[serde(skip)]
    pub label: String,
    /// `[x0, y0, x1, y1]`
    pub bbox: [i32; 4],
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

/// Result of one inference cycle, replaced as a whole on every publish.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionSnapshot {
    pub detections: Vec<Detection>,
    pub fps: f32,
    pub inference_ms: f32,
    pub frame_number: u64,
}

/// JSON body served by `/detections`.
#[derive(Serialize)]
pub struct DetectionsResponse<'a> {
    pub detections: &'a [Detection],
    pub fps: f32,
}

impl<'a> From<&'a DetectionSnapshot> for DetectionsResponse<'a> {
    fn from(snapshot: &'a DetectionSnapshot) -> Self {
        Self {
            detections: &snapshot.detections,
            fps: snapshot.fps,
        }
    }
}

/// JPEG-encoded annotated frame moved through the frame relay.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    /// Production order, starting at 1.
    pub sequence: u64,
    pub jpeg: Bytes,
    pub timestamp_ms: i64,
}

impl EncodedFrame {
    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }
}

/// Where inference is executing, determined once at engine start-up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Tpu,
    #[default]
    Cpu,
}

impl ExecutionMode {
    pub fn label(self) -> &'static str {
        match self {
            ExecutionMode::Tpu => "TPU",
            ExecutionMode::Cpu => "CPU",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Pipeline lifecycle: `Stopped → Starting → Running → Stopping → Stopped`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}
