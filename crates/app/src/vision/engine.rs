//! Detector engine: one acquisition → inference → annotation cycle per call.
//!
//! The engine owns the inference backend and is driven exclusively by the
//! producer thread. It builds the outputs of a cycle but never publishes
//! them; publication belongs to the pipeline loop.

use std::time::Instant;

use anyhow::anyhow;
use chrono::Utc;
use image::{RgbImage, imageops::FilterType};
use ml_core::{InferenceBackend, LabelTable};
use tracing::{debug, info, warn};
use video_ingest::Frame;

use crate::vision::{
    annotation::{Overlay, annotate_frame},
    data::{Detection, DetectionSnapshot, ExecutionMode, PERSON_CLASS_ID},
    error::PipelineError,
};

/// Outputs of one cycle: the annotated frame and the detections it shows.
pub struct CycleOutput {
    pub annotated: RgbImage,
    pub snapshot: DetectionSnapshot,
}

pub struct DetectorEngine {
    backend: Box<dyn InferenceBackend>,
    labels: LabelTable,
    threshold: f32,
    input_size: (u32, u32),
    mode: ExecutionMode,
    fps: f32,
    frame_number: u64,
}

impl DetectorEngine {
    /// Prepare an engine around a loaded backend.
    ///
    /// When acceleration is requested the backend must both report an active
    /// accelerator and survive a test inference on a blank input; otherwise
    /// the engine falls back to CPU mode instead of failing.
    pub fn initialize(
        mut backend: Box<dyn InferenceBackend>,
        labels: LabelTable,
        threshold: f32,
        request_acceleration: bool,
    ) -> Result<Self, PipelineError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PipelineError::Initialization(anyhow!(
                "detection threshold must be within [0, 1], got {threshold}"
            )));
        }

        let input_size = backend.input_size();
        if input_size.0 == 0 || input_size.1 == 0 {
            return Err(PipelineError::Initialization(anyhow!(
                "backend {} reports an empty input size {}x{}",
                backend.name(),
                input_size.0,
                input_size.1
            )));
        }

        let mode = if !request_acceleration {
            ExecutionMode::Cpu
        } else if !backend.is_accelerated() {
            warn!(
                "Acceleration requested but backend {} has no active accelerator delegate; running on CPU",
                backend.name()
            );
            ExecutionMode::Cpu
        } else {
            let probe = RgbImage::new(input_size.0, input_size.1);
            match backend.infer(&probe) {
                Ok(_) => {
                    info!("Test inference succeeded on accelerator");
                    ExecutionMode::Tpu
                }
                Err(err) => {
                    warn!("Test inference on accelerator failed ({err:#}); running on CPU");
                    ExecutionMode::Cpu
                }
            }
        };

        info!(
            "Detector ready: backend={} input={}x{} threshold={threshold:.2} mode={mode} labels={}",
            backend.name(),
            input_size.0,
            input_size.1,
            labels.len()
        );

        Ok(Self {
            backend,
            labels,
            threshold,
            input_size,
            mode,
            fps: 0.0,
            frame_number: 0,
        })
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// FPS of the most recently completed cycle.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Run inference on `frame` and build the annotated copy and snapshot.
    ///
    /// The FPS drawn on the frame and stored in the snapshot is the value
    /// recorded for the previous cycle.
    pub fn run_cycle(&mut self, frame: &Frame) -> Result<CycleOutput, PipelineError> {
        let (input_w, input_h) = self.input_size;
        let source = frame.image();
        let resized;
        let input = if source.dimensions() == self.input_size {
            source
        } else {
            resized = image::imageops::resize(source, input_w, input_h, FilterType::Triangle);
            &resized
        };

        let inference_start = Instant::now();
        let batch = self
            .backend
            .infer(input)
            .map_err(PipelineError::Inference)?;
        let inference_elapsed = inference_start.elapsed();
        let inference_ms = inference_elapsed.as_secs_f32() * 1000.0;
        metrics::histogram!("vision_inference_seconds").record(inference_elapsed.as_secs_f64());

        let frame_size = (frame.width(), frame.height());
        let timestamp = Utc::now();
        let detections: Vec<Detection> = batch
            .detections
            .iter()
            .filter(|det| accepts(det, self.threshold))
            .map(|det| Detection {
                class_id: det.class_id,
                label: self.labels.label_or_id(det.class_id),
                bbox: rescale_bbox(det.bbox, self.input_size, frame_size),
                confidence: det.score,
                timestamp,
            })
            .collect();

        self.frame_number = self.frame_number.wrapping_add(1);
        debug!(
            frame = self.frame_number,
            raw = batch.detections.len(),
            accepted = detections.len(),
            inference_ms,
            "inference cycle"
        );

        let annotated = annotate_frame(
            source,
            &detections,
            &Overlay {
                fps: self.fps,
                inference_ms,
                mode: self.mode,
            },
        );

        Ok(CycleOutput {
            annotated,
            snapshot: DetectionSnapshot {
                detections,
                fps: self.fps,
                inference_ms,
                frame_number: self.frame_number,
            },
        })
    }

    /// `1 / elapsed seconds`, or `None` when no time elapsed.
    pub fn compute_fps(cycle_start: Instant, cycle_end: Instant) -> Option<f32> {
        let elapsed = cycle_end.saturating_duration_since(cycle_start).as_secs_f32();
        if elapsed > 0.0 {
            Some(1.0 / elapsed)
        } else {
            None
        }
    }

    /// Store the FPS of a finished cycle, keeping the previous value when the
    /// cycle took no measurable time.
    pub fn record_cycle(&mut self, cycle_start: Instant, cycle_end: Instant) -> f32 {
        if let Some(fps) = Self::compute_fps(cycle_start, cycle_end) {
            self.fps = fps;
        }
        self.fps
    }
}

/// Keep only the person class at or above the threshold.
fn accepts(det: &ml_core::Detection, threshold: f32) -> bool {
    det.class_id == PERSON_CLASS_ID && det.score >= threshold
}

/// Map a model-input box onto the source frame using independent horizontal
/// and vertical scale factors.
fn rescale_bbox(bbox: [f32; 4], input: (u32, u32), frame: (u32, u32)) -> [i32; 4] {
    let map = |value: f32, frame_dim: u32, input_dim: u32| -> i32 {
        let scaled = f64::from(value) * f64::from(frame_dim) / f64::from(input_dim);
        scaled.round().clamp(0.0, f64::from(frame_dim.saturating_sub(1))) as i32
    };
    [
        map(bbox[0], frame.0, input.0),
        map(bbox[1], frame.1, input.1),
        map(bbox[2], frame.0, input.0),
        map(bbox[3], frame.1, input.1),
    ]
}
