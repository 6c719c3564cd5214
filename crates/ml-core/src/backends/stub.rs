use std::collections::VecDeque;

use anyhow::{Result, anyhow, bail};
use image::RgbImage;

use crate::{backend::InferenceBackend, detector::Detection, detector::DetectionBatch};

/// In-process backend that replays scripted results.
///
/// Each `infer` call pops the next scripted entry; once the script is
/// exhausted every call yields an empty batch. Used for dry runs (`stub://`)
/// and for exercising the pipeline without a model.
pub struct StubBackend {
    input_size: (u32, u32),
    accelerated: bool,
    script: VecDeque<Result<Vec<Detection>, String>>,
    calls: usize,
}

impl StubBackend {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            accelerated: false,
            script: VecDeque::new(),
            calls: 0,
        }
    }

    /// Report the backend as running on an accelerator.
    pub fn with_accelerated(mut self, accelerated: bool) -> Self {
        self.accelerated = accelerated;
        self
    }

    /// Queue a successful inference result.
    pub fn push_detections(mut self, detections: Vec<Detection>) -> Self {
        self.script.push_back(Ok(detections));
        self
    }

    /// Queue an inference failure.
    pub fn push_failure(mut self, message: impl Into<String>) -> Self {
        self.script.push_back(Err(message.into()));
        self
    }

    /// Number of `infer` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn infer(&mut self, input: &RgbImage) -> Result<DetectionBatch> {
        if input.dimensions() != self.input_size {
            bail!(
                "input {}x{} does not match model input {}x{}",
                input.width(),
                input.height(),
                self.input_size.0,
                self.input_size.1
            );
        }
        self.calls += 1;
        match self.script.pop_front() {
            Some(Ok(detections)) => Ok(DetectionBatch::from(detections)),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(DetectionBatch::default()),
        }
    }

    fn is_accelerated(&self) -> bool {
        self.accelerated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_script_then_returns_empty_batches() {
        let mut backend = StubBackend::new((4, 4))
            .push_detections(vec![Detection::new(0, 0.9, [0.0, 0.0, 2.0, 2.0])])
            .push_failure("device unplugged");
        let input = RgbImage::new(4, 4);

        let first = backend.infer(&input).unwrap();
        assert_eq!(first.detections.len(), 1);
        assert!(backend.infer(&input).is_err());
        assert!(backend.infer(&input).unwrap().detections.is_empty());
        assert_eq!(backend.calls(), 3);
    }

    #[test]
    fn rejects_input_of_wrong_size() {
        let mut backend = StubBackend::new((4, 4));
        assert!(backend.infer(&RgbImage::new(8, 4)).is_err());
        assert_eq!(backend.calls(), 0);
    }
}
