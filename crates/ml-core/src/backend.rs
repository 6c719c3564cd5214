use std::path::Path;

use anyhow::{Result, bail};
use image::RgbImage;
use tracing::info;

use crate::{backends::StubBackend, detector::DetectionBatch};

/// Model path prefix selecting the in-process [`StubBackend`].
pub const STUB_MODEL_PREFIX: &str = "stub://";

/// Contract between the pipeline and whatever executes the detection model.
///
/// A backend is owned and invoked by a single producer thread, so
/// implementations only need to be `Send`.
pub trait InferenceBackend: Send {
    /// Backend identifier used in logs.
    fn name(&self) -> &'static str;

    /// Input dimensions `(width, height)` the model expects.
    fn input_size(&self) -> (u32, u32);

    /// Run the model on an image already resized to [`Self::input_size`].
    fn infer(&mut self, input: &RgbImage) -> Result<DetectionBatch>;

    /// Whether inference is actually dispatched to a hardware accelerator.
    fn is_accelerated(&self) -> bool {
        false
    }
}

/// Load the backend matching `model_path`.
///
/// `fallback_input` is used when the model file does not pin its own input
/// dimensions.
pub fn load_backend(
    model_path: &Path,
    fallback_input: (u32, u32),
) -> Result<Box<dyn InferenceBackend>> {
    let uri = model_path.display().to_string();
    if uri.starts_with(STUB_MODEL_PREFIX) {
        info!("Using stub inference backend ({uri})");
        return Ok(Box::new(StubBackend::new(fallback_input)));
    }

    if !model_path.exists() {
        bail!("model file {uri} does not exist");
    }

    let extension = model_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("onnx") => load_onnx(model_path, fallback_input),
        Some(other) => bail!("unsupported model format .{other} for {uri}"),
        None => bail!("cannot infer model format for {uri}"),
    }
}

#[cfg(feature = "backend-tract")]
fn load_onnx(model_path: &Path, fallback_input: (u32, u32)) -> Result<Box<dyn InferenceBackend>> {
    let backend = crate::backends::tract::TractBackend::new(model_path, fallback_input)?;
    info!(
        "Loaded ONNX model {} (input {}x{})",
        model_path.display(),
        backend.input_size().0,
        backend.input_size().1
    );
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_onnx(model_path: &Path, _fallback_input: (u32, u32)) -> Result<Box<dyn InferenceBackend>> {
    bail!(
        "{} is an ONNX model but this build lacks the backend-tract feature",
        model_path.display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_prefix_selects_stub_backend() {
        let backend = load_backend(Path::new("stub://person"), (300, 300)).unwrap();
        assert_eq!(backend.name(), "stub");
        assert_eq!(backend.input_size(), (300, 300));
        assert!(!backend.is_accelerated());
    }

    #[test]
    fn missing_model_file_is_rejected() {
        let err = load_backend(Path::new("/nonexistent/model.onnx"), (300, 300))
            .err()
            .unwrap();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".tflite").tempfile().unwrap();
        let err = load_backend(file.path(), (300, 300)).err().unwrap();
        assert!(err.to_string().contains("unsupported model format"));
    }
}
