use std::path::Path;

use anyhow::{Context, Result, bail};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::{
    backend::InferenceBackend,
    detector::{Detection, DetectionBatch},
};

/// CPU backend running SSD-style ONNX detectors through `tract`.
///
/// The model takes a `uint8` NHWC image and produces, in order,
/// `boxes [1,N,4]` (normalised `ymin, xmin, ymax, xmax`), `classes [1,N]`,
/// `scores [1,N]` and optionally `count [1]`.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk with a fixed `(width, height)` input.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: (u32, u32)) -> Result<Self> {
        let model_path = model_path.as_ref();
        let (width, height) = input_size;
        if width == 0 || height == 0 {
            bail!("model input size must be non-zero, got {width}x{height}");
        }
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    u8::datum_type(),
                    tvec!(1, height as usize, width as usize, 3),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
        })
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        tract_ndarray::Array4::from_shape_fn(
            (1, self.height as usize, self.width as usize, 3),
            |(_, y, x, channel)| image.get_pixel(x as u32, y as u32)[channel],
        )
        .into_tensor()
    }
}

/// Decode SSD outputs into detections in model-input pixels.
///
/// Boxes arrive as normalised `ymin, xmin, ymax, xmax` rows and leave as
/// `x0, y0, x1, y1`. An optional fourth output caps the number of rows read.
fn decode_outputs(outputs: &[TValue], input_size: (u32, u32)) -> Result<DetectionBatch> {
    if outputs.len() < 3 {
        bail!("expected at least 3 model outputs, got {}", outputs.len());
    }
    let boxes: Vec<f32> = outputs[0]
        .to_array_view::<f32>()
        .context("box output tensor was not f32")?
        .iter()
        .copied()
        .collect();
    if boxes.len() % 4 != 0 {
        bail!("box output has {} values, not a multiple of 4", boxes.len());
    }
    let classes: Vec<f32> = outputs[1]
        .to_array_view::<f32>()
        .context("class output tensor was not f32")?
        .iter()
        .copied()
        .collect();
    let scores: Vec<f32> = outputs[2]
        .to_array_view::<f32>()
        .context("score output tensor was not f32")?
        .iter()
        .copied()
        .collect();

    let mut count = (boxes.len() / 4).min(classes.len()).min(scores.len());
    if let Some(declared) = outputs.get(3) {
        if let Ok(view) = declared.to_array_view::<f32>() {
            if let Some(value) = view.iter().next() {
                count = count.min(value.max(0.0) as usize);
            }
        }
    }

    let (w, h) = (input_size.0 as f32, input_size.1 as f32);
    let detections = boxes
        .chunks_exact(4)
        .zip(classes.iter().zip(&scores))
        .take(count)
        .map(|(row, (&class, &score))| {
            Detection::new(
                class as i64,
                score,
                [row[1] * w, row[0] * h, row[3] * w, row[2] * h],
            )
        })
        .collect();
    Ok(DetectionBatch { detections })
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn infer(&mut self, input: &RgbImage) -> Result<DetectionBatch> {
        if input.dimensions() != (self.width, self.height) {
            bail!(
                "input {}x{} does not match model input {}x{}",
                input.width(),
                input.height(),
                self.width,
                self.height
            );
        }
        let tensor = self.build_input(input);
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .context("ONNX inference failed")?;
        decode_outputs(&outputs, (self.width, self.height))
    }
}
