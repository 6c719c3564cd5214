/// Single detection returned by a backend.
///
/// `bbox` is `[xmin, ymin, xmax, ymax]` in pixels of the model input image,
/// not of the frame the input was resized from.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4],
    pub score: f32,
    pub class_id: i64,
}

impl Detection {
    pub fn new(class_id: i64, score: f32, bbox: [f32; 4]) -> Self {
        Self {
            bbox,
            score,
            class_id,
        }
    }
}

/// Detections for a single input image, in backend order.
#[derive(Debug, Clone, Default)]
pub struct DetectionBatch {
    pub detections: Vec<Detection>,
}

impl From<Vec<Detection>> for DetectionBatch {
    fn from(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}
