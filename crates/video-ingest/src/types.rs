use chrono::Utc;
use image::RgbImage;
use thiserror::Error;

/// RGB frame captured from a video source.
///
/// Frames are immutable once constructed and are moved between pipeline
/// stages rather than shared.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    timestamp_ms: i64,
}

impl Frame {
    /// Wrap an RGB image captured at `timestamp_ms` (ms since the Unix epoch).
    pub fn new(image: RgbImage, timestamp_ms: i64) -> Result<Self, CaptureError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(CaptureError::EmptyFrame);
        }
        Ok(Self {
            image,
            timestamp_ms,
        })
    }

    /// Wrap an RGB image stamped with the current wall-clock time.
    pub fn captured_now(image: RgbImage) -> Result<Self, CaptureError> {
        Self::new(image, Utc::now().timestamp_millis())
    }

    /// Build a frame from a packed BGR8 buffer, as delivered by most camera APIs.
    pub fn from_bgr8(
        data: &[u8],
        width: u32,
        height: u32,
        timestamp_ms: i64,
    ) -> Result<Self, CaptureError> {
        let expected = (width as usize) * (height as usize) * 3;
        if data.len() != expected {
            return Err(CaptureError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        let mut rgb = Vec::with_capacity(expected);
        for chunk in data.chunks_exact(3) {
            rgb.extend_from_slice(&[chunk[2], chunk[1], chunk[0]]);
        }
        let image = RgbImage::from_raw(width, height, rgb).ok_or(CaptureError::BufferSize {
            expected,
            actual: data.len(),
        })?;
        Self::new(image, timestamp_ms)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source {uri:?} requires the {feature} feature")]
    Unsupported { uri: String, feature: &'static str },
    #[error("frame has zero width or height")]
    EmptyFrame,
    #[error("frame buffer holds {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgr_buffers_are_swizzled_to_rgb() {
        let frame = Frame::from_bgr8(&[1, 2, 3, 4, 5, 6], 2, 1, 42).unwrap();
        assert_eq!(frame.image().get_pixel(0, 0).0, [3, 2, 1]);
        assert_eq!(frame.image().get_pixel(1, 0).0, [6, 5, 4]);
        assert_eq!(frame.timestamp_ms(), 42);
    }

    #[test]
    fn rejects_short_buffers_and_empty_images() {
        assert!(matches!(
            Frame::from_bgr8(&[0; 5], 2, 1, 0),
            Err(CaptureError::BufferSize {
                expected: 6,
                actual: 5
            })
        ));
        assert!(matches!(
            Frame::new(RgbImage::new(0, 10), 0),
            Err(CaptureError::EmptyFrame)
        ));
    }
}
