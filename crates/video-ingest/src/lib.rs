//! Frame sources for the detection pipeline.
//!
//! Every source implements [`FrameSource`], a pull-based contract owned by
//! the single producer thread: `read` yields the next frame (or `None` when
//! nothing is ready yet) and `release` frees the underlying device.

#[cfg(feature = "camera-opencv")]
mod camera;
mod images;
mod synthetic;
mod types;

use std::path::PathBuf;

pub use images::ImageFolderSource;
pub use synthetic::SyntheticSource;
pub use types::{CaptureError, Frame};

/// URI prefix selecting the generated test pattern.
pub const SYNTHETIC_PREFIX: &str = "stub://";

/// Pull-based frame source.
pub trait FrameSource: Send {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// Read the next frame. `Ok(None)` means no frame was available this time
    /// and the caller should simply retry.
    fn read(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Release the device. Called exactly once when the pipeline stops.
    fn release(&mut self) {}
}

/// Capture settings applied when opening a source.
#[derive(Clone, Copy, Debug)]
pub struct SourceOptions {
    /// Requested frame size `(width, height)`.
    pub size: (u32, u32),
    /// Pace for sources that are not clocked by hardware.
    pub fps: f64,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            size: (640, 480),
            fps: 30.0,
        }
    }
}

/// Where frames come from, parsed from a `--camera` argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    /// V4L device index (`0`, `/dev/video2`).
    Device(i32),
    /// Generated test pattern (`stub://`).
    Synthetic,
    /// A still image or a directory of images played in a loop.
    Images(PathBuf),
}

impl SourceSpec {
    pub fn parse(uri: &str) -> Self {
        if uri.starts_with(SYNTHETIC_PREFIX) {
            SourceSpec::Synthetic
        } else if let Some(index) = parse_device_index(uri) {
            SourceSpec::Device(index)
        } else {
            SourceSpec::Images(PathBuf::from(uri))
        }
    }
}

/// Open the source described by `uri`.
pub fn open_source(uri: &str, options: SourceOptions) -> Result<Box<dyn FrameSource>, CaptureError> {
    match SourceSpec::parse(uri) {
        SourceSpec::Synthetic => Ok(Box::new(SyntheticSource::new(options))),
        SourceSpec::Images(path) => Ok(Box::new(ImageFolderSource::open(path, options)?)),
        SourceSpec::Device(index) => open_device(uri, index, options),
    }
}

#[cfg(feature = "camera-opencv")]
fn open_device(
    _uri: &str,
    index: i32,
    options: SourceOptions,
) -> Result<Box<dyn FrameSource>, CaptureError> {
    Ok(Box::new(camera::CameraSource::open(index, options)?))
}

#[cfg(not(feature = "camera-opencv"))]
fn open_device(
    uri: &str,
    _index: i32,
    _options: SourceOptions,
) -> Result<Box<dyn FrameSource>, CaptureError> {
    Err(CaptureError::Unsupported {
        uri: uri.to_string(),
        feature: "camera-opencv",
    })
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            return stripped.parse::<i32>().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_specs() {
        assert_eq!(SourceSpec::parse("0"), SourceSpec::Device(0));
        assert_eq!(SourceSpec::parse("/dev/video3"), SourceSpec::Device(3));
        assert_eq!(SourceSpec::parse("stub://"), SourceSpec::Synthetic);
        assert_eq!(
            SourceSpec::parse("/srv/frames"),
            SourceSpec::Images(PathBuf::from("/srv/frames"))
        );
        assert_eq!(
            SourceSpec::parse("/dev/video"),
            SourceSpec::Images(PathBuf::from("/dev/video"))
        );
    }

    #[cfg(not(feature = "camera-opencv"))]
    #[test]
    fn device_sources_need_the_camera_feature() {
        let err = open_source("0", SourceOptions::default()).err().unwrap();
        assert!(matches!(err, CaptureError::Unsupported { .. }));
    }

    #[test]
    fn synthetic_source_opens() {
        let mut source = open_source("stub://", SourceOptions::default()).unwrap();
        let frame = source.read().unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (640, 480));
        source.release();
    }
}
