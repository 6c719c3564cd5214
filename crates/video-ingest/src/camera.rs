//! OpenCV-backed camera capture.

use chrono::Utc;
use opencv::{
    core::{Mat, MatTraitConst, MatTraitConstManual},
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use tracing::{info, warn};

use crate::{CaptureError, Frame, FrameSource, SourceOptions};

/// V4L camera opened by device index.
pub(crate) struct CameraSource {
    index: i32,
    cap: VideoCapture,
    frame: Mat,
}

impl CameraSource {
    pub(crate) fn open(index: i32, options: SourceOptions) -> Result<Self, CaptureError> {
        let mut cap = open_video_capture(index)?;
        configure_camera(&mut cap, options);

        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or_default();
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or_default();
        info!("Camera #{index} initialised at {width}x{height}");

        Ok(Self {
            index,
            cap,
            frame: Mat::default(),
        })
    }
}

impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        format!("camera #{}", self.index)
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        let grabbed = self
            .cap
            .read(&mut self.frame)
            .map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed || self.frame.empty() {
            return Ok(None);
        }

        let width = self.frame.cols() as u32;
        let height = self.frame.rows() as u32;
        let data = self
            .frame
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?;
        Frame::from_bgr8(data, width, height, Utc::now().timestamp_millis()).map(Some)
    }

    fn release(&mut self) {
        if let Err(err) = self.cap.release() {
            warn!("Failed to release camera #{}: {err}", self.index);
        }
    }
}

/// Open a camera by index, preferring the V4L backend.
fn open_video_capture(index: i32) -> Result<VideoCapture, CaptureError> {
    for backend in [videoio::CAP_V4L, videoio::CAP_ANY] {
        match VideoCapture::new(index, backend) {
            Ok(cap) => {
                if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? {
                    return Ok(cap);
                }
            }
            Err(err) => {
                warn!("Failed to open device #{index} with backend {backend}: {err}");
            }
        }
    }

    Err(CaptureError::Open {
        uri: format!("/dev/video{index}"),
    })
}

/// Apply the requested resolution and frame rate; cameras may ignore either.
fn configure_camera(cap: &mut VideoCapture, options: SourceOptions) {
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        let _ = cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64);
    }
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, options.size.0 as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, options.size.1 as f64);
    let _ = cap.set(videoio::CAP_PROP_FPS, options.fps);
}
