use std::{
    thread,
    time::{Duration, Instant},
};

use image::{Rgb, RgbImage};

use crate::{CaptureError, Frame, FrameSource, SourceOptions};

/// Generated test pattern: a colour gradient with a vertical bar sweeping
/// across it, paced at the configured frame rate.
pub struct SyntheticSource {
    options: SourceOptions,
    frame_index: u64,
    last_emit: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(options: SourceOptions) -> Self {
        Self {
            options,
            frame_index: 0,
            last_emit: None,
        }
    }

    fn render(&self) -> RgbImage {
        let (width, height) = self.options.size;
        let bar_x = (self.frame_index * 8 % u64::from(width.max(1))) as u32;
        RgbImage::from_fn(width, height, |x, y| {
            if x.abs_diff(bar_x) < 6 {
                Rgb([255, 255, 255])
            } else {
                Rgb([
                    (x * 255 / width.max(1)) as u8,
                    (y * 255 / height.max(1)) as u8,
                    96,
                ])
            }
        })
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!(
            "synthetic pattern {}x{} @ {:.0} fps",
            self.options.size.0, self.options.size.1, self.options.fps
        )
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        pace(&mut self.last_emit, self.options.fps);
        let frame = Frame::captured_now(self.render())?;
        self.frame_index = self.frame_index.wrapping_add(1);
        Ok(Some(frame))
    }
}

/// Sleep until one frame interval has passed since the previous emit.
pub(crate) fn pace(last_emit: &mut Option<Instant>, fps: f64) {
    if fps > 0.0 {
        let interval = Duration::from_secs_f64(1.0 / fps);
        if let Some(previous) = *last_emit {
            let elapsed = previous.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
    }
    *last_emit = Some(Instant::now());
}
