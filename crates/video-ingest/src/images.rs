use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use tracing::debug;

use crate::{CaptureError, Frame, FrameSource, SourceOptions, synthetic::pace};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Plays a still image, or every image of a directory in name order, in a
/// loop at the configured frame rate.
pub struct ImageFolderSource {
    root: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    fps: f64,
    last_emit: Option<Instant>,
}

impl ImageFolderSource {
    pub fn open<P: AsRef<Path>>(path: P, options: SourceOptions) -> Result<Self, CaptureError> {
        let root = path.as_ref().to_path_buf();
        let open_error = || CaptureError::Open {
            uri: root.display().to_string(),
        };

        let files = if root.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(&root)
                .map_err(|_| open_error())?
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| path.is_file() && has_image_extension(path))
                .collect();
            files.sort();
            files
        } else if root.is_file() && has_image_extension(&root) {
            vec![root.clone()]
        } else {
            Vec::new()
        };

        if files.is_empty() {
            return Err(open_error());
        }
        debug!("Image source {} holds {} file(s)", root.display(), files.len());

        Ok(Self {
            root,
            files,
            cursor: 0,
            fps: options.fps,
            last_emit: None,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageFolderSource {
    fn describe(&self) -> String {
        format!("{} ({} image(s))", self.root.display(), self.files.len())
    }

    fn read(&mut self) -> Result<Option<Frame>, CaptureError> {
        pace(&mut self.last_emit, self.fps);
        let path = &self.files[self.cursor];
        self.cursor = (self.cursor + 1) % self.files.len();

        let image = image::open(path).map_err(|source| CaptureError::Decode {
            path: path.display().to_string(),
            source,
        })?;
        Frame::captured_now(image.to_rgb8()).map(Some)
    }

    fn release(&mut self) {
        self.cursor = 0;
        self.last_emit = None;
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
