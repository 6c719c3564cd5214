use std::{path::PathBuf, time::Duration};

use anyhow::{Error, Result, bail};
use clap::Parser;

/// Command-line arguments for the person detection stream.
#[derive(Clone, Debug, Parser)]
#[command(
    name = "person-stream",
    version,
    about = "Detect people on a camera feed and serve an annotated MJPEG stream"
)]
pub struct VisionCliArgs {
    /// Detection model (`*.onnx`, or `stub://` for a dry run).
    #[arg(long)]
    pub model: PathBuf,

    /// Label file mapping class ids to names.
    #[arg(long)]
    pub labels: PathBuf,

    /// Minimum confidence for a detection to be reported.
    #[arg(long, default_value_t = 0.5)]
    pub threshold: f32,

    /// Camera index, `/dev/videoN`, an image file or directory, or `stub://`.
    #[arg(long, default_value = "0")]
    pub camera: String,

    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value_t = 5000)]
    pub port: u16,

    /// Requested capture width.
    #[arg(long, default_value_t = 640)]
    pub width: u32,

    /// Requested capture height.
    #[arg(long, default_value_t = 480)]
    pub height: u32,

    /// Model input width when the model does not pin one.
    #[arg(long, default_value_t = 300)]
    pub model_width: u32,

    /// Model input height when the model does not pin one.
    #[arg(long, default_value_t = 300)]
    pub model_height: u32,

    /// JPEG quality for streamed frames (1-100).
    #[arg(long, default_value_t = 85)]
    pub jpeg_quality: u8,

    /// Do not request accelerated inference.
    #[arg(long)]
    pub cpu: bool,

    /// How long a stream waits for a frame before polling again.
    #[arg(long, default_value_t = 1000)]
    pub stream_timeout_ms: u64,

    /// Enable debug logging.
    #[arg(long)]
    pub verbose: bool,
}

/// Validated runtime configuration.
#[derive(Clone, Debug)]
pub struct VisionConfig {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    pub threshold: f32,
    pub camera_uri: String,
    pub host: String,
    pub port: u16,
    pub capture_size: (u32, u32),
    pub model_input: (u32, u32),
    pub jpeg_quality: u8,
    pub request_acceleration: bool,
    pub stream_timeout: Duration,
    pub verbose: bool,
}

impl VisionConfig {
    /// Parse and validate the process arguments.
    pub fn from_env() -> Result<Self> {
        Self::try_from(VisionCliArgs::parse())
    }
}

impl TryFrom<VisionCliArgs> for VisionConfig {
    type Error = Error;

    fn try_from(args: VisionCliArgs) -> Result<Self> {
        if !(0.0..=1.0).contains(&args.threshold) {
            bail!("--threshold must be between 0 and 1, got {}", args.threshold);
        }
        if args.width == 0 || args.height == 0 {
            bail!("--width and --height must be positive");
        }
        if args.model_width == 0 || args.model_height == 0 {
            bail!("--model-width and --model-height must be positive");
        }
        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }
        if args.stream_timeout_ms == 0 {
            bail!("--stream-timeout-ms must be at least 1");
        }
        if args.camera.trim().is_empty() {
            bail!("--camera must not be empty");
        }

        Ok(Self {
            model_path: args.model,
            labels_path: args.labels,
            threshold: args.threshold,
            camera_uri: args.camera,
            host: args.host,
            port: args.port,
            capture_size: (args.width, args.height),
            model_input: (args.model_width, args.model_height),
            jpeg_quality: args.jpeg_quality,
            request_acceleration: !args.cpu,
            stream_timeout: Duration::from_millis(args.stream_timeout_ms),
            verbose: args.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<VisionConfig> {
        let mut argv = vec![
            "person-stream",
            "--model",
            "models/ssd_mobilenet.onnx",
            "--labels",
            "models/coco_labels.txt",
        ];
        argv.extend_from_slice(extra);
        VisionConfig::try_from(VisionCliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.camera_uri, "0");
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 5000);
        assert_eq!(config.capture_size, (640, 480));
        assert_eq!(config.model_input, (300, 300));
        assert_eq!(config.jpeg_quality, 85);
        assert!(config.request_acceleration);
        assert_eq!(config.stream_timeout, Duration::from_secs(1));
        assert!(!config.verbose);
    }

    #[test]
    fn cpu_flag_disables_acceleration() {
        let config = parse(&["--cpu", "--camera", "stub://", "--port", "8080"]).unwrap();
        assert!(!config.request_acceleration);
        assert_eq!(config.camera_uri, "stub://");
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn threshold_bounds_are_inclusive() {
        assert!(parse(&["--threshold", "0"]).is_ok());
        assert!(parse(&["--threshold", "1"]).is_ok());
        assert!(parse(&["--threshold", "1.01"]).is_err());
        assert!(parse(&["--threshold=-0.2"]).is_err());
    }

    #[test]
    fn rejects_invalid_sizes_and_quality() {
        assert!(parse(&["--width", "0"]).is_err());
        assert!(parse(&["--model-height", "0"]).is_err());
        assert!(parse(&["--jpeg-quality", "0"]).is_err());
        assert!(parse(&["--jpeg-quality", "101"]).is_err());
        assert!(parse(&["--stream-timeout-ms", "0"]).is_err());
    }

    #[test]
    fn model_and_labels_are_required() {
        assert!(VisionCliArgs::try_parse_from(["person-stream", "--model", "m.onnx"]).is_err());
        assert!(VisionCliArgs::try_parse_from(["person-stream", "--labels", "l.txt"]).is_err());
    }
}
