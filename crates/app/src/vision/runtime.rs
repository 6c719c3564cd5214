//! Process wiring: load the model, start the pipeline and the server, wait for
//! Ctrl+C or a fatal pipeline failure, then tear everything down in order.

use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use ml_core::{LabelTable, load_backend};
use tracing::{info, warn};
use video_ingest::{SourceOptions, open_source};

use crate::vision::{
    data::PipelineState,
    engine::DetectorEngine,
    error::PipelineError,
    pipeline::{Pipeline, PipelineOptions, PipelineStatus, SourceOpener},
    relay::FrameRelay,
    server::{PreviewServer, ServerState, spawn_preview_server},
    snapshot::SnapshotPublisher,
    VisionConfig, telemetry,
};

const STATUS_POLL: Duration = Duration::from_millis(250);

/// Run until Ctrl+C, returning an error if the pipeline failed on its own.
pub fn run(config: VisionConfig) -> Result<()> {
    telemetry::init_tracing(config.verbose);
    let _ = telemetry::init_metrics_recorder();
    let span = tracing::info_span!(
        "vision.runtime",
        camera = %config.camera_uri,
        model = %config.model_path.display(),
    );
    let _span_guard = span.enter();

    let runtime = VisionRuntime::launch(&config)?;

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    let _shutdown_keepalive = shutdown_tx.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    }) {
        warn!("Failed to install Ctrl+C handler: {err}");
    }

    runtime.wait(&shutdown_rx);
    runtime.shutdown()
}

/// A running pipeline plus the server publishing its output.
pub struct VisionRuntime {
    pipeline: Pipeline,
    relay: FrameRelay,
    server: PreviewServer,
}

impl VisionRuntime {
    /// Build the engine, start the producer, then bind the HTTP server.
    pub fn launch(config: &VisionConfig) -> Result<Self> {
        let labels = LabelTable::from_path(&config.labels_path)
            .map_err(PipelineError::Initialization)?;
        let backend = load_backend(&config.model_path, config.model_input)
            .map_err(PipelineError::Initialization)?;
        let engine = DetectorEngine::initialize(
            backend,
            labels,
            config.threshold,
            config.request_acceleration,
        )?;

        let relay = FrameRelay::new();
        let snapshot = SnapshotPublisher::new();
        let camera = config.camera_uri.clone();
        let source_options = SourceOptions {
            size: config.capture_size,
            ..SourceOptions::default()
        };
        let opener: SourceOpener = Box::new(move || open_source(&camera, source_options));

        let mut pipeline = Pipeline::new(
            engine,
            opener,
            relay.clone(),
            snapshot.clone(),
            PipelineOptions {
                jpeg_quality: config.jpeg_quality,
                ..PipelineOptions::default()
            },
        );
        pipeline.start()?;

        let state = ServerState {
            relay: relay.clone(),
            snapshot,
            status: pipeline.status(),
            stream_timeout: config.stream_timeout,
        };
        let server = match spawn_preview_server(state, &config.host, config.port) {
            Ok(server) => server,
            Err(err) => {
                pipeline.stop();
                relay.close();
                return Err(err);
            }
        };

        Ok(Self {
            pipeline,
            relay,
            server,
        })
    }

    pub fn local_addrs(&self) -> &[SocketAddr] {
        self.server.local_addrs()
    }

    pub fn status(&self) -> PipelineStatus {
        self.pipeline.status()
    }

    /// Block until `shutdown` fires or the pipeline stops by itself.
    pub fn wait(&self, shutdown: &Receiver<()>) {
        let status = self.pipeline.status();
        loop {
            match shutdown.recv_timeout(STATUS_POLL) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!("Shutdown requested");
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {
                    if status.state() == PipelineState::Stopped {
                        return;
                    }
                }
            }
        }
    }

    /// Stop the producer, end open streams, then stop the server.
    pub fn shutdown(mut self) -> Result<()> {
        self.pipeline.stop();
        self.relay.close();
        self.server.stop();
        match self.pipeline.take_failure() {
            Some(err) => Err(err).context("vision pipeline stopped"),
            None => {
                info!("Vision runtime shut down cleanly");
                Ok(())
            }
        }
    }
}
