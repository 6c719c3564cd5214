//! Pipeline supervisor driving the single producer thread.
//!
//! The producer owns the frame source and the detector engine while it runs.
//! Each cycle it reads a frame, runs the engine, encodes the annotated frame
//! and publishes the results to the frame relay and the snapshot publisher.
//! HTTP handlers only ever read from those two.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::anyhow;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use video_ingest::{CaptureError, FrameSource};

use crate::vision::{
    data::{ExecutionMode, PipelineState},
    encoding::encode_jpeg,
    engine::DetectorEngine,
    error::PipelineError,
    relay::FrameRelay,
    snapshot::SnapshotPublisher,
    telemetry,
};

/// Opens the frame source each time the pipeline starts.
pub type SourceOpener = Box<dyn FnMut() -> Result<Box<dyn FrameSource>, CaptureError> + Send>;

#[derive(Clone, Copy, Debug)]
pub struct PipelineOptions {
    pub jpeg_quality: u8,
    /// Pause before reading again when the source had no frame.
    pub capture_retry: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: 85,
            capture_retry: Duration::from_millis(10),
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<PipelineState>,
    mode: ExecutionMode,
    frames_processed: AtomicU64,
    failure: Mutex<Option<String>>,
}

impl Shared {
    fn set_state(&self, state: PipelineState) {
        *self.state.lock() = state;
    }
}

/// Read-only view of the pipeline, shared with the HTTP layer.
#[derive(Clone, Debug)]
pub struct PipelineStatus {
    shared: Arc<Shared>,
}

impl PipelineStatus {
    pub fn state(&self) -> PipelineState {
        *self.shared.state.lock()
    }

    pub fn mode(&self) -> ExecutionMode {
        self.shared.mode
    }

    pub fn frames_processed(&self) -> u64 {
        self.shared.frames_processed.load(Ordering::Relaxed)
    }

    /// Message of the failure that stopped the producer, if any.
    pub fn failure(&self) -> Option<String> {
        self.shared.failure.lock().clone()
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            state: self.state(),
            mode: self.mode(),
            frames_processed: self.frames_processed(),
            failure: self.failure(),
        }
    }
}

/// JSON body served by `/status`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusReport {
    pub state: PipelineState,
    pub mode: ExecutionMode,
    pub frames_processed: u64,
    pub failure: Option<String>,
}

enum WorkerExit {
    Stopped(DetectorEngine),
    Failed(PipelineError),
}

/// Everything the producer publishes to or reports through.
struct ProducerContext {
    relay: FrameRelay,
    snapshot: SnapshotPublisher,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    options: PipelineOptions,
}

pub struct Pipeline {
    engine: Option<DetectorEngine>,
    opener: SourceOpener,
    relay: FrameRelay,
    snapshot: SnapshotPublisher,
    options: PipelineOptions,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<WorkerExit>>,
    failure: Option<PipelineError>,
}

impl Pipeline {
    pub fn new(
        engine: DetectorEngine,
        opener: SourceOpener,
        relay: FrameRelay,
        snapshot: SnapshotPublisher,
        options: PipelineOptions,
    ) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(PipelineState::Stopped),
            mode: engine.mode(),
            frames_processed: AtomicU64::new(0),
            failure: Mutex::new(None),
        });
        Self {
            engine: Some(engine),
            opener,
            relay,
            snapshot,
            options,
            shared,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            failure: None,
        }
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            shared: self.shared.clone(),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.shared.state.lock()
    }

    /// Open the source and launch the producer thread.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        self.reap_finished();
        if self.worker.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }
        let Some(engine) = self.engine.take() else {
            return Err(PipelineError::Initialization(anyhow!(
                "detector engine is unavailable after a fatal inference failure"
            )));
        };

        self.shared.set_state(PipelineState::Starting);
        let source = match (self.opener)() {
            Ok(source) => source,
            Err(err) => {
                warn!("Failed to open frame source: {err}");
                self.engine = Some(engine);
                self.shared.set_state(PipelineState::Stopped);
                return Err(PipelineError::ResourceUnavailable(err));
            }
        };

        *self.shared.failure.lock() = None;
        self.failure = None;
        self.running.store(true, Ordering::SeqCst);
        self.shared.set_state(PipelineState::Running);

        let description = source.describe();
        let context = ProducerContext {
            relay: self.relay.clone(),
            snapshot: self.snapshot.clone(),
            shared: self.shared.clone(),
            running: self.running.clone(),
            options: self.options,
        };
        info!(
            "Pipeline running: source={description} mode={} backend={}",
            engine.mode(),
            engine.backend_name()
        );

        let spawned = telemetry::spawn_thread("vision-producer", move || {
            let span = tracing::info_span!("vision.producer", source = %description);
            let _guard = span.enter();
            run_producer(engine, source, context)
        });
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                self.shared.set_state(PipelineState::Stopped);
                Err(PipelineError::Initialization(
                    anyhow!(err).context("failed to spawn producer thread"),
                ))
            }
        }
    }

    /// Stop the producer and wait for it to exit. Safe to call repeatedly
    /// and before `start`.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        {
            let mut state = self.shared.state.lock();
            if *state == PipelineState::Running {
                *state = PipelineState::Stopping;
            }
        }
        self.running.store(false, Ordering::SeqCst);
        self.absorb(handle.join());
        self.shared.set_state(PipelineState::Stopped);
        info!(
            "Pipeline stopped after {} frames",
            self.shared.frames_processed.load(Ordering::Relaxed)
        );
    }

    /// Take the error that stopped the producer, if it stopped on its own.
    pub fn take_failure(&mut self) -> Option<PipelineError> {
        self.reap_finished();
        self.failure.take()
    }

    fn reap_finished(&mut self) {
        if self.worker.as_ref().is_some_and(JoinHandle::is_finished) {
            if let Some(handle) = self.worker.take() {
                self.absorb(handle.join());
            }
        }
    }

    fn absorb(&mut self, exit: thread::Result<WorkerExit>) {
        match exit {
            Ok(WorkerExit::Stopped(engine)) => self.engine = Some(engine),
            Ok(WorkerExit::Failed(err)) => self.failure = Some(err),
            Err(_) => {
                let err = PipelineError::Inference(anyhow!("producer thread panicked"));
                *self.shared.failure.lock() = Some(err.to_string());
                self.shared.set_state(PipelineState::Stopped);
                self.relay.close();
                self.failure = Some(err);
            }
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_producer(
    mut engine: DetectorEngine,
    mut source: Box<dyn FrameSource>,
    context: ProducerContext,
) -> WorkerExit {
    let result = produce(&mut engine, source.as_mut(), &context);
    source.release();
    match result {
        Ok(()) => {
            debug!("Producer exited on request");
            WorkerExit::Stopped(engine)
        }
        Err(err) => {
            error!("Pipeline stopped: {err}");
            context.running.store(false, Ordering::SeqCst);
            *context.shared.failure.lock() = Some(err.to_string());
            context.shared.set_state(PipelineState::Stopped);
            context.relay.close();
            WorkerExit::Failed(err)
        }
    }
}

fn produce(
    engine: &mut DetectorEngine,
    source: &mut dyn FrameSource,
    context: &ProducerContext,
) -> Result<(), PipelineError> {
    while context.running.load(Ordering::SeqCst) {
        let cycle_start = Instant::now();
        let frame = match source.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                metrics::counter!("vision_capture_skipped_total").increment(1);
                thread::sleep(context.options.capture_retry);
                continue;
            }
            Err(err) => {
                warn!("Frame capture failed: {err}");
                metrics::counter!("vision_capture_skipped_total").increment(1);
                thread::sleep(context.options.capture_retry);
                continue;
            }
        };

        let output = engine.run_cycle(&frame)?;

        match encode_jpeg(&output.annotated, context.options.jpeg_quality) {
            Ok(jpeg) => {
                context.relay.publish(jpeg, frame.timestamp_ms());
                metrics::counter!("vision_frames_published_total").increment(1);
            }
            Err(err) => {
                warn!("Skipping frame: {err:#}");
                metrics::counter!("vision_encoding_errors_total").increment(1);
            }
        }
        context.snapshot.publish(output.snapshot);
        context.shared.frames_processed.fetch_add(1, Ordering::Relaxed);

        let fps = engine.record_cycle(cycle_start, Instant::now());
        metrics::gauge!("vision_pipeline_fps").set(f64::from(fps));
    }
    Ok(())
}
