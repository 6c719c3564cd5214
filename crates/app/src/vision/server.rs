//! Actix Web server exposing the MJPEG stream and the detection APIs.
//!
//! The server runs on a dedicated thread to keep the producer hot path free
//! from Actix runtime concerns. Handlers only read: each `/video_feed`
//! request subscribes its own relay consumer and `/detections` clones the
//! latest snapshot.

use std::{io, net::SocketAddr, thread::JoinHandle, time::Duration};

use actix_web::{
    App, HttpResponse, HttpServer,
    http::{Method, header},
    middleware::DefaultHeaders,
    web::{self, Bytes},
};
use anyhow::{Context, Result, anyhow};
use async_stream::stream;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::vision::{
    data::{DetectionsResponse, EncodedFrame},
    pipeline::PipelineStatus,
    relay::{ConsumeError, FrameRelay},
    snapshot::SnapshotPublisher,
    telemetry,
};

const BOUNDARY: &str = "frame";

/// Shared state backing HTTP handlers.
#[derive(Clone)]
pub struct ServerState {
    pub relay: FrameRelay,
    pub snapshot: SnapshotPublisher,
    pub status: PipelineStatus,
    /// How long a stream waits for a new frame before polling again.
    pub stream_timeout: Duration,
}

/// Handle for the preview server thread.
pub struct PreviewServer {
    addrs: Vec<SocketAddr>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PreviewServer {
    /// Addresses the server is listening on.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// Signal the server to stop and block until the thread exits.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PreviewServer {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}

/// CORS headers attached to every response.
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .add((header::ACCESS_CONTROL_ALLOW_HEADERS, "*"))
        .add((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"))
}

/// Register the HTTP routes. Every route also answers CORS preflight.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/video_feed")
            .route(web::get().to(video_feed_handler))
            .route(web::method(Method::OPTIONS).to(preflight_handler)),
    )
    .service(
        web::resource("/detections")
            .route(web::get().to(detections_handler))
            .route(web::method(Method::OPTIONS).to(preflight_handler)),
    )
    .service(
        web::resource("/status")
            .route(web::get().to(status_handler))
            .route(web::method(Method::OPTIONS).to(preflight_handler)),
    )
    .service(
        web::resource("/metrics")
            .route(web::get().to(metrics_handler))
            .route(web::method(Method::OPTIONS).to(preflight_handler)),
    );
}

/// Bind the server and run it on its own thread. Bind failures are returned
/// to the caller.
pub fn spawn_preview_server(state: ServerState, host: &str, port: u16) -> Result<PreviewServer> {
    let host = host.to_owned();
    let (bind_tx, bind_rx) = crossbeam_channel::bounded::<io::Result<Vec<SocketAddr>>>(1);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let handle = telemetry::spawn_thread("vision-preview-server", move || {
        let result = actix_web::rt::System::new().block_on(async move {
            let bound = HttpServer::new(move || {
                App::new()
                    .wrap(cors_headers())
                    .app_data(web::Data::new(state.clone()))
                    .configure(configure)
            })
            .disable_signals()
            .shutdown_timeout(2)
            .bind((host.as_str(), port));

            let server = match bound {
                Ok(server) => {
                    let _ = bind_tx.send(Ok(server.addrs()));
                    server.run()
                }
                Err(err) => {
                    let _ = bind_tx.send(Err(err));
                    return Ok(());
                }
            };

            let srv_handle = server.handle();
            actix_web::rt::spawn(async move {
                let _ = shutdown_rx.await;
                srv_handle.stop(true).await;
            });

            server.await
        });
        if let Err(err) = result {
            error!("HTTP server error: {err}");
        }
    })
    .context("Failed to spawn preview server thread")?;

    match bind_rx.recv() {
        Ok(Ok(addrs)) => {
            for addr in &addrs {
                info!("Serving stream on http://{addr}/video_feed");
            }
            Ok(PreviewServer {
                addrs,
                shutdown: Some(shutdown_tx),
                handle: Some(handle),
            })
        }
        Ok(Err(err)) => {
            let _ = handle.join();
            Err(err).context("Failed to bind preview server")
        }
        Err(_) => {
            let _ = handle.join();
            Err(anyhow!("preview server thread exited before binding"))
        }
    }
}

/// One part of the `multipart/x-mixed-replace` stream.
pub fn multipart_part(frame: &EncodedFrame) -> Bytes {
    let mut payload = Vec::with_capacity(frame.len() + 64);
    payload.extend_from_slice(b"--");
    payload.extend_from_slice(BOUNDARY.as_bytes());
    payload.extend_from_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    payload.extend_from_slice(&frame.jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

/// Stream annotated frames until the relay closes or the client goes away.
async fn video_feed_handler(state: web::Data<ServerState>) -> HttpResponse {
    let mut consumer = state.relay.subscribe();
    let timeout = state.stream_timeout;
    let stream = stream! {
        loop {
            match consumer.consume(timeout).await {
                Ok(frame) => yield Ok::<Bytes, actix_web::Error>(multipart_part(&frame)),
                Err(ConsumeError::TimedOut) => continue,
                Err(ConsumeError::Closed) => {
                    debug!("Frame relay closed; ending stream");
                    break;
                }
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .content_type(format!("multipart/x-mixed-replace; boundary={BOUNDARY}"))
        .streaming(stream)
}

/// Empty answer to a CORS preflight; the headers come from [`cors_headers`].
async fn preflight_handler() -> HttpResponse {
    HttpResponse::NoContent()
        .insert_header((header::ACCESS_CONTROL_MAX_AGE, "86400"))
        .finish()
}

/// Return the most recent detection snapshot as JSON, or 503 once the
/// pipeline has stopped on a fatal error.
async fn detections_handler(state: web::Data<ServerState>) -> HttpResponse {
    if let Some(failure) = state.status.failure() {
        return HttpResponse::ServiceUnavailable().json(serde_json::json!({ "error": failure }));
    }
    let snapshot = state.snapshot.read();
    HttpResponse::Ok().json(DetectionsResponse::from(snapshot.as_ref()))
}

async fn status_handler(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok().json(state.status.report())
}

async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NoContent().finish(),
    }
}
