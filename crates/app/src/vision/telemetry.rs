//! Telemetry helpers for tracing output and Prometheus metrics.

use std::{io, sync::OnceLock, thread, time::Duration};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

static PROM_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the global fmt subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_timer(fmt::time::uptime())
                .with_filter(env_filter),
        )
        .try_init();
}

/// Ensure the global metrics recorder is installed and return the Prometheus
/// handle. Returns `None` if another recorder was installed first.
pub fn init_metrics_recorder() -> Option<&'static PrometheusHandle> {
    PROM_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();

            if let Err(err) = metrics::set_global_recorder(recorder) {
                warn!("Prometheus recorder not installed: {err}");
                return None;
            }

            let upkeep_handle = handle.clone();
            if let Err(err) = spawn_thread("prometheus-upkeep", move || loop {
                thread::sleep(Duration::from_secs(5));
                upkeep_handle.run_upkeep();
            }) {
                warn!("Failed to spawn Prometheus upkeep thread: {err}");
            }

            Some(handle)
        })
        .as_ref()
}

/// Access the Prometheus handle when already initialised.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROM_HANDLE.get().and_then(Option::as_ref)
}

/// Spawn a thread that inherits the current tracing dispatcher.
pub fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_thread_runs_and_is_named() {
        let handle = spawn_thread("telemetry-test", || {
            thread::current().name().map(str::to_owned)
        })
        .unwrap();
        assert_eq!(handle.join().unwrap().as_deref(), Some("telemetry-test"));
    }

    #[test]
    fn metrics_recorder_renders_recorded_values() {
        let handle = init_metrics_recorder().expect("recorder installed");
        metrics::counter!("vision_telemetry_test_total").increment(3);
        assert!(handle.render().contains("vision_telemetry_test_total"));
        assert!(prometheus_handle().is_some());
    }
}
