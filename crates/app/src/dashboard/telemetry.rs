//! Telemetry helpers for tracing spans and Prometheus metrics.

use std::{io, path::Path, sync::OnceLock, thread, time::Duration};

use anyhow::{Context, Result, anyhow};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{
    filter::{EnvFilter, filter_fn},
    fmt,
    layer::SubscriberExt,
    prelude::*,
};

use crate::dashboard::config::TelemetryOptions;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static PROM_UPKEEP_THREAD: OnceLock<thread::JoinHandle<()>> = OnceLock::new();

const PROM_UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Guard returned when a telemetry subscriber has been installed for the current thread.
pub(crate) struct TelemetryGuard {
    _default_guard: tracing::subscriber::DefaultGuard,
    _chrome_guard: Option<tracing_chrome::FlushGuard>,
}

/// Ensure the global metrics recorder is installed and return the Prometheus handle.
pub(crate) fn init_metrics_recorder() -> Result<&'static PrometheusHandle> {
    if let Some(handle) = PROM_HANDLE.get() {
        return Ok(handle);
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|err| anyhow!("metrics recorder already installed: {err}"))?;
    describe_metrics();

    let upkeep_handle = handle.clone();
    let upkeep = spawn_thread("prometheus-upkeep", move || {
        loop {
            thread::sleep(PROM_UPKEEP_INTERVAL);
            upkeep_handle.run_upkeep();
        }
    })
    .context("Failed to spawn prometheus upkeep thread")?;
    let _ = PROM_UPKEEP_THREAD.set(upkeep);

    let _ = PROM_HANDLE.set(handle);
    PROM_HANDLE
        .get()
        .ok_or_else(|| anyhow!("prometheus handle missing after install"))
}

/// Access the Prometheus handle when already initialised.
pub(crate) fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROM_HANDLE.get()
}

fn describe_metrics() {
    metrics::describe_counter!(
        "stadium_polls_total",
        "Backend poll completions by outcome"
    );
    metrics::describe_histogram!(
        "stadium_poll_seconds",
        metrics::Unit::Seconds,
        "Round trip of GET /data"
    );
    metrics::describe_counter!(
        "stadium_stale_responses_total",
        "Poll completions discarded because a later dispatch was already applied"
    );
    metrics::describe_gauge!("stadium_zone_count", "Zones in the last merged snapshot");
    metrics::describe_histogram!(
        "stadium_render_seconds",
        metrics::Unit::Seconds,
        "Heatmap draw and PNG encode time"
    );
    metrics::describe_counter!(
        "stadium_override_total",
        "Operator price overrides by kind and outcome"
    );
    metrics::describe_counter!(
        "stadium_data_stale_total",
        "Times the watchdog marked backend data stale"
    );
    metrics::describe_gauge!(
        "stadium_data_age_seconds",
        metrics::Unit::Seconds,
        "Age of the last successful merge"
    );
}

/// `RUST_LOG` when set, otherwise `info` (`debug` when verbose).
pub(crate) fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback_filter(verbose))
}

fn fallback_filter(verbose: bool) -> EnvFilter {
    EnvFilter::new(if verbose { "debug" } else { "info" })
}

/// Global fmt subscriber for the one-shot commands. `serve` layers its own
/// thread-scoped subscriber on top through [`enter_runtime`].
pub(crate) fn init_cli_logging() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(env_filter(false))
        .try_init();
}

/// Install tracing subscribers required for the dashboard based on telemetry options.
pub(crate) fn enter_runtime(opts: &TelemetryOptions, verbose: bool) -> TelemetryGuard {
    let env_filter = env_filter(verbose);

    let (chrome_layer, chrome_guard) = match opts.chrome_trace_path.as_ref() {
        Some(path) => match build_chrome_layer(path) {
            Ok((layer, guard)) => (Some(layer), Some(guard)),
            Err(err) => {
                tracing::warn!(
                    "failed to initialise chrome trace writer at {}: {err}",
                    path.display()
                );
                (None, None)
            }
        },
        None => (None, None),
    };

    let span_only_filter = filter_fn(|metadata| metadata.is_span());
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_timer(fmt::time::uptime())
        .with_filter(env_filter);

    let default_guard = tracing::subscriber::set_default(
        tracing_subscriber::registry()
            .with(chrome_layer.map(|chrome| chrome.with_filter(span_only_filter)))
            .with(fmt_layer)
            .with(tracing_error::ErrorLayer::default()),
    );

    TelemetryGuard {
        _default_guard: default_guard,
        _chrome_guard: chrome_guard,
    }
}

/// Spawn a thread that inherits the current tracing dispatcher.
pub(crate) fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}

fn build_chrome_layer(
    path: &Path,
) -> Result<
    (
        tracing_chrome::ChromeLayer<tracing_subscriber::Registry>,
        tracing_chrome::FlushGuard,
    ),
    std::io::Error,
> {
    let file = std::fs::File::create(path)?;
    let (layer, guard) = tracing_chrome::ChromeLayerBuilder::new()
        .writer(file)
        .include_args(true)
        .trace_style(tracing_chrome::TraceStyle::Threaded)
        .build();
    Ok((layer, guard))
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::filter::LevelFilter;

    use super::*;

    #[test]
    fn missing_rust_log_falls_back_to_info() {
        assert_eq!(fallback_filter(false).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(fallback_filter(true).max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn every_emitted_metric_is_described() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            describe_metrics();
            metrics::counter!("stadium_data_stale_total").increment(1);
            metrics::gauge!("stadium_data_age_seconds").set(7.0);
        });
        let rendered = handle.render();
        assert!(rendered.contains("# HELP stadium_data_stale_total"), "{rendered}");
        assert!(rendered.contains("# HELP stadium_data_age_seconds"), "{rendered}");
    }

    #[test]
    fn spawned_threads_keep_the_callers_dispatcher() {
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry());
        let outer = tracing::dispatcher::get_default(|current| format!("{current:?}"));
        let inner = spawn_thread("telemetry-test", || {
            tracing::dispatcher::get_default(|current| format!("{current:?}"))
        })
        .unwrap()
        .join()
        .unwrap();
        assert_eq!(inner, outer);
    }
}
