//! Actix Web dashboard server exposing the store, the rendered heatmap, the
//! zone layout, and the override commands.
//!
//! The server runs on a dedicated thread so the sync and render workers never
//! share an executor with request handling. Override commands use the blocking
//! backend client and are moved off the executor with `web::block`.

use std::{sync::Arc, time::Duration};

use actix_web::{
    App, HttpResponse, HttpServer,
    http::header,
    web::{self, Bytes},
};
use anyhow::{Context, Result};
use async_stream::stream;
use heatmap::ZoneLayout;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::to_string;
use tokio::sync::oneshot;
use tracing::error;

use crate::{
    dashboard::{
        control::{ControlError, ControlPlane, OverrideApplied},
        data::{OverrideResponse, PriceRequest, SharedFrame, SharedStore},
        telemetry::spawn_thread,
    },
    html::dashboard_html::DASHBOARD_INDEX_HTML,
};

const STATE_STREAM_INTERVAL: Duration = Duration::from_millis(500);

/// Shared state backing HTTP handlers.
#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) store: SharedStore,
    pub(crate) frame: SharedFrame,
    pub(crate) layout: Arc<ZoneLayout>,
    pub(crate) control: ControlPlane,
    pub(crate) video_feed_url: String,
    pub(crate) metrics: Option<&'static PrometheusHandle>,
}

#[derive(Default)]
/// Handle for the dashboard server thread.
pub(crate) struct DashboardServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl DashboardServer {
    /// Signal the server to stop and block until the thread exits.
    pub(crate) fn stop(self) {
        if let Some(tx) = self.shutdown {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle {
            let _ = handle.join();
        }
    }
}

/// Register every dashboard route on an app.
pub(crate) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index_route))
        .route("/api/zone-layout", web::get().to(layout_handler))
        .route("/state", web::get().to(state_handler))
        .route("/stream_state", web::get().to(stream_state_handler))
        .route("/heatmap.png", web::get().to(heatmap_handler))
        .route("/heatmap.json", web::get().to(heatmap_info_handler))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/video_feed", web::get().to(video_feed_handler))
        .route("/api/zones/{name}/price", web::post().to(set_price_handler))
        .route("/api/zones/{name}/auto", web::post().to(set_auto_handler));
}

/// Spawn the dashboard server thread and return a handle that can stop it.
pub(crate) fn spawn_dashboard_server(
    state: ServerState,
    bind: (String, u16),
) -> Result<DashboardServer> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = spawn_thread("stadium-http", move || {
        if let Err(err) = actix_web::rt::System::new().block_on(async move {
            let server = HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(state.clone()))
                    .configure(configure)
            })
            .bind(bind)?
            .run();

            let srv_handle = server.handle();
            actix_web::rt::spawn(async move {
                let _ = shutdown_rx.await;
                srv_handle.stop(true).await;
            });

            server.await
        }) {
            error!("HTTP server error: {err}");
        }
    })
    .context("Failed to spawn dashboard server thread")?;
    Ok(DashboardServer {
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    })
}

fn with_cors(builder: &mut actix_web::HttpResponseBuilder) -> &mut actix_web::HttpResponseBuilder {
    builder
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST"))
}

/// Serve the dashboard page.
async fn index_route() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(DASHBOARD_INDEX_HTML)
}

/// Normalized zone polygons.
async fn layout_handler(state: web::Data<ServerState>) -> HttpResponse {
    with_cors(&mut HttpResponse::Ok()).json(state.layout.as_ref())
}

/// Current store snapshot as JSON.
async fn state_handler(state: web::Data<ServerState>) -> HttpResponse {
    match state.store.lock() {
        Ok(store) => with_cors(&mut HttpResponse::Ok()).json(store.view()),
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

/// Stream store snapshots as Server-Sent Events, one event per revision.
async fn stream_state_handler(state: web::Data<ServerState>) -> HttpResponse {
    let state = state.clone();
    let stream = stream! {
        yield Ok::<Bytes, actix_web::Error>(Bytes::from_static(b"retry: 1000\n\n"));
        let mut interval = actix_web::rt::time::interval(STATE_STREAM_INTERVAL);
        let mut last_revision: Option<u64> = None;
        loop {
            interval.tick().await;
            let view = state.store.lock().ok().map(|store| store.view());
            match view {
                Some(view) if last_revision != Some(view.revision) => {
                    last_revision = Some(view.revision);
                    match to_string(&view) {
                        Ok(json) => {
                            let chunk = format!("id: {}\ndata: {}\n\n", view.revision, json);
                            yield Ok::<Bytes, actix_web::Error>(Bytes::from(chunk));
                        }
                        Err(err) => {
                            let chunk = format!("event: error\ndata: {}\n\n", err);
                            yield Ok::<Bytes, actix_web::Error>(Bytes::from(chunk));
                        }
                    }
                }
                _ => {
                    yield Ok::<Bytes, actix_web::Error>(Bytes::from_static(b": keep-alive\n\n"));
                }
            }
        }
    };

    with_cors(&mut HttpResponse::Ok())
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Content-Type", "text/event-stream"))
        .append_header(("Connection", "keep-alive"))
        .streaming(stream)
}

/// Latest rendered heatmap.
async fn heatmap_handler(state: web::Data<ServerState>) -> HttpResponse {
    let frame = state.frame.lock().ok().and_then(|guard| guard.clone());
    match frame {
        Some(packet) => with_cors(&mut HttpResponse::Ok())
            .append_header(("Cache-Control", "no-cache"))
            .append_header(("X-Frame-Number", packet.frame_number.to_string()))
            .content_type("image/png")
            .body(packet.png),
        None => HttpResponse::NoContent().finish(),
    }
}

/// Draw report of the latest heatmap.
async fn heatmap_info_handler(state: web::Data<ServerState>) -> HttpResponse {
    let guard = match state.frame.lock() {
        Ok(guard) => guard,
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    match guard.as_ref() {
        Some(packet) => with_cors(&mut HttpResponse::Ok()).json(packet.info()),
        None => HttpResponse::NoContent().finish(),
    }
}

async fn metrics_handler(state: web::Data<ServerState>) -> HttpResponse {
    match state.metrics {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}

/// The camera stream is served by the backend; point the browser there.
async fn video_feed_handler(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::TemporaryRedirect()
        .insert_header((header::LOCATION, state.video_feed_url.clone()))
        .finish()
}

async fn set_price_handler(
    path: web::Path<String>,
    body: web::Json<PriceRequest>,
    state: web::Data<ServerState>,
) -> HttpResponse {
    let zone = path.into_inner();
    let price = body.price;
    let control = state.control.clone();
    let command_zone = zone.clone();
    let result = web::block(move || control.set_manual_price(&command_zone, price)).await;
    override_response(zone, "manual", result)
}

async fn set_auto_handler(path: web::Path<String>, state: web::Data<ServerState>) -> HttpResponse {
    let zone = path.into_inner();
    let control = state.control.clone();
    let command_zone = zone.clone();
    let result = web::block(move || control.set_auto_price(&command_zone)).await;
    override_response(zone, "auto", result)
}

fn override_response(
    zone: String,
    mode: &'static str,
    result: Result<Result<OverrideApplied, ControlError>, actix_web::error::BlockingError>,
) -> HttpResponse {
    match result {
        Ok(Ok(outcome)) => with_cors(&mut HttpResponse::Ok()).json(OverrideResponse {
            zone,
            mode,
            applied: outcome.applied,
            view: outcome.zone,
        }),
        Ok(Err(err @ ControlError::InvalidPrice(_))) => {
            with_cors(&mut HttpResponse::BadRequest()).json(error_body(&err))
        }
        Ok(Err(err @ ControlError::Backend(_))) => {
            with_cors(&mut HttpResponse::BadGateway()).json(error_body(&err))
        }
        Ok(Err(err @ ControlError::StorePoisoned)) => {
            HttpResponse::InternalServerError().json(error_body(&err))
        }
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

fn error_body(err: &ControlError) -> serde_json::Value {
    serde_json::json!({ "error": err.to_string() })
}
