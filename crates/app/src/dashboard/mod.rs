//! Live stadium dashboard: polls the analytics backend, keeps the snapshot
//! store current, renders the crowd heatmap, and serves all of it over HTTP.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `context`: Process-wide client, clock, store, and layout.
//! - `pipeline`: Starts, supervises, and restarts the workers.
//! - `sync`: Folds poll completions into the store.
//! - `render`: Redraws and publishes the heatmap PNG.
//! - `control`: Operator price overrides.
//! - `server`: Actix Web dashboard endpoints.
//! - `watchdog`: Worker heartbeats and backend data freshness.
//! - `data`: Shared structs passed between workers and handlers.

/// Re-export dashboard settings so callers can configure runs without reaching
/// into submodules.
pub use config::{BackendArgs, CanvasArgs, DashboardConfig, ServeCliArgs};
/// Launch the dashboard with a ready-made configuration.
pub use pipeline::run;

pub(crate) use control::validate_price;
pub(crate) use render::{RenderSettings, render_snapshot};
pub(crate) use telemetry::init_cli_logging;

mod config;
mod context;
mod control;
mod data;
mod pipeline;
mod render;
mod server;
mod sync;
mod telemetry;
mod watchdog;
