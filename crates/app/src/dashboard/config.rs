//! Configuration parsing for the dashboard.
//!
//! CLI arguments are translated once into a validated `DashboardConfig`; the
//! workers never look at flags again.

use std::path::PathBuf;

use anyhow::{Result, bail};
use backend_client::DEFAULT_BACKEND_URL;
use clap::Args;
use heatmap::{DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH};

pub(crate) const DEFAULT_LAYOUT_PATH: &str = "config.json";
pub(crate) const DEFAULT_BIND_HOST: &str = "0.0.0.0";
pub(crate) const DEFAULT_BIND_PORT: u16 = 8080;

#[derive(Clone, Debug)]
/// Canonical configuration shared by every dashboard worker.
pub struct DashboardConfig {
    /// Analytics backend base URL without a trailing slash.
    pub backend_url: String,
    /// Pixel-space zone layout file.
    pub layout_path: PathBuf,
    /// Optional stadium still drawn under the heatmap.
    pub background: Option<PathBuf>,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub bind_host: String,
    pub bind_port: u16,
    /// Log every poll completion, not just failures.
    pub verbose: bool,
    pub telemetry: TelemetryOptions,
}

#[derive(Clone, Debug, Default)]
/// Optional tracing outputs.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing worker spans.
    pub chrome_trace_path: Option<PathBuf>,
}

/// Where the analytics backend lives. Shared by every subcommand that talks to it.
#[derive(Clone, Debug, Args)]
pub struct BackendArgs {
    /// Analytics backend base URL.
    #[arg(
        long = "backend-url",
        env = "STADIUM_BACKEND_URL",
        value_name = "URL",
        default_value = DEFAULT_BACKEND_URL
    )]
    pub backend_url: String,
}

impl BackendArgs {
    /// Validated base URL with any trailing slash removed.
    pub(crate) fn resolve(&self) -> Result<String> {
        let url = self.backend_url.trim().trim_end_matches('/');
        if url.is_empty() {
            bail!("--backend-url must not be empty");
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("--backend-url must start with http:// or https:// (got {url})");
        }
        Ok(url.to_string())
    }
}

/// Layout and canvas options shared by `serve` and `render`.
#[derive(Clone, Debug, Args)]
pub struct CanvasArgs {
    /// Pixel-space zone layout file.
    #[arg(long = "zones", value_name = "PATH", default_value = DEFAULT_LAYOUT_PATH)]
    pub zones: PathBuf,
    /// Stadium still drawn under the heatmap.
    #[arg(long = "background", value_name = "PATH")]
    pub background: Option<PathBuf>,
    /// Canvas width in pixels.
    #[arg(long = "width", value_name = "PX", default_value_t = DEFAULT_CANVAS_WIDTH)]
    pub width: u32,
    /// Canvas height in pixels.
    #[arg(long = "height", value_name = "PX", default_value_t = DEFAULT_CANVAS_HEIGHT)]
    pub height: u32,
}

impl CanvasArgs {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("--width and --height must be positive");
        }
        Ok(())
    }
}

/// CLI arguments accepted by the `serve` subcommand.
#[derive(Debug, Args)]
pub struct ServeCliArgs {
    #[command(flatten)]
    pub backend: BackendArgs,
    #[command(flatten)]
    pub canvas: CanvasArgs,
    /// Address the dashboard HTTP server binds to.
    #[arg(long = "bind", value_name = "HOST", default_value = DEFAULT_BIND_HOST)]
    pub bind: String,
    /// Port the dashboard HTTP server listens on.
    #[arg(long = "port", value_name = "PORT", default_value_t = DEFAULT_BIND_PORT)]
    pub port: u16,
    /// Log every poll completion.
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
}

impl TryFrom<ServeCliArgs> for DashboardConfig {
    type Error = anyhow::Error;

    fn try_from(args: ServeCliArgs) -> Result<Self> {
        let backend_url = args.backend.resolve()?;
        args.canvas.validate()?;
        if args.bind.trim().is_empty() {
            bail!("--bind must not be empty");
        }

        Ok(Self {
            backend_url,
            layout_path: args.canvas.zones,
            background: args.canvas.background,
            canvas_width: args.canvas.width,
            canvas_height: args.canvas.height,
            bind_host: args.bind,
            bind_port: args.port,
            verbose: args.verbose,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
            },
        })
    }
}

#[cfg(test)]
pub(crate) fn test_config(backend_url: &str, layout_path: PathBuf) -> DashboardConfig {
    DashboardConfig {
        backend_url: backend_url.to_string(),
        layout_path,
        background: None,
        canvas_width: 200,
        canvas_height: 150,
        bind_host: DEFAULT_BIND_HOST.to_string(),
        bind_port: DEFAULT_BIND_PORT,
        verbose: false,
        telemetry: TelemetryOptions::default(),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        serve: ServeCliArgs,
    }

    fn parse(args: &[&str]) -> Result<DashboardConfig> {
        let harness = Harness::try_parse_from(std::iter::once("stadium").chain(args.iter().copied()))?;
        DashboardConfig::try_from(harness.serve)
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = parse(&["--backend-url", "http://localhost:8000"]).unwrap();
        assert_eq!(config.backend_url, "http://localhost:8000");
        assert_eq!(config.layout_path, PathBuf::from("config.json"));
        assert_eq!((config.canvas_width, config.canvas_height), (800, 600));
        assert_eq!(config.bind_host, "0.0.0.0");
        assert_eq!(config.bind_port, 8080);
        assert!(config.background.is_none());
        assert!(config.telemetry.chrome_trace_path.is_none());
    }

    #[test]
    fn trailing_slash_is_stripped() {
        let config = parse(&["--backend-url", "https://stadium.example/api/"]).unwrap();
        assert_eq!(config.backend_url, "https://stadium.example/api");
    }

    #[test]
    fn rejects_non_http_backend() {
        assert!(parse(&["--backend-url", "ftp://stadium"]).is_err());
        assert!(parse(&["--backend-url", "/"]).is_err());
    }

    #[test]
    fn rejects_empty_canvas() {
        assert!(parse(&["--backend-url", "http://x", "--width", "0"]).is_err());
    }

    #[test]
    fn canvas_and_server_flags_are_carried() {
        let config = parse(&[
            "--backend-url",
            "http://x",
            "--zones",
            "layout.json",
            "--background",
            "stadium.jpg",
            "--width",
            "1024",
            "--height",
            "768",
            "--port",
            "9000",
            "--chrome-trace",
            "trace.json",
            "--verbose",
        ])
        .unwrap();
        assert_eq!(config.layout_path, PathBuf::from("layout.json"));
        assert_eq!(config.background, Some(PathBuf::from("stadium.jpg")));
        assert_eq!((config.canvas_width, config.canvas_height), (1024, 768));
        assert_eq!(config.bind_port, 9000);
        assert_eq!(
            config.telemetry.chrome_trace_path,
            Some(PathBuf::from("trace.json"))
        );
        assert!(config.verbose);
    }
}
