use std::path::PathBuf;

use anyhow::{Context, Result};
use backend_client::BackendClient;
use clap::{Parser, Subcommand};
use heatmap::{ZoneLayout, load_layout};
use tracing::{info, warn};

use crate::dashboard::{
    self, BackendArgs, CanvasArgs, DashboardConfig, RenderSettings, ServeCliArgs, render_snapshot,
    validate_price,
};

/// Stadium crowd heatmap and pricing dashboard.
#[derive(Debug, Parser)]
#[command(name = "stadium", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll the backend and serve the live dashboard.
    Serve(ServeCliArgs),
    /// Print the normalized form of a pixel-space zone layout.
    Normalize {
        /// Layout file written by the zone setup tool.
        #[arg(value_name = "CONFIG", default_value = "config.json")]
        config: PathBuf,
    },
    /// Fetch one snapshot and write the heatmap to a PNG file.
    Render {
        #[command(flatten)]
        backend: BackendArgs,
        #[command(flatten)]
        canvas: CanvasArgs,
        /// Output PNG path.
        #[arg(long = "output", short = 'o', value_name = "PATH", default_value = "heatmap.png")]
        output: PathBuf,
    },
    /// Pin a zone to a manual price.
    SetPrice {
        #[command(flatten)]
        backend: BackendArgs,
        #[arg(value_name = "ZONE")]
        zone: String,
        #[arg(value_name = "PRICE", allow_negative_numbers = true)]
        price: f64,
    },
    /// Return a zone to automatic pricing.
    SetAuto {
        #[command(flatten)]
        backend: BackendArgs,
        #[arg(value_name = "ZONE")]
        zone: String,
    },
}

pub fn handle_command(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve(args) => {
            let config = DashboardConfig::try_from(args)?;
            dashboard::run(config)
        }
        Command::Normalize { config } => {
            let layout = load_layout(&config)?;
            println!("{}", serde_json::to_string_pretty(&layout)?);
            Ok(())
        }
        Command::Render {
            backend,
            canvas,
            output,
        } => {
            canvas.validate()?;
            let client = client_for(&backend)?;
            let layout = match load_layout(&canvas.zones) {
                Ok(layout) => layout,
                Err(err) => {
                    warn!("{err}; rendering without zones");
                    ZoneLayout::default()
                }
            };
            let settings = RenderSettings {
                layout: layout.into(),
                background: canvas.background,
                width: canvas.width,
                height: canvas.height,
            };
            let report = render_snapshot(&client, &settings, &output)?;
            info!(
                "Wrote {} ({} zones, {} labelled, max count {})",
                output.display(),
                report.zones_drawn(),
                report.markers_drawn,
                report.max_count
            );
            Ok(())
        }
        Command::SetPrice {
            backend,
            zone,
            price,
        } => {
            let price = validate_price(price)?;
            client_for(&backend)?
                .set_manual_price(&zone, price)
                .with_context(|| format!("Failed to set price for {zone}"))?;
            println!("Manual price {price:.2} set for {zone}");
            Ok(())
        }
        Command::SetAuto { backend, zone } => {
            client_for(&backend)?
                .set_auto_price(&zone)
                .with_context(|| format!("Failed to resume automatic pricing for {zone}"))?;
            println!("Automatic pricing resumed for {zone}");
            Ok(())
        }
    }
}

fn client_for(backend: &BackendArgs) -> Result<BackendClient> {
    let url = backend.resolve()?;
    BackendClient::new(&url).with_context(|| format!("Failed to build client for {url}"))
}
