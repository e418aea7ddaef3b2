pub mod config;
pub mod data;
pub mod places;
pub mod processing;
pub mod render;
pub mod server;
pub mod session;
pub mod types;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config.toml";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file; built-in defaults apply when the default file is absent
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the interactive map (default)
    Serve,
    /// Resolve notable places and write the marker table as CSV
    Resolve {
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    let cli = Cli::parse();

    let (config_path, explicit) = match cli.config {
        Some(path) => (path, true),
        None => (PathBuf::from(DEFAULT_CONFIG), false),
    };
    let app_config = config::AppConfig::load(&config_path, explicit)?;
    let places = app_config.notable_places();

    // 1. Load Data
    let geo_data = data::load_data(&app_config)?;

    // 2. Resolve notable places
    let provinces = processing::build_provinces(geo_data.boundaries, &places);
    info!(provinces = provinces.len(), "built province table");
    let markers = processing::resolve_markers(&provinces, &geo_data.points, &places);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Resolve { output } => {
            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("Failed to create output file: {:?}", path))?;
                    processing::write_markers_csv(&markers, BufWriter::new(file))?;
                    info!(path = ?path, rows = markers.len(), "wrote marker table");
                }
                None => processing::write_markers_csv(&markers, io::stdout().lock())?,
            }
        }
        Commands::Serve => {
            let markers = Arc::new(markers);
            let figures = render::FigureBuilder::new(
                provinces,
                markers.clone(),
                app_config.style.clone(),
            );
            let state = server::AppState::new(
                figures,
                markers,
                Duration::from_secs(app_config.server.session_ttl_secs),
            );
            server::start_server(app_config, state).await?;
        }
    }

    Ok(())
}
