//! Qetch CLI - Command-line front end for the fetch engine
//!
//! Downloads raw links over parallel byte-range requests, probes URLs and
//! manages the engine settings file.

mod commands;
mod output;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Qetch - Fragment-aware downloader
#[derive(Parser)]
#[command(name = "qetch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path of the settings file
    #[arg(long, env = "QETCH_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "human")]
    output: OutputFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a URL
    Get {
        /// URL to download
        url: String,

        /// Output file path (defaults to the URL's file name)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Fragments fetched at once
        #[arg(short = 'f', long)]
        fragments: Option<usize>,

        /// Parallel connections per fragment
        #[arg(short = 'c', long)]
        connections: Option<usize>,

        /// Don't show a progress bar
        #[arg(short, long)]
        quiet: bool,
    },

    /// Probe URLs for size and range support
    Probe {
        /// URLs to probe
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Show or reset settings
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show all settings
    Show,

    /// Print the settings file location
    Path,

    /// Reset to defaults
    Reset,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Determine settings file
    let config_path = cli.config.unwrap_or_else(|| {
        dirs::config_dir()
            .map(|d| d.join("qetch"))
            .unwrap_or_else(|| PathBuf::from(".qetch"))
            .join("settings.json")
    });

    match cli.command {
        Commands::Get {
            url,
            output,
            fragments,
            connections,
            quiet,
        } => {
            commands::get(
                &config_path,
                &url,
                output,
                fragments,
                connections,
                quiet,
                cli.output,
            )
            .await?
        }

        Commands::Probe { urls } => commands::probe_urls(&config_path, urls, cli.output).await?,

        Commands::Config { action } => {
            commands::config_action(&config_path, action, cli.output).await?
        }
    }

    Ok(())
}
