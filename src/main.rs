use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scrapegate::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "scrapegate",
    version,
    about = "License-gated, load-aware dispatch of scraping jobs to worker servers",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true, env = "SCRAPEGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the config file
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the license server
    LicenseServer {
        /// Override the bind address (host:port)
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Run the public dispatcher
    Dispatcher {
        /// Override the bind address (host:port)
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Run a worker (scraper server)
    Worker {
        /// Override the bind address (host:port)
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Override the scraper definition directory
        #[arg(long)]
        plugin_dir: Option<PathBuf>,
    },

    /// Run the admin API
    Admin {
        /// Override the bind address (host:port)
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(format) = cli.log_format {
        config.set_log_format(format)?;
    }

    // Initialize tracing/logging
    setup_tracing(&config.logging.level, &config.logging.format, cli.verbose)?;

    if let Err(e) = scrapegate::metrics::init_metrics() {
        tracing::warn!("Metrics disabled: {}", e);
    }

    tracing::info!(config = ?cli.config, "scrapegate starting");

    match cli.command {
        Commands::LicenseServer { bind } => {
            tracing::info!(bind = ?bind, "Starting license server");
            commands::license_server(config, bind).await?;
        }

        Commands::Dispatcher { bind } => {
            tracing::info!(
                bind = ?bind,
                workers = config.dispatcher.workers.len(),
                "Starting dispatcher"
            );
            commands::dispatcher(config, bind).await?;
        }

        Commands::Worker { bind, plugin_dir } => {
            if let Some(dir) = plugin_dir {
                config.worker.plugin_dir = dir;
            }
            tracing::info!(
                bind = ?bind,
                plugin_dir = %config.worker.plugin_dir.display(),
                "Starting worker"
            );
            commands::worker(config, bind).await?;
        }

        Commands::Admin { bind } => {
            tracing::info!(bind = ?bind, "Starting admin API");
            commands::admin(config, bind).await?;
        }
    }

    tracing::info!("scrapegate stopped");
    Ok(())
}

fn setup_tracing(level: &str, format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("scrapegate=debug,tower_http=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("scrapegate={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}
