//! Hive Server
//!
//! Runs the configured bees and chains until interrupted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use hive::app::App;
use hive::config::HiveConfig;
use hive_runtime::FactoryRegistry;

/// Hive automation server
#[derive(Parser, Debug)]
#[command(name = "hive")]
#[command(about = "Event-driven automation host", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "hive.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Print the bundled plugin types as JSON and exit
    #[arg(long)]
    list_factories: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hive=info,hive_runtime=info,hive_bees=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(args.log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!args.log_json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    let registry = FactoryRegistry::new_shared();
    hive_bees::register_all(&registry).context("Failed to register bundled bees")?;

    if args.list_factories {
        println!("{}", serde_json::to_string_pretty(&registry.infos())?);
        return Ok(());
    }

    info!("Starting Hive v{}", env!("CARGO_PKG_VERSION"));

    let config = HiveConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    let app = App::start(config, registry).await;
    shutdown_signal().await;
    app.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}
