//! # pihub
//!
//! Serves the module runtime over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Simulated board, default config path
//! pihub --simulate
//!
//! # Real hardware, custom listener
//! pihub --config /etc/pihub/pihub.toml --bind 0.0.0.0:8080
//!
//! # Verbose JSON logs
//! pihub -s -v --json
//! ```

use clap::Parser;
use pihub_api::{AppState, HubConfig, router};
use pihub_common::config::{ConfigLoader, LogLevel};
use pihub_common::resources::ResourceProvider;
use pihub_hal::{ModuleManager, ModuleRegistry, PlatformKind, create_platform};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

/// pihub - network-addressable hub for hardware modules
#[derive(Parser, Debug)]
#[command(name = "pihub")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Network-addressable hub for hardware modules")]
#[command(long_about = None)]
struct Args {
    /// Path to the hub configuration file
    #[arg(short, long, default_value = "pihub.toml")]
    config: PathBuf,

    /// Listen address, overrides `[server] bind`
    #[arg(short, long)]
    bind: Option<String>,

    /// Force the simulated platform
    #[arg(short = 's', long)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("pihub failed: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (mut config, found) = HubConfig::load_or_default(&args.config)?;

    setup_tracing(&args, config.shared.log_level);

    info!("pihub v{} starting...", env!("CARGO_PKG_VERSION"));
    if !found {
        warn!("No config at {:?}, using defaults", args.config);
    }

    if let Some(bind) = args.bind.clone() {
        config.server.bind = bind;
    }
    if args.simulate {
        info!("Simulation mode enabled");
        config.hardware.platform = PlatformKind::Simulation;
    }
    config.validate()?;

    let platform = create_platform(&config.hardware)?;
    let resources = Arc::new(ResourceProvider::new(platform));
    let manager = Arc::new(ModuleManager::new(
        ModuleRegistry::with_builtin_modules(),
        resources,
    ));

    let state = AppState::new(
        Arc::clone(&manager),
        config.server.request_timeout(),
        &config.shared.service_name,
    );

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        "'{}' listening on {} (platform: {})",
        config.shared.service_name,
        listener.local_addr()?,
        manager.resources().platform_name()
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping modules...");
    tokio::task::spawn_blocking(move || manager.shutdown()).await??;

    info!("pihub shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}

/// Setup tracing subscriber from CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::from(configured)
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
