//! API gateway binary.
//!
//! Startup order: configuration, logging, metrics, background tasks (hub
//! loop, rate-limit sweeper, signal listener), then the listener. Traffic is
//! only accepted once everything behind it is running.

use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;

use api_gateway::config::{self, GatewayConfig};
use api_gateway::lifecycle::{shutdown_on_signal, Shutdown};
use api_gateway::observability::{logging, metrics};
use api_gateway::{AppState, HttpServer};

#[derive(Parser)]
#[command(name = "api-gateway", version, about = "API gateway for the news platform")]
struct Args {
    /// TOML configuration file. Defaults plus environment overrides are used
    /// when the file does not exist.
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "gateway.toml")]
    config: PathBuf,
}

fn load(path: &Path) -> Result<GatewayConfig, config::ConfigError> {
    if path.exists() {
        config::load_config(path)
    } else {
        config::load_from_env()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    logging::init_logging(&config.logging);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");
    tracing::info!(
        bind_address = %config.server.bind_address,
        services = config.services.len(),
        routes = config.routes.len(),
        auth_enabled = config.auth.enabled,
        rate_limit_enabled = config.rate_limit.enabled,
        websocket_enabled = config.websocket.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let shutdown = Shutdown::new();
    let (state, hub) = AppState::new(config);

    let hub_task = tokio::spawn(hub.run(shutdown.subscribe()));
    let sweeper_task = tokio::spawn(state.rate_limiter.clone().run_sweeper(shutdown.subscribe()));
    tokio::spawn(shutdown_on_signal(shutdown.clone()));

    let server = HttpServer::new(state);
    let result = server.run(listener, shutdown.subscribe()).await;

    // The server can also stop on its own (listener error); stop the rest too.
    shutdown.trigger();
    let _ = tokio::join!(hub_task, sweeper_task);

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
