//! limit-gateway
//!
//! A rate-limiting reverse proxy built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────┐
//!                      │                  LIMIT GATEWAY                    │
//!                      │                                                   │
//!   Client Request     │  ┌─────────┐   ┌─────────┐   ┌──────────────┐     │
//!   ───────────────────┼─▶│   net   │──▶│  http   │──▶│ rate limiter │     │
//!                      │  │listener │   │ server  │   │  (identity)  │     │
//!                      │  └─────────┘   └─────────┘   └──────┬───────┘     │
//!                      │                                      │             │
//!                      │                      ┌───────────────┼──────┐      │
//!                      │                      ▼               ▼      │      │
//!                      │               ┌────────────┐  ┌───────────┐ │      │
//!                      │               │  counter   │  │ forwarder │─┼──────┼──▶ Origin
//!                      │               │   store    │  │ (bulkhead)│ │      │
//!                      │               └────────────┘  └───────────┘ │      │
//!   Client Response    │                                             │      │
//!   ◀──────────────────┼──── 429 / 502 / 503 / 504 or upstream reply ┘      │
//!                      └──────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::Parser;

use limit_gateway::config::cli::Cli;
use limit_gateway::config::loader::read_config;
use limit_gateway::config::validation::validate_config;
use limit_gateway::config::GatewayConfig;
use limit_gateway::lifecycle::startup::build_state;
use limit_gateway::lifecycle::Shutdown;
use limit_gateway::net::listener;
use limit_gateway::observability::{logging, metrics};
use limit_gateway::HttpServer;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match read_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("limit-gateway: failed to load {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => GatewayConfig::default(),
    };
    cli.apply(&mut config);

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "limit-gateway starting");

    if let Err(errors) = validate_config(&config) {
        for e in &errors {
            tracing::error!(error = %e, "Invalid configuration");
        }
        return ExitCode::FAILURE;
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.origin,
        store = ?config.store.backend,
        failure_mode = ?config.rate_limit.failure_mode,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                    return ExitCode::FAILURE;
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Invalid metrics address");
                return ExitCode::FAILURE;
            }
        }
    }

    let state = match build_state(&config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let listener = match listener::bind(&config.listener).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    shutdown.trigger_on_signal();

    let server = HttpServer::new(config, state);
    if let Err(e) = server.run(listener, receiver).await {
        tracing::error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
