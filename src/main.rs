//! phoenix-bcp - remote browser control plane.
//!
//! Multi-protocol front door (REST, WebSocket, gRPC, MCP) over a pooled
//! headless-browser backend, generalized from the teacher's single-purpose
//! conversation-state-machine server.

mod actions;
mod audit;
mod auth;
mod config;
mod driver;
mod error;
mod executor;
mod metrics;
mod pages;
mod pool;
mod protocol;
mod server;
mod session;

#[cfg(test)]
mod integration_tests;

use clap::{Parser, Subcommand};
use config::Config;
use server::Services;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "phoenix-bcp", version, about = "Remote browser control plane")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the control plane (REST/WS on one HTTP port, gRPC on port+1).
    Start,
    /// Load and validate configuration, then exit.
    ValidateConfig,
    /// Run the MCP tool surface over stdio.
    Mcp,
}

fn init_logging(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("phoenix_bcp={}", config.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        config::LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false).with_span_list(false))
            .init(),
        config::LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Start);

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(64);
        }
    };

    match command {
        Command::ValidateConfig => {
            println!("configuration OK: port={}, pool={}..={}", config.port, config.browser_pool_min_size, config.browser_pool_max_size);
        }
        Command::Start => {
            init_logging(&config);
            if let Err(err) = run(config).await {
                tracing::error!(error = %err, "fatal error");
                std::process::exit(1);
            }
        }
        Command::Mcp => {
            init_logging(&config);
            let services = match Services::build(config).await {
                Ok(services) => services,
                Err(err) => {
                    tracing::error!(error = %err, "failed to start services");
                    std::process::exit(1);
                }
            };
            if let Err(err) = services.serve_mcp_stdio().await {
                tracing::error!(error = %err, "mcp server failed");
                std::process::exit(1);
            }
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services::build(config).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(());
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("SIGINT received"),
            _ = sigterm.recv() => tracing::info!("SIGTERM received"),
        }
        let _ = shutdown_tx.send(());
    });

    let http = services.serve_http(wait_for_shutdown(shutdown_rx.clone()));
    let grpc = services.serve_grpc(wait_for_shutdown(shutdown_rx));

    let (http_result, grpc_result) = tokio::join!(http, grpc);
    if let Err(err) = http_result {
        tracing::error!(error = %err, "HTTP server exited with error");
    }
    if let Err(err) = grpc_result {
        tracing::error!(error = %err, "gRPC server exited with error");
    }

    Ok(())
}

async fn wait_for_shutdown(mut rx: tokio::sync::watch::Receiver<()>) {
    let _ = rx.changed().await;
}
