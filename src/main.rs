#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # wrp-gateway
//!
//! HTTP front door for devices behind an XMiDT cluster. REST calls are
//! translated into WDMP commands, wrapped in msgpack WRP messages and sent
//! to the cluster; the device's answer comes back as the HTTP response.
//!
//! ## Subcommands
//!
//! - `wrp-gateway serve` (default): run the HTTP server
//!
//! ## API surface
//!
//! | Method | Path                                             | Auth | Description                     |
//! |--------|--------------------------------------------------|------|---------------------------------|
//! | GET    | `/api/health`                                    | No   | Liveness probe                  |
//! | GET    | `/api/{v}/device/{deviceid}/stat`                | Yes  | Device statistics               |
//! | GET    | `/api/{v}/device/{deviceid}/{service}`           | Yes  | `GET` / `GET_ATTRIBUTES`        |
//! | PATCH  | `/api/{v}/device/{deviceid}/{service}`           | Yes  | `SET` family                    |
//! | DELETE | `/api/{v}/device/{deviceid}/{service}/{row}`     | Yes  | `DELETE_ROW`                    |
//! | PUT    | `/api/{v}/device/{deviceid}/{service}/{table}`   | Yes  | `REPLACE_ROWS`                  |
//! | POST   | `/api/{v}/device/{deviceid}/{service}/{table}`   | Yes  | `ADD_ROW`                       |
//! | POST   | `/api/v3/hook`                                   | Yes  | Register a webhook              |
//! | POST   | `/api/v2/hook`                                   | Yes  | Legacy registration (rewritten) |
//! | GET    | `/api/{v}/hooks`                                 | Yes  | List webhooks                   |
//!
//! `{v}` is `v2` or `v3`. Auth applies only when `[[auth.keys]]` is set.

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use wrp_gateway::{AppState, Config};

/// HTTP to WRP translation gateway.
#[derive(Parser)]
#[command(name = "wrp-gateway", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to TOML config file (when no subcommand is given).
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default when no subcommand given).
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Serve) | None => run_server(cli.config.as_deref()).await,
    }
}

async fn run_server(config_path: Option<&str>) {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter("error").init();
            error!("{e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("wrp-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    info!("XMiDT cluster: {}", config.xmidt.url);
    info!("Listening on {}", config.server.listen);

    if config.auth.keys.is_empty() {
        warn!("No [[auth.keys]] configured, inbound requests are not authenticated");
    }

    let listen = config.server.listen.clone();
    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            error!("Startup failed: {e}");
            std::process::exit(1);
        }
    };
    info!("Outbound credentials: {}", state.acquirer_kind);

    let app = wrp_gateway::router(state);

    let listener = match TcpListener::bind(&listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {listen}: {e}");
            std::process::exit(1);
        }
    };

    info!("Server ready");

    // Graceful shutdown
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("Server error");

    info!("Goodbye");
}
