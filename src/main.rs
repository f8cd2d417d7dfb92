//! Message API service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────────▶ axum::serve ─▶ request id ─▶ observe ─▶ handler
//!                                                  │           │
//!                                                  │           ▼
//!                                                  │     SharedConfig
//!                                                  │    (read / replace)
//!                                                  ▼
//!                          metrics ─▶ span end ─▶ access log
//!                          (inline)   (detached, tracked until drained)
//!
//!     GET /metrics ─▶ Prometheus text exposition (not observed)
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use micro_api::config::load_config;
use micro_api::observability::logging::init_logging;
use micro_api::{HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "micro-api", version, about = "Message API with request observability")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address (e.g. 127.0.0.1:9000).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.observability.environment,
        "micro-api starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        shutdown_grace_secs = config.listener.shutdown_grace_secs,
        read_delay_ms = config.message.read_delay_ms,
        tracing_enabled = config.observability.tracing_enabled,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config)?;
    tracing::info!(message = %server.message().read(), "Message seeded");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
