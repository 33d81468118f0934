//! flightsearch-rs: concurrent flight search orchestration
//!
//! This is the main entry point for the application.

use anyhow::Result;
use flightsearch_rs::{
    config,
    errors::PATTERN_TABLE_VERSION,
    network::HttpClient,
    web::{create_router, AppState},
};
use std::net::SocketAddr;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    if std::env::args().skip(1).any(|a| a == "-h" || a == "--help") {
        print_usage();
        return Ok(());
    }
    if std::env::args().skip(1).any(|a| a == "-V" || a == "--version") {
        println!("flightsearch-rs {}", flightsearch_rs::VERSION);
        return Ok(());
    }

    // Initialize logging; the filter is swapped once settings are known
    let (filter, filter_handle) = reload::Layer::new(log_filter("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();

    info!("Starting flightsearch-rs v{}", flightsearch_rs::VERSION);

    // Load configuration
    let settings = config::load()?;
    filter_handle.reload(log_filter(settings.general.default_log_filter()))?;
    info!(
        "Loaded configuration for instance: {}",
        settings.general.instance_name
    );
    debug!("Error pattern table v{}", PATTERN_TABLE_VERSION);
    if settings.planner.api_key.is_none() {
        warn!("No planner API key configured; set OPENAI_API_KEY");
    }

    // Initialize HTTP client
    let client = HttpClient::with_settings(&settings.outgoing)?;
    info!("HTTP client initialized");

    info!(
        "Transport strategies: {}",
        settings
            .transport
            .strategies
            .iter()
            .map(|s| format!("{} ({})", s, s.endpoint()))
            .collect::<Vec<_>>()
            .join(", ")
    );

    // Create application state
    let state = AppState::new(settings.clone(), client)?;
    info!("Application state initialized");

    let app = create_router(state);

    let addr = SocketAddr::new(settings.server.bind_address.parse()?, settings.server.port);

    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// `RUST_LOG` if set, otherwise `default`
fn log_filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Print usage information
fn print_usage() {
    println!(
        r#"
flightsearch-rs v{}
Concurrent flight search orchestration service

USAGE:
    flightsearch-rs [OPTIONS]

OPTIONS:
    -h, --help             Print help information
    -V, --version          Print version information

ENVIRONMENT VARIABLES:
    FLIGHTSEARCH_SETTINGS_PATH   Path to settings.yml
    FLIGHTSEARCH_DEBUG           Enable debug mode (true/false)
    FLIGHTSEARCH_PORT            Server port
    FLIGHTSEARCH_BIND_ADDRESS    Bind address
    FLIGHTSEARCH_DEADLINE_SECS   Global search deadline
    FLIGHTSEARCH_MAX_RETRIES     Retries per transport strategy
    OPENAI_API_KEY               API key for the query planner
    OPENAI_BASE_URL              Base URL of an OpenAI-compatible API
    RUST_LOG                     Log filter (default: info, or debug when FLIGHTSEARCH_DEBUG is set)
"#,
        flightsearch_rs::VERSION
    );
}
