//! CreatorGpt Server
//!
//! HTTP backend for the CreatorGpt homework assistant.
//!
//! ## Features
//!
//! - **Accounts**: Email/password sign-up and sign-in with bearer tokens
//! - **Likes**: Transactional per-member like counters
//! - **Solving**: Subject-aware questions, with optional images, answered by Gemini
//! - **Contact & notice**: Contact form storage and the notice banner

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use creatorgpt::{Config, GeminiClient, DEFAULT_MODEL};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use creatorgpt_server::{api, db::SqliteStore, AppState};

/// CreatorGpt Server - accounts, likes and answer generation
#[derive(Parser, Debug)]
#[command(name = "creatorgpt-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// API key for the Gemini generation endpoint
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: String,

    /// Model used for answers
    #[arg(long, default_value = DEFAULT_MODEL, env = "CREATORGPT_MODEL")]
    model: String,

    /// Data directory for persistence
    #[arg(long, default_value = "data", env = "CREATORGPT_DATA_DIR")]
    data_dir: PathBuf,

    /// HTTP API port
    #[arg(long, default_value = "8080", env = "CREATORGPT_API_PORT")]
    api_port: u16,

    /// Log level
    #[arg(long, default_value = "info", env = "CREATORGPT_LOG_LEVEL")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting CreatorGpt Server");
    info!(data_dir = %args.data_dir.display(), "Data directory");
    info!(api_port = args.api_port, "HTTP API port");
    info!(model = %args.model, "Generation model");

    let config = Config::new()
        .with_gemini_api_key(args.gemini_api_key)
        .with_model(args.model);
    config.validate().context("Invalid configuration")?;

    // Ensure data directory exists
    tokio::fs::create_dir_all(&args.data_dir)
        .await
        .context("Failed to create data directory")?;

    // Initialize document store
    let db_path = args.data_dir.join("creatorgpt.db");
    let store = Arc::new(SqliteStore::open(&db_path).context("Failed to open database")?);
    info!(path = %db_path.display(), "Document store initialized");

    let generator = Arc::new(GeminiClient::new(&config).context("Failed to create generation client")?);

    let state = Arc::new(AppState::new(store, generator, config));

    // Start HTTP API server
    let api_addr: SocketAddr = ([0, 0, 0, 0], args.api_port).into();
    let app = api::router(state);

    info!(addr = %api_addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(api_addr)
        .await
        .context("Failed to bind API server")?;

    // Run with graceful shutdown on ctrl-c
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    info!("CreatorGpt Server shutting down");
    Ok(())
}

/// Wait for a ctrl-c signal for graceful shutdown
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received ctrl-c, initiating graceful shutdown"),
        Err(e) => {
            warn!(error = %e, "Failed to install ctrl-c handler, graceful shutdown disabled");
            std::future::pending::<()>().await;
        }
    }
}
