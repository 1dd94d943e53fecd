//! bandhall-sched - Rehearsal scheduling service
//!
//! Expands recurrence rules into concrete occurrences and keeps every
//! connected band member's schedule view current over WebSocket.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use bandhall_common::config::{Config, ConfigOverrides};
use bandhall_common::db::{init_database, SqliteScheduleStore};
use bandhall_sched::{build_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "bandhall-sched", about = "Bandhall rehearsal scheduling service")]
struct Args {
    /// Path to TOML config file (default: <root folder>/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to SQLite database file
    #[arg(long)]
    database: Option<PathBuf>,

    /// HTTP/WebSocket port
    #[arg(long, env = "BANDHALL_PORT")]
    port: Option<u16>,

    /// Root data folder
    #[arg(long)]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(
        args.config.as_deref(),
        ConfigOverrides {
            database_path: args.database,
            port: args.port,
            root_folder: args.root_folder,
        },
    )?;

    // RUST_LOG wins over the configured level when set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "Starting Bandhall Scheduler (bandhall-sched) v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!("Database path: {}", config.database_path.display());

    let pool = init_database(&config.database_path).await?;
    let store = Arc::new(SqliteScheduleStore::new(pool));

    let state = AppState::new(store);
    let app = build_router(state);

    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("bandhall-sched listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Realtime channel: ws://{}/ws", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
