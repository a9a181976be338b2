//! coda-judge - Judgment Coordination Service
//!
//! Hosts the annotation/judgment core of the Coda data-coding application:
//! the human rating session, the AI batch rating engine, progress
//! broadcasting, and score finalization, served to the desktop UI over
//! HTTP + SSE on localhost.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use coda_common::config::CodaConfig;
use coda_common::events::EventBus;
use coda_judge::services::{HttpRater, HttpScorer};
use coda_judge::AppState;

#[derive(Parser, Debug)]
#[command(name = "coda-judge", about = "Coda judgment coordination service")]
struct Args {
    /// Config file path (default: platform config dir)
    #[arg(long, env = "CODA_CONFIG")]
    config: Option<PathBuf>,

    /// Database path override
    #[arg(long, env = "CODA_DATABASE")]
    database: Option<PathBuf>,

    /// Bind address override
    #[arg(long, env = "CODA_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing (RUST_LOG overrides the default level)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("Starting coda-judge (Judgment Coordination) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = CodaConfig::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    if let Some(database) = args.database {
        config.database_path = Some(database);
    }
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = coda_judge::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);
    info!("Event bus initialized");

    let rater = Arc::new(HttpRater::new(&config.rater, config.ai_rater_id.clone())?);
    let scorer = Arc::new(HttpScorer::new(&config.scoring)?);
    info!(
        rater_endpoint = %config.rater.endpoint,
        scoring_endpoint = %config.scoring.endpoint,
        "External service clients initialized"
    );

    let bind_address = config.bind_address.clone();
    let state = AppState::new(db_pool, event_bus, config, rater, scorer);
    let app = coda_judge::build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on http://{}", bind_address);
    info!("Health check: http://{}/health", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
