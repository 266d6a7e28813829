use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use nodepilot_core::config::NodepilotConfig;
use nodepilot_scheduler::{ActionExecutor, FleetHandle, SchedulerEngine, StatusCache};
use nodepilot_store::MachineStore;
use tracing::info;

mod app;
mod http;

/// Fleet scheduler: start/stop machines on schedule and serve the control API.
#[derive(Parser)]
#[command(name = "nodepilot-gateway", version, about, long_about = None)]
struct Cli {
    /// Configuration file path (default: ~/.nodepilot/nodepilot.toml)
    #[arg(short, long, env = "NODEPILOT_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "nodepilot_gateway=info,nodepilot_scheduler=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = NodepilotConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        NodepilotConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    // the HTTP layer and the scheduler each get their own connection
    let store = Arc::new(MachineStore::new(open_db(db_path)?)?);
    let scheduler_store = Arc::new(MachineStore::new(open_db(db_path)?)?);
    info!("database migrations complete");

    let status = Arc::new(StatusCache::from_config(&config.status)?);
    let executor = Arc::new(ActionExecutor::from_config(&config.actions)?);
    let fleet = FleetHandle::new(scheduler_store, Arc::clone(&status), executor);
    info!(
        source = %config.status.url,
        max_attempts = config.actions.max_attempts,
        "fleet scheduler configured"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let refresh_every = Duration::from_secs(config.status.refresh_interval_secs.max(1));
    let refresh_loop = status.spawn_refresh_loop(refresh_every, shutdown_rx.clone());

    let engine = SchedulerEngine::from_config(fleet.clone(), &config.scheduler);
    let engine_loop = tokio::spawn(engine.run(shutdown_rx));

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let state = Arc::new(app::AppState::new(config, store, fleet));
    let router = app::build_router(state);

    info!("nodepilot gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // stop both background loops before exiting
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(refresh_loop, engine_loop);
    info!("nodepilot gateway stopped");
    Ok(())
}

fn open_db(path: &str) -> anyhow::Result<rusqlite::Connection> {
    let conn = rusqlite::Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
    Ok(conn)
}

/// Create the parent directory of `path` if it doesn't exist yet.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), "could not create data dir: {e}");
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
