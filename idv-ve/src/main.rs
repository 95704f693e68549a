//! idv-ve - Identity Verification Engine
//!
//! Drives submitted document photographs through the external recognition
//! backend, keeps the persisted session record consistent, and notifies
//! webhook subscribers at each lifecycle transition.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use idv_common::config::{load_toml_config, SettingsWatcher};
use idv_ve::AppState;

const DEFAULT_BIND: &str = "127.0.0.1:5741";
const SETTINGS_RELOAD_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting idv-ve (Identity Verification Engine)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let db_path = std::env::var("IDV_DATABASE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("idv-ve.db"));
    info!("Database: {}", db_path.display());

    let db = idv_ve::db::init_database_pool(&db_path).await?;

    let config_path = std::env::var("IDV_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("idv-ve.toml"));
    let toml_config = load_toml_config(&config_path)?;

    let settings =
        SettingsWatcher::start(db.clone(), toml_config, SETTINGS_RELOAD_INTERVAL).await?;
    info!("Settings watcher started");

    let state = AppState::new(db, settings);
    let app = idv_ve::build_router(state);

    let bind = std::env::var("IDV_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Listening on http://{}", bind);

    axum::serve(listener, app).await?;

    Ok(())
}
