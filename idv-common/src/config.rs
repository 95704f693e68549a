//! Configuration resolution and hot reload
//!
//! Settings are resolved with Database → ENV → TOML priority: the service
//! database's `settings` table is authoritative, environment variables
//! override the TOML file, and compiled defaults fill the rest.
//!
//! Hot reload is snapshot-based: a watcher task re-resolves settings on an
//! interval and publishes immutable `Arc<Settings>` values over a
//! `tokio::sync::watch` channel. In-flight work keeps the snapshot it
//! started with; a configuration change only affects work started after
//! the new snapshot lands.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Default bounded timeout for a streaming recognition call, in seconds
pub const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 30;
/// Default delay between biometric job submission and opening its stream
pub const DEFAULT_POLL_DELAY_SECS: u64 = 5;
/// Default webhook delivery timeout, in seconds
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Immutable configuration snapshot.
///
/// Read-only for every consumer; the watcher replaces whole snapshots and
/// never mutates one in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Recognition backend base URL
    pub server_url: String,
    /// Bearer credential shared by both backends
    pub access_token: String,
    /// Document-liveness backend base URL
    pub document_liveness_server_url: String,
    /// Whether document liveness checking is enabled for this deployment
    pub liveness_check_document: bool,
    /// Base URL sessions links are built from
    pub session_site_url: String,
    /// API keys accepted for session creation
    pub api_keys: Vec<String>,
    pub webhook_url: String,
    pub webhook_secret: String,
    pub webhook_enabled: bool,
    pub stream_timeout_secs: u64,
    pub poll_delay_secs: u64,
    pub webhook_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            access_token: String::new(),
            document_liveness_server_url: String::new(),
            liveness_check_document: false,
            session_site_url: String::new(),
            api_keys: Vec::new(),
            webhook_url: String::new(),
            webhook_secret: String::new(),
            webhook_enabled: false,
            stream_timeout_secs: DEFAULT_STREAM_TIMEOUT_SECS,
            poll_delay_secs: DEFAULT_POLL_DELAY_SECS,
            webhook_timeout_secs: DEFAULT_WEBHOOK_TIMEOUT_SECS,
        }
    }
}

/// TOML configuration file contents (lowest priority tier)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub server_url: Option<String>,
    pub access_token: Option<String>,
    pub document_liveness_server_url: Option<String>,
    pub liveness_check_document: Option<bool>,
    pub session_site_url: Option<String>,
    pub api_keys: Option<Vec<String>>,
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
    pub webhook_enabled: Option<bool>,
    pub stream_timeout_secs: Option<u64>,
    pub poll_delay_secs: Option<u64>,
    pub webhook_timeout_secs: Option<u64>,
}

/// Load the TOML configuration file.
///
/// A missing file is not fatal: the service starts with defaults and a
/// warning, matching how the rest of the resolution chain degrades.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("parse {}: {}", path.display(), e)))
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim(), "true" | "1" | "yes")
}

fn parse_keys(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

impl Settings {
    /// Resolve a settings snapshot with Database → ENV → TOML priority.
    pub async fn resolve(pool: &SqlitePool, base: &TomlConfig) -> Result<Settings> {
        let mut settings = Settings::default();
        settings.apply_toml(base);
        settings.apply_env();
        settings.apply_db(load_db_settings(pool).await?);
        Ok(settings)
    }

    fn apply_toml(&mut self, base: &TomlConfig) {
        if let Some(v) = &base.server_url {
            self.server_url = v.clone();
        }
        if let Some(v) = &base.access_token {
            self.access_token = v.clone();
        }
        if let Some(v) = &base.document_liveness_server_url {
            self.document_liveness_server_url = v.clone();
        }
        if let Some(v) = base.liveness_check_document {
            self.liveness_check_document = v;
        }
        if let Some(v) = &base.session_site_url {
            self.session_site_url = v.clone();
        }
        if let Some(v) = &base.api_keys {
            self.api_keys = v.clone();
        }
        if let Some(v) = &base.webhook_url {
            self.webhook_url = v.clone();
        }
        if let Some(v) = &base.webhook_secret {
            self.webhook_secret = v.clone();
        }
        if let Some(v) = base.webhook_enabled {
            self.webhook_enabled = v;
        }
        if let Some(v) = base.stream_timeout_secs {
            self.stream_timeout_secs = v;
        }
        if let Some(v) = base.poll_delay_secs {
            self.poll_delay_secs = v;
        }
        if let Some(v) = base.webhook_timeout_secs {
            self.webhook_timeout_secs = v;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("IDV_SERVER_URL") {
            self.server_url = v;
        }
        if let Ok(v) = std::env::var("IDV_ACCESS_TOKEN") {
            self.access_token = v;
        }
        if let Ok(v) = std::env::var("IDV_DOCUMENT_LIVENESS_SERVER_URL") {
            self.document_liveness_server_url = v;
        }
        if let Ok(v) = std::env::var("IDV_SESSION_SITE_URL") {
            self.session_site_url = v;
        }
        if let Ok(v) = std::env::var("IDV_API_KEYS") {
            self.api_keys = parse_keys(&v);
        }
        if let Ok(v) = std::env::var("IDV_WEBHOOK_URL") {
            self.webhook_url = v;
        }
        if let Ok(v) = std::env::var("IDV_WEBHOOK_SECRET") {
            self.webhook_secret = v;
        }
        if let Ok(v) = std::env::var("IDV_WEBHOOK_ENABLED") {
            self.webhook_enabled = parse_bool(&v);
        }
    }

    fn apply_db(&mut self, rows: HashMap<String, String>) {
        for (key, value) in rows {
            match key.as_str() {
                "server_url" => self.server_url = value,
                "access_token" => self.access_token = value,
                "document_liveness_server_url" => self.document_liveness_server_url = value,
                "liveness_check_document" => self.liveness_check_document = parse_bool(&value),
                "session_site_url" => self.session_site_url = value,
                "api_keys" => self.api_keys = parse_keys(&value),
                "webhook_url" => self.webhook_url = value,
                "webhook_secret" => self.webhook_secret = value,
                "webhook_enabled" => self.webhook_enabled = parse_bool(&value),
                "stream_timeout_secs" => {
                    if let Ok(v) = value.parse() {
                        self.stream_timeout_secs = v;
                    }
                }
                "poll_delay_secs" => {
                    if let Ok(v) = value.parse() {
                        self.poll_delay_secs = v;
                    }
                }
                "webhook_timeout_secs" => {
                    if let Ok(v) = value.parse() {
                        self.webhook_timeout_secs = v;
                    }
                }
                other => debug!(key = other, "ignoring unknown settings row"),
            }
        }
    }
}

/// Read the key/value `settings` table.
async fn load_db_settings(pool: &SqlitePool) -> Result<HashMap<String, String>> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Cloneable handle to the latest settings snapshot.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    rx: watch::Receiver<Arc<Settings>>,
}

impl SettingsHandle {
    /// Current snapshot. Cheap; intended to be called once at the start of
    /// each unit of work.
    pub fn snapshot(&self) -> Arc<Settings> {
        self.rx.borrow().clone()
    }

    /// Handle over a fixed snapshot that never changes. Used by tests and
    /// one-shot tools.
    pub fn fixed(settings: Settings) -> Self {
        let (_tx, rx) = watch::channel(Arc::new(settings));
        Self { rx }
    }
}

/// Background settings watcher publishing immutable snapshots.
pub struct SettingsWatcher;

impl SettingsWatcher {
    /// Resolve an initial snapshot, then spawn a task that re-resolves on
    /// `interval` and publishes only when the snapshot actually changed.
    ///
    /// Resolution errors after startup keep the previous snapshot in place.
    pub async fn start(
        pool: SqlitePool,
        base: TomlConfig,
        interval: Duration,
    ) -> Result<SettingsHandle> {
        let initial = Settings::resolve(&pool, &base).await?;
        let (tx, rx) = watch::channel(Arc::new(initial));

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match Settings::resolve(&pool, &base).await {
                    Ok(fresh) => {
                        let changed = **tx.borrow() != fresh;
                        if changed {
                            info!("settings changed, publishing new snapshot");
                            if tx.send(Arc::new(fresh)).is_err() {
                                break; // all handles dropped
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "settings reload failed, keeping previous snapshot");
                    }
                }
            }
        });

        Ok(SettingsHandle { rx })
    }
}
