//! Configuration module for the directory service and its client core.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::AppError;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key guarding the admin routes (unset means dev mode)
    pub admin_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Per-subscriber buffer of the change feed
    pub change_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let admin_psk = env::var("RESDIR_ADMIN_PSK").ok().filter(|k| !k.is_empty());

        let db_path = env::var("RESDIR_DB_PATH")
            .unwrap_or_else(|_| "./data/directory.sqlite".to_string())
            .into();

        let bind_addr = env::var("RESDIR_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|e| AppError::Internal(format!("Invalid RESDIR_BIND_ADDR format: {}", e)))?;

        let log_level = env::var("RESDIR_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let change_buffer = match env::var("RESDIR_CHANGE_BUFFER") {
            Ok(raw) => raw.parse().map_err(|e| {
                AppError::Internal(format!("Invalid RESDIR_CHANGE_BUFFER: {}", e))
            })?,
            Err(_) => 256,
        };

        Ok(Self {
            admin_psk,
            db_path,
            bind_addr,
            log_level,
            change_buffer,
        })
    }
}

/// Client-side configuration: where the store lives and how the core paces itself.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the directory service
    pub api_url: String,
    /// Admin key sent on privileged calls
    pub admin_key: Option<String>,
    /// Best-effort IP lookup endpoint answering `{"ip": "..."}`
    pub ip_lookup_url: String,
    /// Wait before reading back store-maintained vote counters
    pub vote_settle_delay: Duration,
    /// JSON file backing the local completion cache
    pub storage_path: PathBuf,
}

impl ClientConfig {
    /// Load client configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let api_url = env::var("RESDIR_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string())
            .trim_end_matches('/')
            .to_string();

        let admin_key = env::var("RESDIR_ADMIN_PSK").ok().filter(|k| !k.is_empty());

        let ip_lookup_url = env::var("RESDIR_IP_LOOKUP_URL")
            .unwrap_or_else(|_| "https://api.ipify.org?format=json".to_string());

        let settle_ms: u64 = match env::var("RESDIR_VOTE_SETTLE_MS") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid RESDIR_VOTE_SETTLE_MS: {}", e)))?,
            Err(_) => 500,
        };

        let storage_path = env::var("RESDIR_STORAGE_PATH")
            .unwrap_or_else(|_| "./data/local-storage.json".to_string())
            .into();

        Ok(Self {
            api_url,
            admin_key,
            ip_lookup_url,
            vote_settle_delay: Duration::from_millis(settle_ms),
            storage_path,
        })
    }
}
