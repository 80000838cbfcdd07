use std::env;
use std::path::PathBuf;

/// Shared proxy container name. One reverse proxy serves every application on
/// the host.
pub const PROXY_CONTAINER_NAME: &str = "main-proxy-server";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub data_dir: PathBuf,
    pub proxy_admin_url: String,
    pub proxy_image: String,
    pub proxy_ready_attempts: u32,
    pub proxy_ready_base_delay_ms: u64,
    pub master_key: Option<String>,
    pub dev_mode: bool,
}

impl Config {
    pub fn load() -> Self {
        Self {
            database_url: env::var("SARABI_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:///var/sarabi/data/sarabi.db".into()),
            data_dir: env::var("SARABI_DATA_DIR")
                .map_or_else(|_| PathBuf::from("/var/sarabi/data"), PathBuf::from),
            proxy_admin_url: env::var("SARABI_PROXY_ADMIN_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:2019".into()),
            proxy_image: env::var("SARABI_PROXY_IMAGE").unwrap_or_else(|_| "caddy:2.9".into()),
            proxy_ready_attempts: env::var("SARABI_PROXY_READY_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            proxy_ready_base_delay_ms: env::var("SARABI_PROXY_READY_BASE_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            master_key: env::var("SARABI_MASTER_KEY").ok(),
            dev_mode: env::var("SARABI_DEV").ok().is_some_and(|v| v == "true"),
        }
    }

    /// Root directory for uploaded build artifacts.
    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("bins")
    }

    /// Root directory for extracted static site content. Mounted into the
    /// proxy container at the same path so `file_server` roots resolve.
    pub fn sites_dir(&self) -> PathBuf {
        self.data_dir.join("sites")
    }

    /// Root directory for database volumes.
    pub fn storage_dir(&self) -> PathBuf {
        self.data_dir.join("storage")
    }
}
