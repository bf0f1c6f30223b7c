use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;

pub const DEFAULT_CONFIG_PATH: &str = "config/server.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    #[serde(default = "default_address")]
    pub address: String,
    /// Seconds between snapshot writes.
    #[serde(default = "default_store_interval")]
    pub store_interval_secs: u64,
    #[serde(default = "default_file_storage_path")]
    pub file_storage_path: PathBuf,
    /// Load the snapshot into the in-memory repository at start-up.
    #[serde(default = "default_restore")]
    pub restore: bool,
    /// `sqlite:` or `postgres://` DSN. The in-memory repository is used when unset.
    #[serde(default)]
    pub database_dsn: Option<String>,
    /// HMAC-SHA256 key for request verification and response signing.
    #[serde(default)]
    pub key: Option<String>,
    /// RSA private key (PKCS#1 PEM) for the key exchange.
    #[serde(default)]
    pub crypto_key: Option<PathBuf>,
    /// Deadline for every database operation.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_address() -> String {
    "localhost:8080".to_string()
}

fn default_store_interval() -> u64 {
    300
}

fn default_file_storage_path() -> PathBuf {
    PathBuf::from("metrics.json")
}

fn default_restore() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            store_interval_secs: default_store_interval(),
            file_storage_path: default_file_storage_path(),
            restore: default_restore(),
            database_dsn: None,
            key: None,
            crypto_key: None,
            request_timeout_secs: default_request_timeout(),
            log_level: default_log_level(),
        }
    }
}

fn parse_bool(var: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" => Ok(true),
        "0" | "false" | "f" | "no" => Ok(false),
        _ => bail!("{var} must be a boolean, got '{raw}'"),
    }
}

fn parse_secs(var: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .with_context(|| format!("{var} must be a whole number of seconds, got '{raw}'"))
}

fn non_empty(v: String) -> Option<String> {
    Some(v).filter(|s| !s.is_empty())
}

impl ServerConfig {
    /// Loads the TOML file, applies environment overrides and validates.
    ///
    /// With `path == None` the default path is used when present and
    /// built-in defaults otherwise; an explicit path must be readable.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(Path::new(path))?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = var("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = var("STORE_INTERVAL") {
            self.store_interval_secs = parse_secs("STORE_INTERVAL", &v)?;
        }
        if let Some(v) = var("FILE_STORAGE_PATH") {
            self.file_storage_path = PathBuf::from(v);
        }
        if let Some(v) = var("RESTORE") {
            self.restore = parse_bool("RESTORE", &v)?;
        }
        if let Some(v) = var("DATABASE_DSN") {
            self.database_dsn = non_empty(v);
        }
        if let Some(v) = var("KEY") {
            self.key = non_empty(v);
        }
        if let Some(v) = var("CRYPTO_KEY") {
            self.crypto_key = non_empty(v).map(PathBuf::from);
        }
        if let Some(v) = var("REQUEST_TIMEOUT") {
            self.request_timeout_secs = parse_secs("REQUEST_TIMEOUT", &v)?;
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            bail!("listen address must not be empty");
        }
        if self.store_interval_secs == 0 {
            bail!("store interval must be greater than zero");
        }
        if self.request_timeout_secs == 0 {
            bail!("request timeout must be greater than zero");
        }
        if self.file_storage_path.as_os_str().is_empty() {
            bail!("file storage path must not be empty");
        }
        if let Some(dsn) = &self.database_dsn {
            harvester_storage::engine::backend_for_dsn(dsn)?;
        }
        if !self.log_level.contains('=') {
            self.log_level
                .parse::<LevelFilter>()
                .map_err(|_| anyhow::anyhow!("invalid log level '{}'", self.log_level))?;
        }
        Ok(())
    }

    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
