use crate::delivery::BackoffSchedule;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::filter::LevelFilter;

pub const DEFAULT_CONFIG_PATH: &str = "config/agent.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Server address, `host:port` or a full URL.
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,
    /// Waits between delivery retries, in seconds.
    #[serde(default = "default_backoff_schedule")]
    pub backoff_schedule_secs: Vec<u64>,
    /// HMAC-SHA256 signing key. Signing is off when unset.
    #[serde(default)]
    pub key: Option<String>,
    /// Server RSA public key (PKCS#1 PEM). Encryption is off when unset.
    #[serde(default)]
    pub crypto_key: Option<PathBuf>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_address() -> String {
    "localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    2
}

fn default_report_interval() -> u64 {
    10
}

fn default_backoff_schedule() -> Vec<u64> {
    vec![1, 3, 5]
}

fn default_request_timeout() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            poll_interval_secs: default_poll_interval(),
            report_interval_secs: default_report_interval(),
            backoff_schedule_secs: default_backoff_schedule(),
            key: None,
            crypto_key: None,
            request_timeout_secs: default_request_timeout(),
            log_level: default_log_level(),
        }
    }
}

fn parse_secs(var: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .with_context(|| format!("{var} must be a whole number of seconds, got '{raw}'"))
}

impl AgentConfig {
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

    /// Overrides fields from `ADDRESS`, `POLL_INTERVAL`, `REPORT_INTERVAL`,
    /// `BACKOFF_SCHEDULE`, `KEY`, `CRYPTO_KEY`, `LOG_LEVEL`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = var("ADDRESS") {
            self.address = v;
        }
        if let Some(v) = var("POLL_INTERVAL") {
            self.poll_interval_secs = parse_secs("POLL_INTERVAL", &v)?;
        }
        if let Some(v) = var("REPORT_INTERVAL") {
            self.report_interval_secs = parse_secs("REPORT_INTERVAL", &v)?;
        }
        if let Some(v) = var("BACKOFF_SCHEDULE") {
            self.backoff_schedule_secs = v
                .split(',')
                .map(|s| parse_secs("BACKOFF_SCHEDULE", s))
                .collect::<Result<_>>()?;
        }
        if let Some(v) = var("KEY") {
            self.key = Some(v).filter(|k| !k.is_empty());
        }
        if let Some(v) = var("CRYPTO_KEY") {
            self.crypto_key = Some(PathBuf::from(v)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(v) = var("LOG_LEVEL") {
            self.log_level = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            bail!("server address must not be empty");
        }
        if self.poll_interval_secs == 0 {
            bail!("poll interval must be greater than zero");
        }
        if self.report_interval_secs == 0 {
            bail!("report interval must be greater than zero");
        }
        if self.backoff_schedule_secs.is_empty() {
            bail!("backoff schedule must have at least one entry");
        }
        if self.request_timeout_secs == 0 {
            bail!("request timeout must be greater than zero");
        }
        if !self.log_level.contains('=') {
            self.log_level
                .parse::<LevelFilter>()
                .map_err(|_| anyhow::anyhow!("invalid log level '{}'", self.log_level))?;
        }
        Ok(())
    }

    /// Base URL of the server; `http://` is assumed when no scheme is given.
    pub fn server_url(&self) -> String {
        let addr = self.address.trim().trim_end_matches('/');
        if addr.contains("://") {
            return addr.to_string();
        }
        format!("http://{addr}")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff_schedule(&self) -> BackoffSchedule {
        BackoffSchedule::from_secs(&self.backoff_schedule_secs)
    }
}
