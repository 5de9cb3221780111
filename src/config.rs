//! Configuration loading and validation.
//!
//! The gateway is configured entirely through the environment; every value
//! has a default so a bare `ircultrad` starts a usable instance.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Default bind port.
pub const DEFAULT_PORT: u16 = 7001;

/// Default state file path.
pub const DEFAULT_STATE_PATH: &str = "data/irc-ultra-state.json";

/// Default message retention window in days.
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

/// Default write-behind debounce interval in milliseconds.
pub const DEFAULT_FLUSH_MS: u64 = 800;

/// Default message of the day.
pub const DEFAULT_MOTD: &str = "Welcome to Ultra IRC";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind host (`IRC_SERVER_HOST`).
    pub host: String,
    /// Bind port (`IRC_SERVER_PORT`, falling back to `PORT`).
    pub port: u16,
    /// State document path (`IRC_STATE_PATH`).
    pub state_path: PathBuf,
    /// Comma-separated origin allow list (`IRC_ALLOWED_ORIGINS`).
    /// Localhost and RFC-1918 origins are always accepted.
    pub allowed_origins: Vec<String>,
    /// Message retention in days (`RETENTION_DAYS`).
    pub retention_days: i64,
    /// Log format (`IRC_LOG_FORMAT`).
    pub log_format: LogFormat,
    /// Message of the day sent in `session_ready` (`IRC_MOTD`).
    pub motd: String,
    /// Write-behind debounce interval (`IRC_FLUSH_MS`).
    pub flush_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            state_path: PathBuf::from(DEFAULT_STATE_PATH),
            allowed_origins: Vec::new(),
            retention_days: DEFAULT_RETENTION_DAYS,
            log_format: LogFormat::Pretty,
            motd: DEFAULT_MOTD.to_string(),
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_MS),
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Load configuration from an arbitrary lookup function.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut config = Config::default();

        if let Some(host) = lookup("IRC_SERVER_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("IRC_SERVER_PORT").or_else(|| lookup("PORT")) {
            config.port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid port: {port}"))?;
        }
        if let Some(path) = lookup("IRC_STATE_PATH") {
            config.state_path = PathBuf::from(path);
        }
        if let Some(origins) = lookup("IRC_ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(days) = lookup("RETENTION_DAYS") {
            config.retention_days = days
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid RETENTION_DAYS: {days}"))?;
        }
        if let Some(format) = lookup("IRC_LOG_FORMAT") {
            config.log_format = match format.as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => anyhow::bail!("invalid IRC_LOG_FORMAT: {other}"),
            };
        }
        if let Some(motd) = lookup("IRC_MOTD") {
            config.motd = motd;
        }
        if let Some(ms) = lookup("IRC_FLUSH_MS") {
            let ms: u64 = ms
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid IRC_FLUSH_MS: {ms}"))?;
            config.flush_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// The socket address string to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Validate a loaded configuration, collecting every problem.
pub fn validate(config: &Config) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if config.retention_days <= 0 {
        errors.push(format!(
            "RETENTION_DAYS must be positive, got {}",
            config.retention_days
        ));
    }
    if config.state_path.as_os_str().is_empty() {
        errors.push("IRC_STATE_PATH must not be empty".to_string());
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
