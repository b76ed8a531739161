//! Configuration management for cmdlink.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::dispatch::DispatchSettings;
use crate::transfer::{TransferOptions, DEFAULT_TRANSFER_PORT};

/// Default HTTP port of the hosted server; WebSocket listens one above.
pub const DEFAULT_HTTP_PORT: u16 = 10000;

/// Default WebSocket port a controller dials.
pub const DEFAULT_WS_PORT: u16 = DEFAULT_HTTP_PORT + 1;

/// Default control port of the raw-stream variant.
pub const DEFAULT_RAW_PORT: u16 = 5003;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerSection,
    pub execution: ExecutionSection,
    pub transfer: TransferSection,
    pub logging: LoggingSection,
}

/// Listener and naming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address every listener binds to.
    pub host: String,
    /// HTTP health port of `serve`; the WebSocket listener uses `port + 1`.
    pub port: u16,
    /// Control port of the raw-stream variant.
    pub raw_port: u16,
    /// Port of the controller's subchannel listener.
    pub transfer_port: u16,
    /// Name announced in the welcome message. Defaults to the host name.
    pub name: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_HTTP_PORT,
            raw_port: DEFAULT_RAW_PORT,
            transfer_port: DEFAULT_TRANSFER_PORT,
            name: None,
        }
    }
}

/// Command execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Generic exec timeout in seconds.
    pub timeout_secs: u64,
    /// Subchannel dial timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// File transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSection {
    /// Largest accepted transfer in bytes; unlimited when absent.
    pub max_bytes: Option<u64>,
    /// Report transfer progress.
    pub verbose: bool,
    /// Where the controller stores downloaded files.
    pub download_dir: PathBuf,
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            max_bytes: None,
            verbose: false,
            download_dir: PathBuf::from("."),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CMDLINK_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = parse_env("PORT", &port)?;
        }
        if let Some(port) = lookup("CMDLINK_TRANSFER_PORT") {
            self.server.transfer_port = parse_env("CMDLINK_TRANSFER_PORT", &port)?;
        }
        if let Some(secs) = lookup("CMDLINK_TIMEOUT_SECS") {
            self.execution.timeout_secs = parse_env("CMDLINK_TIMEOUT_SECS", &secs)?;
        }

        if let Some(level) = lookup("CMDLINK_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref host) = args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
            self.server.raw_port = port;
        }
        if let Some(port) = args.transfer_port {
            self.server.transfer_port = port;
        }
        if let Some(secs) = args.timeout_secs {
            self.execution.timeout_secs = secs;
        }
        if let Some(ref dir) = args.download_dir {
            self.transfer.download_dir = dir.clone();
        }
        if let Some(max) = args.max_bytes {
            self.transfer.max_bytes = Some(max);
        }
        if args.verbose {
            self.transfer.verbose = true;
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env()?;
        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::InvalidHost(self.server.host.clone()));
        }
        if self.execution.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "execution.timeout_secs",
                "0".to_string(),
            ));
        }
        self.ws_port()?;
        Ok(())
    }

    /// Port of the hosted WebSocket listener.
    pub fn ws_port(&self) -> Result<u16, ConfigError> {
        self.server
            .port
            .checked_add(1)
            .ok_or_else(|| ConfigError::InvalidValue("server.port", self.server.port.to_string()))
    }

    pub fn http_bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn ws_bind_address(&self) -> Result<String, ConfigError> {
        Ok(format!("{}:{}", self.server.host, self.ws_port()?))
    }

    pub fn raw_bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.raw_port)
    }

    pub fn transfer_bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.transfer_port)
    }

    /// Name announced in the welcome message.
    pub fn host_name(&self) -> String {
        self.server.name.clone().unwrap_or_else(local_host_name)
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            max_bytes: self.transfer.max_bytes,
            verbose: self.transfer.verbose,
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            exec_timeout: Duration::from_secs(self.execution.timeout_secs),
            connect_timeout: Duration::from_secs(self.execution.connect_timeout_secs),
            transfer: self.transfer_options(),
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name, value.to_string()))
}

fn local_host_name() -> String {
    let name = gethostname::gethostname().to_string_lossy().into_owned();
    if name.is_empty() {
        "localhost".to_string()
    } else {
        name
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid host address.
    InvalidHost(String),
    /// A setting that does not parse or is out of range.
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: '{}'", host),
            Self::InvalidValue(name, value) => write!(f, "invalid value for {}: '{}'", name, value),
        }
    }
}

impl std::error::Error for ConfigError {}
