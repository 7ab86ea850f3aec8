use eyre::{Context, Result, bail};
use log::Level;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use toolgate::cache::{DEFAULT_REFRESH_INTERVAL, MAX_REFRESH_INTERVAL};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub gateway: GatewayConfig,
    pub model: ModelConfig,
    pub providers: Vec<ProviderConfig>,
    pub datetime: DatetimeConfig,
    pub sqlite: SqliteConfig,
    pub client: ClientConfig,

    /// Messages raised while loading, logged once the logger is up
    #[serde(skip)]
    notices: Vec<(Level, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub listen: String,
    pub refresh_interval_secs: u64,
    pub call_timeout_ms: u64,
    pub rephrase: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8000".to_string(),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL.as_secs(),
            call_timeout_ms: 10000,
            rephrase: true,
        }
    }
}

impl GatewayConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            timeout_ms: 60000,
        }
    }
}

/// A tool provider the gateway talks to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub address: String,
}

impl ProviderConfig {
    fn new(id: &str, address: &str) -> Self {
        Self {
            id: id.to_string(),
            address: address.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatetimeConfig {
    pub listen: String,
}

impl Default for DatetimeConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    pub listen: String,
    pub db_path: PathBuf,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8002".to_string(),
            db_path: PathBuf::from("data/mydatabase.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub gateway: String,
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway: "127.0.0.1:8000".to_string(),
            // Must outlast a whole turn, rephrase included
            timeout_ms: 150000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            log_file: None,
            gateway: GatewayConfig::default(),
            model: ModelConfig::default(),
            providers: vec![
                ProviderConfig::new("datetime", "127.0.0.1:8001"),
                ProviderConfig::new("sqlite", "127.0.0.1:8002"),
            ],
            datetime: DatetimeConfig::default(),
            sqlite: SqliteConfig::default(),
            client: ClientConfig::default(),
            notices: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let mut notices = Vec::new();
        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        let primary_config = dirs::config_dir()
            .map(|dir| dir.join(project_name).join(format!("{}.yml", project_name)));
        // Then fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));

        for candidate in primary_config.into_iter().chain(std::iter::once(fallback_config)) {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(mut config) => {
                    notices.append(&mut config.notices);
                    config.notices = notices;
                    return Ok(config);
                }
                Err(e) => notices.push((
                    Level::Warn,
                    format!("Failed to load config from {}: {:#}", candidate.display(), e),
                )),
            }
        }

        let mut config = Self::default();
        notices.push((Level::Info, "No config file found, using defaults".to_string()));
        config.notices = notices;
        Ok(config)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let mut config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        config
            .notices
            .push((Level::Info, format!("Loaded config from: {}", path.as_ref().display())));
        Ok(config)
    }

    /// Drain the messages collected by `load` and `apply_env`
    pub fn take_notices(&mut self) -> Vec<(Level, String)> {
        std::mem::take(&mut self.notices)
    }

    /// Apply deployment environment variables on top of the loaded file.
    ///
    /// Unparseable values are logged and skipped.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("OLLAMA_API_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.model.model = model;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = Some(level.to_lowercase());
        }
        if let Some(path) = lookup("SQLITE_DB_PATH") {
            self.sqlite.db_path = PathBuf::from(path);
        }

        let host = lookup("GATEWAY_HOST");
        let port = parse_env::<u16>(&lookup, "GATEWAY_PORT", &mut self.notices);
        if host.is_some() || port.is_some() {
            self.gateway.listen = with_host_port(&self.gateway.listen, host.as_deref(), port);
            self.client.gateway = with_host_port(&self.client.gateway, host.as_deref(), port);
        }

        if let Some(port) = parse_env::<u16>(&lookup, "DATETIME_SERVER_PORT", &mut self.notices) {
            self.datetime.listen = with_host_port(&self.datetime.listen, None, Some(port));
            self.set_provider_port("datetime", port);
        }
        if let Some(port) = parse_env::<u16>(&lookup, "SQLITE_SERVER_PORT", &mut self.notices) {
            self.sqlite.listen = with_host_port(&self.sqlite.listen, None, Some(port));
            self.set_provider_port("sqlite", port);
        }

        if let Some(minutes) = parse_env::<u64>(&lookup, "GATEWAY_CACHE_REFRESH_MINUTES", &mut self.notices) {
            match minutes.checked_mul(60) {
                Some(secs) => self.gateway.refresh_interval_secs = secs,
                None => self.notices.push((
                    Level::Warn,
                    format!("Ignoring out-of-range GATEWAY_CACHE_REFRESH_MINUTES: {}", minutes),
                )),
            }
        }
    }

    fn set_provider_port(&mut self, id: &str, port: u16) {
        for provider in self.providers.iter_mut().filter(|p| p.id == id) {
            provider.address = with_host_port(&provider.address, None, Some(port));
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.id.is_empty() {
                bail!("Provider with address '{}' has an empty id", provider.address);
            }
            if !seen.insert(provider.id.as_str()) {
                bail!("Provider id '{}' is configured more than once", provider.id);
            }
        }
        if self.gateway.refresh_interval_secs == 0 {
            bail!("gateway.refresh_interval_secs must be greater than zero");
        }
        if self.gateway.refresh_interval() > MAX_REFRESH_INTERVAL {
            bail!(
                "gateway.refresh_interval_secs must be at most {}",
                MAX_REFRESH_INTERVAL.as_secs()
            );
        }
        if self.gateway.call_timeout_ms == 0 || self.model.timeout_ms == 0 || self.client.timeout_ms == 0 {
            bail!("Timeouts must be greater than zero");
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    notices: &mut Vec<(Level, String)>,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            notices.push((Level::Warn, format!("Ignoring invalid value for {}: '{}'", name, raw)));
            None
        }
    }
}

/// Replace the host and/or port of a `host:port` address
fn with_host_port(address: &str, host: Option<&str>, port: Option<u16>) -> String {
    let (current_host, current_port) = address.rsplit_once(':').unwrap_or((address, ""));
    let host = host.unwrap_or(current_host);
    match port {
        Some(p) => format!("{}:{}", host, p),
        None => format!("{}:{}", host, current_port),
    }
}
