//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `homedash.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values. This is the only place configuration is
//! read; every component receives the typed values built here.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use homedash_adapter_probe_http::{
    HttpProbeError, HueBridgeProbe, ProxyProbe, ThermostatCredentialProbe, ThermostatCredentials,
    TransportConfig,
};
use homedash_adapter_virtual::VirtualConfig;
use homedash_app::connection_monitor::{Monitored, WaitOptions};
use homedash_app::context::CoreConfig;
use homedash_app::state::StateConfig;
use homedash_domain::connection::{MonitoredService, ServiceKind};
use homedash_domain::time::Timestamp;

/// Service name the Hue bridge is monitored under.
pub const HUE_SERVICE: &str = "hue";
/// Service name the thermostat is monitored under.
pub const NEST_SERVICE: &str = "nest";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// State store settings.
    pub state: StateSection,
    /// Event bus settings.
    pub bus: BusConfig,
    /// Connection monitor settings.
    pub monitor: MonitorConfig,
    /// Philips Hue bridge.
    pub hue: HueConfig,
    /// Backend proxies checked through their `/health` endpoint.
    pub proxies: Vec<ProxyConfig>,
    /// Thermostat cloud credentials.
    pub nest: NestConfig,
    /// Integration toggles.
    pub integrations: IntegrationsConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StateSection {
    /// Number of state changes kept for diagnostics.
    pub history_limit: usize,
    /// Top-level keys snapshotted to durable storage.
    pub persisted_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Number of events kept for diagnostics.
    pub history_limit: usize,
}

/// Connection monitor timing, in seconds.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Period of the background connection sweep.
    pub interval_secs: u64,
    /// Deadline of a single probe.
    pub probe_timeout_secs: u64,
    /// Startup sweeps before giving up on offline services.
    pub startup_attempts: u32,
    /// Pause between startup sweeps.
    pub startup_retry_secs: u64,
    /// Overall startup deadline; `0` waits for every attempt.
    pub startup_timeout_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HueConfig {
    /// Bridge host or URL; the bridge is not monitored when unset.
    pub bridge: Option<String>,
    /// Whitelisted API username.
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NestConfig {
    pub access_token: Option<String>,
    /// RFC 3339 expiry of `access_token`.
    pub expires_at: Option<Timestamp>,
    pub project_id: Option<String>,
}

/// Per-integration toggles.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    /// Enable the virtual/demo integration.
    pub virtual_enabled: bool,
    /// Refresh period of the virtual sensors, in seconds.
    pub virtual_interval_secs: u64,
}

impl Config {
    /// Load configuration from `homedash.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("homedash.toml")?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("HOMEDASH_HOST") {
            self.server.host = val;
        }
        if let Some(port) = var("HOMEDASH_PORT").and_then(|val| val.parse().ok()) {
            self.server.port = port;
        }
        if let Some(val) = var("HOMEDASH_BIND")
            && let Some((host, port)) = val.rsplit_once(':')
        {
            self.server.host = host.to_string();
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Some(val) = var("HOMEDASH_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = var("HOMEDASH_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("HOMEDASH_HUE_BRIDGE") {
            self.hue.bridge = Some(val);
        }
        if let Some(val) = var("HOMEDASH_HUE_USERNAME") {
            self.hue.username = Some(val);
        }
        if let Some(val) = var("HOMEDASH_NEST_TOKEN") {
            self.nest.access_token = Some(val);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.monitor.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "monitor.interval_secs must be non-zero".to_string(),
            ));
        }
        if self.monitor.probe_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "monitor.probe_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.integrations.virtual_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "integrations.virtual_interval_secs must be non-zero".to_string(),
            ));
        }

        let mut names: HashSet<&str> = HashSet::new();
        if self.hue.bridge.is_some() {
            names.insert(HUE_SERVICE);
        }
        if self.nest.is_configured() {
            names.insert(NEST_SERVICE);
        }
        for proxy in &self.proxies {
            if proxy.name.trim().is_empty() || proxy.url.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "proxies need both a name and a url".to_string(),
                ));
            }
            if !names.insert(proxy.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "service name {:?} is used twice",
                    proxy.name
                )));
            }
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    /// HTTP client settings shared by every network probe.
    #[must_use]
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            timeout: self.monitor.probe_timeout(),
            ..TransportConfig::default()
        }
    }

    /// Build one probe per configured backend service.
    ///
    /// # Errors
    ///
    /// Returns [`HttpProbeError`] if a bridge or proxy address is unusable.
    pub fn monitored_services(&self) -> Result<Vec<Monitored>, HttpProbeError> {
        let transport = self.transport();
        let mut services = Vec::new();
        if let Some(bridge) = &self.hue.bridge {
            services.push(Monitored::new(
                MonitoredService::new(HUE_SERVICE, ServiceKind::Bridge),
                HueBridgeProbe::new(bridge, self.hue.username.clone(), &transport)?,
            ));
        }
        for proxy in &self.proxies {
            services.push(Monitored::new(
                MonitoredService::new(proxy.name.clone(), ServiceKind::Proxy),
                ProxyProbe::new(&proxy.url, &transport)?,
            ));
        }
        if self.nest.is_configured() {
            services.push(Monitored::new(
                MonitoredService::new(NEST_SERVICE, ServiceKind::Thermostat),
                ThermostatCredentialProbe::new(self.nest.credentials()),
            ));
        }
        Ok(services)
    }

    /// Core settings with the given monitored services.
    #[must_use]
    pub fn core(&self, services: Vec<Monitored>) -> CoreConfig {
        CoreConfig {
            bus_history_limit: self.bus.history_limit,
            state: StateConfig {
                history_limit: self.state.history_limit,
                persisted_keys: self.state.persisted_keys.clone(),
            },
            probe_timeout: self.monitor.probe_timeout(),
            services,
        }
    }

    #[must_use]
    pub fn virtual_config(&self) -> VirtualConfig {
        VirtualConfig {
            interval: Duration::from_secs(self.integrations.virtual_interval_secs),
            ..VirtualConfig::default()
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    #[must_use]
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            max_attempts: self.startup_attempts,
            retry_interval: Duration::from_secs(self.startup_retry_secs),
            timeout: Duration::from_secs(self.startup_timeout_secs),
        }
    }
}

impl NestConfig {
    /// Whether any thermostat setting was given at all.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.access_token.is_some() || self.project_id.is_some()
    }

    #[must_use]
    pub fn credentials(&self) -> ThermostatCredentials {
        ThermostatCredentials {
            access_token: self.access_token.clone(),
            expires_at: self.expires_at,
            project_id: self.project_id.clone(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:homedash.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "homedashd=info,homedash=info,tower_http=debug".to_string(),
        }
    }
}

impl Default for StateSection {
    fn default() -> Self {
        let defaults = StateConfig::default();
        Self {
            history_limit: defaults.history_limit,
            persisted_keys: defaults.persisted_keys,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_limit: homedash_app::event_bus::DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        let wait = WaitOptions::default();
        Self {
            interval_secs: 30,
            probe_timeout_secs: 5,
            startup_attempts: wait.max_attempts,
            startup_retry_secs: wait.retry_interval.as_secs(),
            startup_timeout_secs: wait.timeout.as_secs(),
        }
    }
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            virtual_enabled: true,
            virtual_interval_secs: 300,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
