// src/config.rs

//! Manages relay configuration: loading, environment overrides, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use tracing::warn;

/// Controls how the relay treats signaling traffic.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SignalingConfig {
    /// If true, `callUser`/`answerCall` are only delivered when the named target
    /// is the sender's recorded video partner. Off by default: any registered
    /// connection id can be signaled.
    #[serde(default)]
    pub enforce_partner_routing: bool,
    /// If true, `endCall` dissolves the sender's video pair and tells the
    /// partner `callEnded`. If false, `endCall` is logged and ignored.
    #[serde(default = "default_end_call_dissolves_pair")]
    pub end_call_dissolves_pair: bool,
    /// The caller name used when a client does not supply one.
    #[serde(default = "default_caller_display_name")]
    pub caller_display_name: String,
}

fn default_end_call_dissolves_pair() -> bool {
    true
}
fn default_caller_display_name() -> String {
    "Anonymous".to_string()
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            enforce_partner_routing: false,
            end_call_dissolves_pair: default_end_call_dissolves_pair(),
            caller_display_name: default_caller_display_name(),
        }
    }
}

/// STUN/TURN servers handed to clients for establishing the peer connection.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IceConfig {
    #[serde(default = "default_stun_urls")]
    pub stun_urls: Vec<String>,
    /// The TURN entry is only advertised when a URL is configured.
    #[serde(default)]
    pub turn_url: Option<String>,
    #[serde(default)]
    pub turn_username: Option<String>,
    #[serde(default)]
    pub turn_credential: Option<String>,
}

fn default_stun_urls() -> Vec<String> {
    vec![
        "stun:stun.l.google.com:19302".to_string(),
        "stun:stun1.l.google.com:19302".to_string(),
    ]
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_urls: default_stun_urls(),
            turn_url: None,
            turn_username: None,
            turn_credential: None,
        }
    }
}

/// One entry of the `iceServers` list in the browser's `RTCConfiguration` shape.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IceServers {
    pub ice_servers: Vec<IceServer>,
}

impl IceConfig {
    /// Applies `STUN_SERVER_URL`, `TURN_SERVER_URL`, `TURN_SERVER_USERNAME` and
    /// `TURN_SERVER_CREDENTIAL` on top of the file settings.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("STUN_SERVER_URL") {
            self.stun_urls = vec![url];
        }
        if let Some(url) = lookup("TURN_SERVER_URL") {
            self.turn_url = Some(url);
        }
        if let Some(username) = lookup("TURN_SERVER_USERNAME") {
            self.turn_username = Some(username);
        }
        if let Some(credential) = lookup("TURN_SERVER_CREDENTIAL") {
            self.turn_credential = Some(credential);
        }
    }

    pub fn ice_servers(&self) -> IceServers {
        let mut ice_servers = Vec::with_capacity(2);
        if !self.stun_urls.is_empty() {
            ice_servers.push(IceServer {
                urls: self.stun_urls.clone(),
                username: None,
                credential: None,
            });
        }
        if let Some(turn_url) = &self.turn_url {
            ice_servers.push(IceServer {
                urls: vec![turn_url.clone()],
                username: self.turn_username.clone(),
                credential: self.turn_credential.clone(),
            });
        }
        IceServers { ice_servers }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    8878
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// Represents the final, validated relay configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Upgrades beyond this many live connections are refused.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Outbound events buffered per connection before new ones are dropped.
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
    /// Browser origins allowed by CORS. Empty means any origin.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// How long shutdown waits for connections and background tasks.
    #[serde(with = "humantime_serde", default = "default_shutdown_timeout")]
    pub shutdown_timeout: Duration,
    #[serde(default)]
    pub signaling: SignalingConfig,
    #[serde(default)]
    pub ice: IceConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}
fn default_outbound_queue_capacity() -> usize {
    256
}
fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            allowed_origins: default_allowed_origins(),
            shutdown_timeout: default_shutdown_timeout(),
            signaling: SignalingConfig::default(),
            ice: IceConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` by reading and parsing a TOML file, then applying
    /// ICE overrides from the process environment.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let mut config = Self::parse_toml(&contents)
            .with_context(|| format!("Failed to load config from '{path}'"))?;
        config.ice.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a TOML document. Environment overrides are not applied.
    pub fn parse_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(anyhow!("outbound_queue_capacity cannot be 0"));
        }
        if self.ice.turn_url.is_some()
            && (self.ice.turn_username.is_none() || self.ice.turn_credential.is_none())
        {
            warn!("ice.turn_url is set without a username or credential; most TURN servers will reject it.");
        }
        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as the main server port"
                ));
            }
        }
        Ok(())
    }
}
