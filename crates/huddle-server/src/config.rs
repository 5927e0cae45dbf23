//! Server configuration.
//!
//! Configuration is read from the file named by `HUDDLE_CONFIG`, or the
//! first existing of:
//! - `huddle.toml`
//! - `/etc/huddle/huddle.toml`
//! - `~/.config/huddle/huddle.toml`
//!
//! `HUDDLE_HOST` and `HUDDLE_PORT` override whatever the file says.

use anyhow::{Context, Result};
use huddle_core::{BrokerConfig, RegistryConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

const SEARCH_PATHS: [&str; 3] = [
    "huddle.toml",
    "/etc/huddle/huddle.toml",
    "~/.config/huddle/huddle.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub lobby: LobbyConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent WebSocket connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum topic subscriptions per connection.
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions_per_connection: usize,

    /// Maximum live topics.
    #[serde(default = "default_max_topics")]
    pub max_topics: usize,

    /// Broadcast ring size per topic. Slower subscribers lose the oldest events.
    #[serde(default = "default_topic_capacity")]
    pub topic_capacity: usize,

    /// Per-connection outbound queue length.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    /// Maximum event content length in bytes.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// Maximum inbound WebSocket message size in bytes.
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,

    /// Largest capacity a room may be created with.
    #[serde(default = "default_max_room_capacity")]
    pub max_room_capacity: usize,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Heartbeat interval in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,

    /// Idle time after which a silent connection is closed, in milliseconds.
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Exporter port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Lobby configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyConfig {
    /// Create `default_room` at start-up.
    #[serde(default = "default_true")]
    pub seed_default_room: bool,

    #[serde(default)]
    pub default_room: SeedRoom,

    /// Origins allowed to call the REST API from a browser.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

/// A room created when the server starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedRoom {
    #[serde(default = "default_seed_name")]
    pub name: String,
    #[serde(default = "default_seed_capacity")]
    pub max_members: i64,
    #[serde(default = "default_seed_creator")]
    pub created_by: String,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

fn default_max_subscriptions() -> usize {
    100
}

fn default_max_topics() -> usize {
    10_000
}

fn default_topic_capacity() -> usize {
    1024
}

fn default_outbound_queue() -> usize {
    256
}

fn default_max_content_length() -> usize {
    4096
}

fn default_max_frame_size() -> usize {
    64 * 1024
}

fn default_max_room_capacity() -> usize {
    1000
}

fn default_heartbeat_interval() -> u64 {
    30_000
}

fn default_heartbeat_timeout() -> u64 {
    90_000
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:5173".to_string()]
}

fn default_seed_name() -> String {
    "General Lobby".to_string()
}

fn default_seed_capacity() -> i64 {
    100
}

fn default_seed_creator() -> String {
    "System".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            metrics: MetricsConfig::default(),
            lobby: LobbyConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_subscriptions_per_connection: default_max_subscriptions(),
            max_topics: default_max_topics(),
            topic_capacity: default_topic_capacity(),
            outbound_queue: default_outbound_queue(),
            max_content_length: default_max_content_length(),
            max_frame_size: default_max_frame_size(),
            max_room_capacity: default_max_room_capacity(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
            timeout_ms: default_heartbeat_timeout(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            seed_default_room: true,
            default_room: SeedRoom::default(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for SeedRoom {
    fn default() -> Self {
        Self {
            name: default_seed_name(),
            max_members: default_seed_capacity(),
            created_by: default_seed_creator(),
        }
    }
}

impl Config {
    /// Load configuration from the first file found, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or if
    /// an environment override is malformed.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("HUDDLE_CONFIG") {
            Ok(path) => Self::from_file(shellexpand::tilde(&path).as_ref())?,
            Err(_) => Self::search()?,
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn search() -> Result<Self> {
        for path in &SEARCH_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("HUDDLE_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("HUDDLE_PORT") {
            self.port = port
                .parse()
                .with_context(|| format!("Invalid HUDDLE_PORT: {port}"))?;
        }
        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Broker settings derived from the limits section.
    #[must_use]
    pub fn broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            max_topics: self.limits.max_topics,
            max_subscriptions_per_connection: self.limits.max_subscriptions_per_connection,
            topic_capacity: self.limits.topic_capacity,
            auto_delete_empty_topics: true,
        }
    }

    #[must_use]
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_room_capacity: self.limits.max_room_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.transport.websocket_path, "/ws");
        assert_eq!(config.limits.max_content_length, 4096);
        assert!(config.lobby.seed_default_room);
        assert_eq!(config.lobby.default_room.name, "General Lobby");
        assert_eq!(config.lobby.default_room.max_members, 100);
        assert_eq!(config.lobby.cors_origins, vec!["http://localhost:5173"]);
    }

    #[test]
    fn test_config_bind_addr() {
        let addr = Config::default().bind_addr().unwrap();
        assert_eq!(addr.port(), 8080);

        let config = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [limits]
            max_connections = 500
            max_room_capacity = 50

            [lobby]
            seed_default_room = false
            cors_origins = ["https://chat.example.com"]

            [lobby.default_room]
            name = "Town Square"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.limits.max_connections, 500);
        assert_eq!(config.limits.topic_capacity, 1024);
        assert_eq!(config.registry_config().max_room_capacity, 50);
        assert!(!config.lobby.seed_default_room);
        assert_eq!(config.lobby.default_room.name, "Town Square");
        assert_eq!(config.lobby.default_room.created_by, "System");
        assert_eq!(config.lobby.cors_origins, vec!["https://chat.example.com"]);
    }

    #[test]
    fn test_broker_config_from_limits() {
        let mut config = Config::default();
        config.limits.max_subscriptions_per_connection = 3;
        config.limits.topic_capacity = 16;

        let broker = config.broker_config();
        assert_eq!(broker.max_subscriptions_per_connection, 3);
        assert_eq!(broker.topic_capacity, 16);
        assert!(broker.auto_delete_empty_topics);
    }

    #[test]
    fn test_from_missing_file() {
        let err = Config::from_file("/nonexistent/huddle.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
