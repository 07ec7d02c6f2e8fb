//! Feed Configuration Settings
//!
//! Configuration types for the feed adapter, loaded from environment variables.

use std::time::Duration;

/// Default streaming endpoint.
pub const DEFAULT_WS_URL: &str = "wss://api2.poloniex.com";

/// Default public REST endpoint.
pub const DEFAULT_PUBLIC_API_URL: &str = "https://poloniex.com/public";

/// Streaming connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    /// Streaming endpoint.
    pub url: String,
    /// Time allowed for a single dial, handshake included.
    pub connect_timeout: Duration,
    /// Silence on a socket before it is considered dead.
    pub read_timeout: Duration,
    /// Time allowed for the liveness probe on an existing socket.
    pub probe_timeout: Duration,
    /// Keepalive ping interval.
    pub keepalive_interval: Duration,
    /// Keepalive timeout before the socket is marked dead.
    pub keepalive_timeout: Duration,
    /// Total dial attempts per connect.
    pub dial_attempts: u32,
    /// Delay after the first failed dial.
    pub reconnect_delay_initial: Duration,
    /// Maximum delay between dials.
    pub reconnect_delay_max: Duration,
    /// Backoff multiplier.
    pub reconnect_delay_multiplier: f64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_WS_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_millis(2000),
            keepalive_interval: Duration::from_secs(10),
            keepalive_timeout: Duration::from_secs(20),
            dial_attempts: 10,
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
        }
    }
}

/// Listener delivery settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerSettings {
    /// Events buffered per listener before the oldest is dropped.
    pub queue_capacity: usize,
}

impl Default for ListenerSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete feed configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// Public REST endpoint for directory and order-book snapshots.
    pub public_api_url: String,
    /// REST request timeout.
    pub rest_timeout: Duration,
    /// Channel names or ids subscribed at startup.
    pub channels: Vec<String>,
    /// Streaming connection settings.
    pub connection: ConnectionSettings,
    /// Listener delivery settings.
    pub listeners: ListenerSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            public_api_url: DEFAULT_PUBLIC_API_URL.to_string(),
            rest_timeout: Duration::from_secs(30),
            channels: vec!["ticker".to_string()],
            connection: ConnectionSettings::default(),
            listeners: ListenerSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

impl FeedConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint variable is set but empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint variable is set but empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env = Env(&lookup);

        let connection_defaults = defaults.connection;
        let connection = ConnectionSettings {
            url: env.url("POLONIEX_WS_URL", &connection_defaults.url)?,
            connect_timeout: env.duration_secs(
                "FEED_CONNECT_TIMEOUT_SECS",
                connection_defaults.connect_timeout,
            ),
            read_timeout: env.duration_secs("FEED_READ_TIMEOUT_SECS", connection_defaults.read_timeout),
            probe_timeout: env.duration_millis("FEED_PROBE_TIMEOUT_MS", connection_defaults.probe_timeout),
            keepalive_interval: env.duration_secs(
                "FEED_KEEPALIVE_INTERVAL_SECS",
                connection_defaults.keepalive_interval,
            ),
            keepalive_timeout: env.duration_secs(
                "FEED_KEEPALIVE_TIMEOUT_SECS",
                connection_defaults.keepalive_timeout,
            ),
            dial_attempts: env
                .parse("FEED_DIAL_ATTEMPTS", connection_defaults.dial_attempts)
                .max(1),
            reconnect_delay_initial: env.duration_millis(
                "FEED_RECONNECT_DELAY_INITIAL_MS",
                connection_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_secs(
                "FEED_RECONNECT_DELAY_MAX_SECS",
                connection_defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.parse(
                "FEED_RECONNECT_DELAY_MULTIPLIER",
                connection_defaults.reconnect_delay_multiplier,
            ),
        };

        let listeners = ListenerSettings {
            queue_capacity: env
                .parse(
                    "FEED_LISTENER_QUEUE_CAPACITY",
                    defaults.listeners.queue_capacity,
                )
                .max(1),
        };

        let server = ServerSettings {
            health_port: env.parse("FEED_HEALTH_PORT", defaults.server.health_port),
        };

        let channels = lookup("FEED_CHANNELS")
            .map(|raw| parse_channel_list(&raw))
            .filter(|channels| !channels.is_empty())
            .unwrap_or(defaults.channels);

        Ok(Self {
            public_api_url: env.url("POLONIEX_PUBLIC_API_URL", &defaults.public_api_url)?,
            rest_timeout: env.duration_secs("FEED_REST_TIMEOUT_SECS", defaults.rest_timeout),
            channels,
            connection,
            listeners,
            server,
        })
    }
}

/// Split a comma-separated channel list, dropping blanks.
#[must_use]
pub fn parse_channel_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Configuration error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn url(&self, key: &str, default: &str) -> Result<String, ConfigError> {
        match (self.0)(key) {
            Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
            Some(value) => Ok(value.trim().to_string()),
            None => Ok(default.to_string()),
        }
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
