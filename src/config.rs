use crate::error::{DlzError, Result};
use crate::reconnect::ReconnectPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PING_INTERVAL_MS: u64 = 25_000;

/// Connection settings for a DLZ Creator pad server
///
/// Deserializes from the `dlz:` section of the application config; every
/// field is optional.
///
/// ```
/// use dlz_creator::ClientConfig;
///
/// let config = ClientConfig::new("192.168.1.20")
///     .with_max_reconnect_attempts(10)
///     .with_reconnect_delay(2.0);
/// assert_eq!(
///     config.websocket_url(),
///     "ws://192.168.1.20/socket.io/?EIO=4&transport=websocket"
/// );
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host, optionally with `:port`
    pub host: String,

    /// Maximum reconnection attempts, negative for unbounded
    pub max_reconnect_attempts: i64,

    /// Initial delay between reconnection attempts, seconds
    pub reconnect_delay: f64,

    /// Multiplier applied to the delay on each further attempt
    pub reconnect_backoff: f64,

    /// Ceiling for the reconnection delay, seconds
    pub reconnect_max_delay: f64,

    /// Keepalive interval used until the server announces its own
    pub ping_interval_ms: u64,

    /// How long a blocking play/stop waits for the connection, seconds
    pub action_timeout: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            max_reconnect_attempts: -1,
            reconnect_delay: 5.0,
            reconnect_backoff: 1.5,
            reconnect_max_delay: 60.0,
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            action_timeout: 5.0,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: i64) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_reconnect_delay(mut self, seconds: f64) -> Self {
        self.reconnect_delay = seconds;
        self
    }

    pub fn with_reconnect_backoff(mut self, factor: f64) -> Self {
        self.reconnect_backoff = factor;
        self
    }

    pub fn with_reconnect_max_delay(mut self, seconds: f64) -> Self {
        self.reconnect_max_delay = seconds;
        self
    }

    pub fn with_ping_interval_ms(mut self, millis: u64) -> Self {
        self.ping_interval_ms = millis;
        self
    }

    pub fn with_action_timeout(mut self, seconds: f64) -> Self {
        self.action_timeout = seconds;
        self
    }

    /// Socket.IO websocket endpoint for `host`
    pub fn websocket_url(&self) -> String {
        format!("ws://{}/socket.io/?EIO=4&transport=websocket", self.host)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.action_timeout)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: u32::try_from(self.max_reconnect_attempts).ok(),
            base_delay: Duration::from_secs_f64(self.reconnect_delay),
            backoff: self.reconnect_backoff,
            max_delay: Duration::from_secs_f64(self.reconnect_max_delay),
        }
    }

    /// Check value ranges before any `Duration` is built from them
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(DlzError::InvalidConfig("host must not be empty".to_string()));
        }
        for (name, value) in [
            ("reconnect_delay", self.reconnect_delay),
            ("reconnect_max_delay", self.reconnect_max_delay),
            ("action_timeout", self.action_timeout),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(DlzError::InvalidConfig(format!(
                    "{} must be a non-negative number of seconds, got {}",
                    name, value
                )));
            }
        }
        if !self.reconnect_backoff.is_finite() || self.reconnect_backoff < 1.0 {
            return Err(DlzError::InvalidConfig(format!(
                "reconnect_backoff must be at least 1.0, got {}",
                self.reconnect_backoff
            )));
        }
        if self.reconnect_max_delay < self.reconnect_delay {
            return Err(DlzError::InvalidConfig(
                "reconnect_max_delay must not be below reconnect_delay".to_string(),
            ));
        }
        if self.ping_interval_ms == 0 {
            return Err(DlzError::InvalidConfig("ping_interval_ms must be positive".to_string()));
        }
        Ok(())
    }
}
