//! Client Configuration Settings
//!
//! Configuration types for the trading client, loaded from environment
//! variables after `.env` is applied.

use std::time::Duration;

use crate::application::services::SessionConfig;
use crate::domain::reconciliation::ReconciliationConfig;
use crate::infrastructure::http::HttpConfig;
use crate::infrastructure::stream::{ConnectionConfig, HeartbeatConfig, ReconnectConfig};

/// API credential.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub const fn new(api_key: String) -> Self {
        Self { api_key }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Server endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    /// REST base URL including the version prefix.
    pub api_url: String,
    /// Event channel URL.
    pub ws_url: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api/v1".to_string(),
            ws_url: "ws://localhost:8000/api/v1/ws".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Event channel timing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSettings {
    /// Probe and staleness settings.
    pub heartbeat: HeartbeatConfig,
    /// Reconnect backoff, also used for snapshot retries.
    pub reconnect: ReconnectConfig,
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API credential.
    pub credentials: Credentials,
    /// Server endpoints.
    pub endpoints: EndpointSettings,
    /// Event channel timing.
    pub stream: StreamSettings,
    /// Buffer window and snapshot tolerance.
    pub reconciliation: ReconciliationConfig,
    /// Interval between buffered-event collections.
    pub gc_interval: Duration,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl ClientConfig {
    /// Create configuration from `.env` and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(ConfigError::DotEnv(e.to_string()));
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup: &lookup };

        let api_key = env
            .get("TRADING_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("TRADING_API_KEY".to_string()))?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::EmptyValue("TRADING_API_KEY".to_string()));
        }

        let endpoint_defaults = EndpointSettings::default();
        let endpoints = EndpointSettings {
            api_url: env.get("TRADING_API_URL").unwrap_or(endpoint_defaults.api_url),
            ws_url: env.get("TRADING_WS_URL").unwrap_or(endpoint_defaults.ws_url),
            request_timeout: env.duration_millis(
                "TRADING_REQUEST_TIMEOUT_MS",
                endpoint_defaults.request_timeout,
            ),
        };

        let heartbeat_defaults = HeartbeatConfig::default();
        let reconnect_defaults = ReconnectConfig::default();
        let stream = StreamSettings {
            heartbeat: HeartbeatConfig {
                probe_interval: env.duration_secs(
                    "TRADING_HEARTBEAT_INTERVAL_SECS",
                    heartbeat_defaults.probe_interval,
                ),
                grace: env.duration_secs("TRADING_HEARTBEAT_GRACE_SECS", heartbeat_defaults.grace),
                probe_payload: env
                    .get("TRADING_PROBE_PAYLOAD")
                    .unwrap_or(heartbeat_defaults.probe_payload),
            },
            reconnect: ReconnectConfig {
                initial_delay: env.duration_millis(
                    "TRADING_RECONNECT_DELAY_INITIAL_MS",
                    reconnect_defaults.initial_delay,
                ),
                max_delay: env.duration_secs(
                    "TRADING_RECONNECT_DELAY_MAX_SECS",
                    reconnect_defaults.max_delay,
                ),
                multiplier: env.f64("TRADING_RECONNECT_MULTIPLIER", reconnect_defaults.multiplier),
                jitter_factor: env
                    .f64("TRADING_RECONNECT_JITTER", reconnect_defaults.jitter_factor)
                    .clamp(0.0, 1.0),
                stable_period: env.duration_secs(
                    "TRADING_RECONNECT_STABLE_SECS",
                    reconnect_defaults.stable_period,
                ),
                max_attempts: env.u32(
                    "TRADING_MAX_RECONNECT_ATTEMPTS",
                    reconnect_defaults.max_attempts,
                ),
            },
        };

        let reconciliation_defaults = ReconciliationConfig::default();
        let reconciliation = ReconciliationConfig {
            buffer_window: env.duration_millis(
                "TRADING_BUFFER_WINDOW_MS",
                reconciliation_defaults.buffer_window,
            ),
            local_tolerance: env.duration_millis(
                "TRADING_LOCAL_TOLERANCE_MS",
                reconciliation_defaults.local_tolerance,
            ),
            command_timeout: env.duration_millis(
                "TRADING_COMMAND_TIMEOUT_MS",
                reconciliation_defaults.command_timeout,
            ),
        };

        let gc_interval = env
            .duration_millis("TRADING_GC_INTERVAL_MS", Duration::from_secs(1))
            .max(Duration::from_millis(1));

        Ok(Self {
            credentials: Credentials::new(api_key),
            endpoints,
            stream,
            reconciliation,
            gc_interval,
            metrics_port: env.u16("TRADING_METRICS_PORT", 0),
        })
    }

    /// Settings for the HTTP command transport.
    #[must_use]
    pub fn http(&self) -> HttpConfig {
        HttpConfig {
            base_url: self.endpoints.api_url.clone(),
            api_key: self.credentials.api_key().to_string(),
            timeout: self.endpoints.request_timeout,
        }
    }

    /// Settings for the event channel.
    #[must_use]
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.endpoints.ws_url.clone(),
            reconnect: self.stream.reconnect.clone(),
            heartbeat: self.stream.heartbeat.clone(),
        }
    }

    /// Settings for the session.
    #[must_use]
    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            reconciliation: self.reconciliation.clone(),
            gc_interval: self.gc_interval,
            snapshot_retry: self.stream.reconnect.clone(),
        }
    }

    /// Whether the Prometheus exporter should be started.
    #[must_use]
    pub const fn metrics_enabled(&self) -> bool {
        self.metrics_port != 0
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// `.env` exists but could not be read.
    #[error("failed to load .env: {0}")]
    DotEnv(String),
}

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        let parsed = raw.trim().parse().ok();
        if parsed.is_none() {
            tracing::warn!(key, value = %raw, "Ignoring unparseable setting, using default");
        }
        parsed
    }

    fn u16(&self, key: &str, default: u16) -> u16 {
        self.parse(key).unwrap_or(default)
    }

    fn u32(&self, key: &str, default: u32) -> u32 {
        self.parse(key).unwrap_or(default)
    }

    fn f64(&self, key: &str, default: f64) -> f64 {
        self.parse(key).unwrap_or(default)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key).map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key).map_or(default, Duration::from_millis)
    }
}
