use std::time::Duration;

/// Default base URL of the chat backend.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default path under which room channels are served.
pub const DEFAULT_WS_PATH: &str = "ws/chat";

/// Default upper bound on opening a channel, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Client configuration for the room connection manager.
///
/// All fields have defaults pointing at a local development backend.
/// Override them via environment variables (see [`ClientConfig::from_env`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the backend (e.g. `https://docs.example.com`). Its scheme
    /// decides whether channels use `ws` or `wss`.
    pub base_url: String,
    /// Path prefix for room channels, without surrounding slashes.
    pub ws_path: String,
    /// How long a channel may stay in `Connecting` before the attempt is
    /// reported as a transport error.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            ws_path: DEFAULT_WS_PATH.into(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default                 |
    /// |---------------------------------|-------------------------|
    /// | `ROOMLINK_BASE_URL`             | `http://localhost:8000` |
    /// | `ROOMLINK_WS_PATH`              | `ws/chat`               |
    /// | `ROOMLINK_CONNECT_TIMEOUT_SECS` | `10`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("ROOMLINK_BASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.into());

        let ws_path = lookup("ROOMLINK_WS_PATH")
            .map(|v| v.trim().trim_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_WS_PATH.into());

        let connect_timeout_secs = match lookup("ROOMLINK_CONNECT_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "ROOMLINK_CONNECT_TIMEOUT_SECS",
                        value: raw,
                    })
                }
            },
            None => DEFAULT_CONNECT_TIMEOUT_SECS,
        };

        Ok(Self {
            base_url,
            ws_path,
            connect_timeout: Duration::from_secs(connect_timeout_secs),
        })
    }

    /// Override the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}
