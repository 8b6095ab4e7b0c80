//! Backend connection configuration
//!
//! The service URL and the public API key are required at process start.
//! Everything else has a default.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the backend service URL
pub const ENV_SERVICE_URL: &str = "SUPABASE_URL";
/// Environment variable holding the public (anon) API key
pub const ENV_API_KEY: &str = "SUPABASE_ANON_KEY";
/// Environment variable overriding where the auth session is persisted
pub const ENV_SESSION_PATH: &str = "TUTOR_COMPASS_SESSION_PATH";
/// Environment variable overriding the HTTP timeout, in seconds
pub const ENV_HTTP_TIMEOUT: &str = "TUTOR_COMPASS_HTTP_TIMEOUT_SECS";
/// Environment variable overriding how early tokens are refreshed, in seconds
pub const ENV_REFRESH_THRESHOLD: &str = "TUTOR_COMPASS_REFRESH_THRESHOLD_SECS";

/// Configuration errors. Any of these is fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is unset or blank
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    /// A variable is set but unusable
    #[error("invalid value for {name}: {reason}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Connection settings for the backend-as-a-service
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base service URL, without trailing slash
    pub service_url: String,
    /// Public API key sent as `apikey` on every request
    pub api_key: String,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Where the auth session is stored; `None` keeps it in memory only
    pub session_path: Option<PathBuf>,
    /// Refresh the access token when it expires within this window
    pub refresh_threshold: Duration,
}

impl BackendConfig {
    /// Create a config from the two required connection secrets
    pub fn new(service_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let service_url: String = service_url.into();
        Self {
            service_url: service_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
            user_agent: format!("Tutor-Compass/{}", env!("CARGO_PKG_VERSION")),
            session_path: Some(PathBuf::from("session.json")),
            refresh_threshold: Duration::from_secs(60),
        }
    }

    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let service_url = required(ENV_SERVICE_URL)?;
        let api_key = required(ENV_API_KEY)?;

        if !(service_url.starts_with("https://") || service_url.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                name: ENV_SERVICE_URL,
                reason: format!("expected an http(s) URL, got {:?}", service_url),
            });
        }

        let mut config = Self::new(service_url, api_key);

        if let Some(path) = lookup(ENV_SESSION_PATH).filter(|p| !p.trim().is_empty()) {
            config.session_path = Some(PathBuf::from(path.trim()));
        }

        if let Some(raw) = lookup(ENV_HTTP_TIMEOUT) {
            config.timeout = parse_secs(ENV_HTTP_TIMEOUT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_REFRESH_THRESHOLD) {
            config.refresh_threshold = parse_secs(ENV_REFRESH_THRESHOLD, &raw)?;
        }

        Ok(config)
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Persist the auth session at `path`
    pub fn with_session_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_path = Some(path.into());
        self
    }

    /// Keep the auth session in memory only
    pub fn without_persistence(mut self) -> Self {
        self.session_path = None;
        self
    }

    /// Set the proactive refresh window
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }
}

fn parse_secs(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim().parse().map(Duration::from_secs).map_err(|_| ConfigError::Invalid {
        name,
        reason: format!("expected whole seconds, got {:?}", raw),
    })
}
