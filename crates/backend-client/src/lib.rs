//! Backend client library
//!
//! Talks to the tutoring platform's backend-as-a-service: the identity
//! endpoints (sign-in, sign-up, refresh, sign-out) and the `user_profiles`
//! data table. Also owns the persisted auth session.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod config;
pub mod provider;
pub mod rest;
pub mod session;
pub mod types;

pub use agent::BackendAgent;
pub use config::{BackendConfig, ConfigError};
pub use provider::{AuthEvent, IdentityProvider, SignUpRequest};
pub use session::{AuthSession, SessionStore};
pub use types::{Identity, RoleRecord, UserProfile, UserRole};

use rest::RestError;
use storage::persistence::PersistenceError;

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for backend operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The service understood the request and refused it. `message` is the
    /// service's own wording and is meant to be shown to the user.
    #[error("{message}")]
    Provider {
        /// HTTP status code
        status: u16,
        /// Machine readable code
        code: String,
        /// Message from the service
        message: String,
    },

    /// The service could not be reached or failed on its side
    #[error("Network error: {0}")]
    Network(String),

    /// The service answered with something this client cannot read
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The session file could not be read or written
    #[error("Session storage error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Bad configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The operation needs a signed-in session
    #[error("No active session")]
    NoSession,
}

impl Error {
    /// Whether the service itself refused the request (4xx)
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Provider { .. })
    }

    /// Message from the service, if it refused the request
    pub fn provider_message(&self) -> Option<&str> {
        match self {
            Error::Provider { message, .. } => Some(message),
            _ => None,
        }
    }
}

impl From<RestError> for Error {
    fn from(err: RestError) -> Self {
        if err.is_rejection() {
            Error::Provider {
                status: err.status(),
                code: err.code().to_string(),
                message: err.message().to_string(),
            }
        } else if err.is_transport() && err.code() == "ParseError" {
            Error::InvalidResponse(err.message().to_string())
        } else if err.is_transport() {
            Error::Network(err.message().to_string())
        } else {
            Error::Network(format!("service returned {}: {}", err.status(), err.message()))
        }
    }
}
