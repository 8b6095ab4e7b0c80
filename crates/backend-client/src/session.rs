//! Auth session tokens and their persistence
//!
//! An [`AuthSession`] is what the identity service hands out on sign-in:
//! an access token, a refresh token and the identity they belong to. The
//! [`SessionStore`] keeps the latest one on disk so the next process start
//! can restore it without asking the user for credentials again.

use crate::types::Identity;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::dangerous::insecure_decode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use storage::persistence::{PersistedState, PersistenceConfig, PersistenceError};

/// Token set for a signed-in identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    /// Bearer token for user requests
    pub access_token: String,
    /// Token used to obtain a new access token
    pub refresh_token: String,
    /// Usually "bearer"
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Access token expiry, unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    /// Who the tokens belong to
    pub identity: Identity,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl AuthSession {
    /// When the access token stops being valid
    ///
    /// Uses the expiry reported by the service and falls back to the
    /// token's own `exp` claim.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .or_else(|| get_jwt_expiration(&self.access_token))
    }

    /// Whether the access token is expired. Unknown expiry counts as expired.
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::zero())
    }

    /// Whether the access token expires within `threshold`
    pub fn expires_within(&self, threshold: Duration) -> bool {
        match self.expires_at() {
            Some(at) => at <= Utc::now() + threshold,
            None => true,
        }
    }

    /// Whether a refresh can be attempted
    pub fn can_refresh(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

// =============================================================================
// JWT helpers
// =============================================================================

/// Claims read from an access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Email of the subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Expiration timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Database role claim (e.g. "authenticated")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Read JWT claims without verifying the signature
///
/// Only for informational use (expiry, subject). The service verifies tokens.
pub fn parse_jwt_claims(token: &str) -> Option<JwtClaims> {
    insecure_decode::<JwtClaims>(token).ok().map(|data| data.claims)
}

/// Expiration time of a JWT, if it has one
pub fn get_jwt_expiration(token: &str) -> Option<DateTime<Utc>> {
    parse_jwt_claims(token)?
        .exp
        .and_then(|exp| DateTime::from_timestamp(exp, 0))
}

// =============================================================================
// Persistence
// =============================================================================

/// On-disk layout of the persisted session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredSession {
    /// The last session handed out, if still signed in
    pub session: Option<AuthSession>,
}

/// Keeps the current [`AuthSession`] on disk, or only in memory when no path is set
pub struct SessionStore {
    persisted: Option<PersistedState<StoredSession>>,
}

impl SessionStore {
    /// Open the store at `path`, loading whatever is there
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let config = PersistenceConfig::new(path).version(1).atomic_writes(true);
        let persisted = PersistedState::new(config);
        persisted.init().await?;
        Ok(Self { persisted: Some(persisted) })
    }

    /// A store that never touches the disk
    pub fn in_memory() -> Self {
        Self { persisted: None }
    }

    /// The stored session, if any
    pub async fn load(&self) -> Result<Option<AuthSession>, PersistenceError> {
        match &self.persisted {
            Some(state) => Ok(state.get().await?.session),
            None => Ok(None),
        }
    }

    /// Replace the stored session
    pub async fn save(&self, session: &AuthSession) -> Result<(), PersistenceError> {
        match &self.persisted {
            Some(state) => state.set(StoredSession { session: Some(session.clone()) }).await,
            None => Ok(()),
        }
    }

    /// Forget the stored session
    pub async fn clear(&self) -> Result<(), PersistenceError> {
        match &self.persisted {
            Some(state) => state.clear().await,
            None => Ok(()),
        }
    }
}
