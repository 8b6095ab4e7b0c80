//! BackendAgent - HTTP implementation of [`IdentityProvider`]
//!
//! The agent holds the current [`AuthSession`], mirrors it to the
//! [`SessionStore`] and broadcasts [`AuthEvent`]s whenever it changes.
//!
//! # Example
//!
//! ```rust,no_run
//! use backend_client::{BackendAgent, BackendConfig, IdentityProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BackendConfig::from_env()?;
//!     let agent = BackendAgent::connect(config).await?;
//!
//!     let session = agent.authenticate("mona@example.com", "secret123").await?;
//!     let profile = agent.fetch_profile(&session.identity.id).await?;
//!     println!("Signed in as {} ({})", profile.full_name, profile.role);
//!
//!     Ok(())
//! }
//! ```

use crate::config::BackendConfig;
use crate::provider::{AuthEvent, IdentityProvider, SignUpRequest};
use crate::rest::{RestClient, RestRequest};
use crate::session::{AuthSession, SessionStore};
use crate::types::{
    role_table, Identity, NewUserProfile, RoleRecord, RoleRecordInsert, StudentProfile,
    TeacherProfile, UserProfile, UserRole,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

const TOKEN_PATH: &str = "/auth/v1/token";
const SIGNUP_PATH: &str = "/auth/v1/signup";
const LOGOUT_PATH: &str = "/auth/v1/logout";
const PROFILES_PATH: &str = "/rest/v1/user_profiles";
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
struct SignUpBody<'a> {
    email: &'a str,
    password: &'a str,
    data: SignUpMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct SignUpMetadata<'a> {
    full_name: &'a str,
    role: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: WireUser,
}

impl TokenResponse {
    fn into_session(self, fallback_email: &str) -> AuthSession {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| Utc::now().timestamp() + secs));

        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".to_string()),
            expires_at,
            identity: Identity {
                id: self.user.id,
                email: self.user.email.unwrap_or_else(|| fallback_email.to_string()),
            },
        }
    }
}

/// Sign-up returns a session when email confirmation is off and a bare user otherwise
#[derive(Debug, Clone, Deserialize)]
struct SignUpResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<WireUser>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl SignUpResponse {
    fn identity(&self, fallback_email: &str) -> Option<Identity> {
        let (id, email) = match &self.user {
            Some(user) => (Some(user.id.clone()), user.email.clone()),
            None => (self.id.clone(), self.email.clone()),
        };
        id.map(|id| Identity { id, email: email.unwrap_or_else(|| fallback_email.to_string()) })
    }
}

// =============================================================================
// Agent
// =============================================================================

/// Client for the backend's auth and data endpoints
pub struct BackendAgent {
    client: RestClient,
    store: SessionStore,
    session: RwLock<Option<AuthSession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl BackendAgent {
    /// Build an agent, opening the session store named in the config
    pub async fn connect(config: BackendConfig) -> Result<Self> {
        let store = match &config.session_path {
            Some(path) => SessionStore::open(path.clone()).await?,
            None => SessionStore::in_memory(),
        };
        Self::with_store(&config, store)
    }

    /// Build an agent around an existing store
    pub fn with_store(config: &BackendConfig, store: SessionStore) -> Result<Self> {
        let client = RestClient::new(config)?;
        let (events, _) = broadcast::channel(16);

        Ok(Self { client, store, session: RwLock::new(None), events })
    }

    /// The underlying REST client
    pub fn rest(&self) -> &RestClient {
        &self.client
    }

    async fn bearer(&self) -> Option<String> {
        self.session.read().await.as_ref().map(|s| s.access_token.clone())
    }

    /// Install a session as current, persist it and announce it
    async fn adopt(&self, session: AuthSession, event: AuthEvent) -> Result<()> {
        self.store.save(&session).await?;
        *self.session.write().await = Some(session);
        // No receivers is fine
        let _ = self.events.send(event);
        Ok(())
    }

    /// Drop the current session locally and announce it
    async fn forget(&self) -> Result<()> {
        let had_session = self.session.write().await.take().is_some();
        self.store.clear().await?;
        if had_session {
            let _ = self.events.send(AuthEvent::SignedOut);
        }
        Ok(())
    }

    async fn exchange_refresh_token(&self, refresh_token: &str, email: &str) -> Result<AuthSession> {
        let request = RestRequest::post(TOKEN_PATH)
            .param("grant_type", "refresh_token")
            .json_body(&RefreshGrant { refresh_token })?;

        let response = self.client.send::<TokenResponse>(request).await?;
        Ok(response.data.into_session(email))
    }

    /// GET of exactly one row by id, as the signed-in user when there is one
    async fn single_row(&self, path: &str, user_id: &str) -> RestRequest {
        let mut request = RestRequest::get(path)
            .param("id", format!("eq.{}", user_id))
            .param("select", "*")
            .header("Accept", SINGLE_OBJECT);
        if let Some(token) = self.bearer().await {
            request = request.bearer(token);
        }
        request
    }

    /// Read the role-specific row of a user
    ///
    /// Admins have no such row and get `None`. A missing row for a teacher
    /// or student is reported by the service as a rejection.
    pub async fn fetch_role_record(&self, user_id: &str, role: UserRole) -> Result<Option<RoleRecord>> {
        let Some(table) = role_table(role) else {
            return Ok(None);
        };
        let request = self.single_row(&format!("/rest/v1/{}", table), user_id).await;

        let record = match role {
            UserRole::Teacher => {
                RoleRecord::Teacher(self.client.send::<TeacherProfile>(request).await?.data)
            }
            UserRole::Student => {
                RoleRecord::Student(self.client.send::<StudentProfile>(request).await?.data)
            }
            UserRole::Admin => return Ok(None),
        };
        Ok(Some(record))
    }

    async fn insert_rows(&self, request: &SignUpRequest, identity: &Identity, bearer: Option<&str>) -> Result<()> {
        let profile = NewUserProfile {
            id: identity.id.clone(),
            full_name: request.full_name.clone(),
            email: identity.email.clone(),
            role: request.role,
            is_active: true,
        };

        let mut insert = RestRequest::post(PROFILES_PATH)
            .header("Prefer", "return=minimal")
            .json_body(&profile)?;
        if let Some(token) = bearer {
            insert = insert.bearer(token);
        }
        self.client.send_empty(insert).await?;

        if let Some(table) = role_table(request.role) {
            let mut insert = RestRequest::post(format!("/rest/v1/{}", table))
                .header("Prefer", "return=minimal")
                .json_body(&RoleRecordInsert { id: identity.id.clone() })?;
            if let Some(token) = bearer {
                insert = insert.bearer(token);
            }
            self.client.send_empty(insert).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for BackendAgent {
    async fn authenticate(&self, email: &str, password: &str) -> Result<AuthSession> {
        let request = RestRequest::post(TOKEN_PATH)
            .param("grant_type", "password")
            .json_body(&PasswordGrant { email, password })?;

        let response = self.client.send::<TokenResponse>(request).await?;
        let session = response.data.into_session(email);

        tracing::info!(user_id = %session.identity.id, "authenticated");
        self.adopt(session.clone(), AuthEvent::SignedIn(session.identity.clone()))
            .await?;
        Ok(session)
    }

    async fn register(&self, request: &SignUpRequest) -> Result<Identity> {
        let body = SignUpBody {
            email: &request.email,
            password: &request.password,
            data: SignUpMetadata { full_name: &request.full_name, role: request.role.as_str() },
        };
        let signup = RestRequest::post(SIGNUP_PATH).json_body(&body)?;

        let response = self.client.send::<SignUpResponse>(signup).await?.data;
        let identity = response
            .identity(&request.email)
            .ok_or_else(|| Error::InvalidResponse("sign-up response has no user id".to_string()))?;

        // The sign-up token is only used to write the profile rows; it is
        // neither kept nor announced, so the new user is not signed in.
        self.insert_rows(request, &identity, response.access_token.as_deref())
            .await?;

        tracing::info!(user_id = %identity.id, role = %request.role, "registered");
        Ok(identity)
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<UserProfile> {
        let request = self.single_row(PROFILES_PATH, user_id).await;
        let response = self.client.send::<UserProfile>(request).await?;
        Ok(response.data)
    }

    async fn sign_out(&self) -> Result<()> {
        let remote = match self.bearer().await {
            Some(token) => self
                .client
                .send_empty(RestRequest::post(LOGOUT_PATH).bearer(token))
                .await
                .map(|_| ()),
            None => Ok(()),
        };

        // Local state goes regardless of what the service said
        self.forget().await?;

        if let Err(ref e) = remote {
            tracing::warn!(error = %e, "remote sign-out failed, local session cleared");
        }
        remote.map_err(Error::from)
    }

    async fn restore_session(&self) -> Result<Option<AuthSession>> {
        let Some(stored) = self.store.load().await? else {
            return Ok(None);
        };

        if !stored.is_expired() {
            tracing::debug!(user_id = %stored.identity.id, "restored persisted session");
            self.adopt(stored.clone(), AuthEvent::SignedIn(stored.identity.clone()))
                .await?;
            return Ok(Some(stored));
        }

        if !stored.can_refresh() {
            self.store.clear().await?;
            return Ok(None);
        }

        match self
            .exchange_refresh_token(&stored.refresh_token, &stored.identity.email)
            .await
        {
            Ok(fresh) => {
                tracing::debug!(user_id = %fresh.identity.id, "refreshed persisted session");
                self.adopt(fresh.clone(), AuthEvent::SignedIn(fresh.identity.clone()))
                    .await?;
                Ok(Some(fresh))
            }
            Err(e) if e.is_rejection() => {
                tracing::info!(error = %e, "persisted session rejected, discarding");
                self.store.clear().await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_session(&self) -> Result<AuthSession> {
        let current = self.session.read().await.clone().ok_or(Error::NoSession)?;

        match self
            .exchange_refresh_token(&current.refresh_token, &current.identity.email)
            .await
        {
            Ok(fresh) => {
                self.adopt(fresh.clone(), AuthEvent::TokenRefreshed(fresh.identity.clone()))
                    .await?;
                Ok(fresh)
            }
            Err(e) if e.is_rejection() => {
                // Refresh token revoked elsewhere: the session is over
                self.forget().await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn current_session(&self) -> Option<AuthSession> {
        self.session.read().await.clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
