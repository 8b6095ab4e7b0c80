//! Identity provider seam
//!
//! Everything above this crate talks to the backend through
//! [`IdentityProvider`], which keeps the gateway testable without a server.

use crate::session::AuthSession;
use crate::types::{Identity, UserProfile, UserRole};
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;

/// Auth-state change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// An identity signed in, here or by restoring a persisted session
    SignedIn(Identity),
    /// The access token was renewed for the same identity
    TokenRefreshed(Identity),
    /// The session ended (sign-out or the refresh token was rejected)
    SignedOut,
}

/// Sign-up request sent to the identity service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignUpRequest {
    /// Login email
    pub email: String,
    /// Password
    pub password: String,
    /// Display name for the profile row
    pub full_name: String,
    /// Role the profile row is tagged with
    pub role: UserRole,
}

/// Remote identity and profile operations
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange email and password for a session, and keep it as current
    async fn authenticate(&self, email: &str, password: &str) -> Result<AuthSession>;

    /// Create an identity and its profile rows. Does not sign the user in.
    async fn register(&self, request: &SignUpRequest) -> Result<Identity>;

    /// Load the `user_profiles` row for `user_id`
    async fn fetch_profile(&self, user_id: &str) -> Result<UserProfile>;

    /// End the current session remotely and locally
    async fn sign_out(&self) -> Result<()>;

    /// Load the persisted session, refreshing it once if the access token expired
    async fn restore_session(&self) -> Result<Option<AuthSession>>;

    /// Renew the current session's access token
    async fn refresh_session(&self) -> Result<AuthSession>;

    /// The session currently held, if any
    async fn current_session(&self) -> Option<AuthSession>;

    /// Receive auth-state change notifications
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}
