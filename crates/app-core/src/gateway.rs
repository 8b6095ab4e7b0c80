//! Identity gateway
//!
//! High-level sign-in, sign-up and sign-out flows. The gateway talks to the
//! backend through an [`IdentityProvider`] and writes the outcome into the
//! shared [`SessionContext`]; screens only ever see the context.

use crate::validation::{Credential, Registration, ValidationError};
use app_state::{AuthSubscription, ProfileTicket, SessionContext};
use backend_client::{AuthEvent, Identity, IdentityProvider, SignUpRequest};
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;

/// Message shown for failures that are not the user's doing
pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// Gateway error types
#[derive(Debug, Error)]
pub enum AuthError {
    /// Input rejected before any network call
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The identity service refused the request; `message` is its own wording
    #[error("{message}")]
    Provider {
        /// Message from the service
        message: String,
    },

    /// Connectivity, malformed response or local storage fault
    #[error("Unexpected error: {detail}")]
    Unexpected {
        /// What went wrong, for logs
        detail: String,
    },
}

impl AuthError {
    /// Text to put in front of the user
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Validation(e) => e.to_string(),
            AuthError::Provider { message } => message.clone(),
            AuthError::Unexpected { .. } => UNEXPECTED_MESSAGE.to_string(),
        }
    }
}

impl From<backend_client::Error> for AuthError {
    fn from(err: backend_client::Error) -> Self {
        match err {
            backend_client::Error::Provider { message, .. } => AuthError::Provider { message },
            other => AuthError::Unexpected { detail: other.to_string() },
        }
    }
}

/// Result type for gateway operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Default window for proactive token refresh
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(60);

/// Entry point for every auth flow
///
/// # Example
///
/// ```rust,no_run
/// use app_core::gateway::IdentityGateway;
/// use app_core::validation::Credential;
/// use app_state::SessionContext;
/// use backend_client::{BackendAgent, BackendConfig};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let agent = BackendAgent::connect(BackendConfig::from_env()?).await?;
///     let context = Arc::new(SessionContext::new());
///     let gateway = IdentityGateway::new(Arc::new(agent), Arc::clone(&context));
///
///     gateway.subscribe_auth_changes();
///     gateway.restore_session().await;
///
///     let credential = Credential::new("mona@example.com", "secret123")?;
///     gateway.sign_in(&credential).await?;
///     println!("{:?}", context.snapshot().phase());
///     Ok(())
/// }
/// ```
pub struct IdentityGateway {
    provider: Arc<dyn IdentityProvider>,
    context: Arc<SessionContext>,
    refresh_threshold: Duration,
}

impl IdentityGateway {
    /// Create a gateway writing into `context`
    pub fn new(provider: Arc<dyn IdentityProvider>, context: Arc<SessionContext>) -> Self {
        Self { provider, context, refresh_threshold: DEFAULT_REFRESH_THRESHOLD }
    }

    /// Set the proactive refresh window
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    /// The context this gateway writes to
    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Sign in with a validated credential
    ///
    /// The identity is installed as soon as authentication succeeds; the
    /// profile follows. A failed profile fetch leaves the context pending
    /// with the failure recorded and does not fail the sign-in.
    pub async fn sign_in(&self, credential: &Credential) -> Result<()> {
        let session = self
            .provider
            .authenticate(credential.email(), credential.secret())
            .await
            .map_err(|e| report("sign in", e))?;

        tracing::info!(user_id = %session.identity.id, "signed in");
        let ticket = self.context.begin_identity(session.identity);
        let _ = load_profile(self.provider.as_ref(), &self.context, &ticket).await;
        Ok(())
    }

    /// Create an account. Does not sign the new user in.
    pub async fn sign_up(&self, registration: &Registration) -> Result<()> {
        let request = SignUpRequest {
            email: registration.email().to_string(),
            password: registration.password().to_string(),
            full_name: registration.full_name().to_string(),
            role: registration.role(),
        };

        let identity = self
            .provider
            .register(&request)
            .await
            .map_err(|e| report("sign up", e))?;

        tracing::info!(user_id = %identity.id, role = %registration.role(), "account created");
        Ok(())
    }

    /// Sign out remotely and locally
    ///
    /// The context is cleared even if the remote call fails; that failure is
    /// still returned.
    pub async fn sign_out(&self) -> Result<()> {
        let result = self.provider.sign_out().await;
        self.context.clear();
        tracing::info!("signed out");
        result.map_err(|e| report("sign out", e))
    }

    /// Restore the persisted session at startup
    ///
    /// Always leaves the context out of its initial loading state.
    pub async fn restore_session(&self) -> Option<Identity> {
        match self.provider.restore_session().await {
            Ok(Some(session)) => {
                let identity = session.identity;
                tracing::info!(user_id = %identity.id, "session restored");
                let ticket = self.context.begin_identity(identity.clone());
                let _ = load_profile(self.provider.as_ref(), &self.context, &ticket).await;
                Some(identity)
            }
            Ok(None) => {
                tracing::debug!("no session to restore");
                self.context.finish_restore();
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "session restore failed");
                self.context.finish_restore();
                None
            }
        }
    }

    /// Fetch the profile again for the current identity
    pub async fn retry_profile(&self) -> Result<()> {
        let ticket = self.context.current_ticket().ok_or_else(|| AuthError::Unexpected {
            detail: "no signed-in identity".to_string(),
        })?;
        load_profile(self.provider.as_ref(), &self.context, &ticket).await
    }

    /// Refresh the access token if it expires within the threshold
    ///
    /// Returns whether a refresh happened.
    pub async fn refresh_if_needed(&self) -> Result<bool> {
        let Some(session) = self.provider.current_session().await else {
            return Ok(false);
        };

        let threshold = chrono::Duration::from_std(self.refresh_threshold)
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        if !session.expires_within(threshold) {
            return Ok(false);
        }

        match self.provider.refresh_session().await {
            Ok(fresh) => {
                tracing::debug!(user_id = %fresh.identity.id, "token refreshed");
                self.context.begin_identity(fresh.identity);
                Ok(true)
            }
            Err(e) => {
                if e.is_rejection() {
                    tracing::info!("refresh token rejected, signing out");
                    self.context.clear();
                }
                Err(report("refresh", e))
            }
        }
    }

    /// Start following the provider's auth-state changes
    ///
    /// The listener is handed to the context, which stops it on shutdown.
    /// It only holds a weak reference to the context.
    pub fn subscribe_auth_changes(&self) {
        let events = self.provider.subscribe();
        let provider = Arc::clone(&self.provider);
        let context = Arc::downgrade(&self.context);

        let subscription = AuthSubscription::spawn(listen(events, provider, context));
        self.context.attach_subscription(subscription);
    }
}

/// Convert a backend error, logging faults that are not the user's doing
fn report(operation: &'static str, err: backend_client::Error) -> AuthError {
    let err = AuthError::from(err);
    match &err {
        AuthError::Unexpected { detail } => tracing::error!(operation, detail = %detail, "auth operation failed"),
        other => tracing::info!(operation, error = %other, "auth operation rejected"),
    }
    err
}

async fn load_profile(
    provider: &dyn IdentityProvider,
    context: &SessionContext,
    ticket: &ProfileTicket,
) -> Result<()> {
    match provider.fetch_profile(ticket.user_id()).await {
        Ok(profile) => {
            context.resolve_profile(ticket, profile);
            Ok(())
        }
        Err(e) => {
            tracing::warn!(user_id = %ticket.user_id(), error = %e, "profile fetch failed");
            let err = AuthError::from(e);
            context.profile_failed(ticket, err.user_message());
            Err(err)
        }
    }
}

async fn listen(
    mut events: tokio::sync::broadcast::Receiver<AuthEvent>,
    provider: Arc<dyn IdentityProvider>,
    context: Weak<SessionContext>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "auth listener lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(context) = context.upgrade() else {
            break;
        };
        apply_event(provider.as_ref(), &context, event).await;
    }
}

async fn apply_event(provider: &dyn IdentityProvider, context: &SessionContext, event: AuthEvent) {
    match event {
        AuthEvent::SignedIn(identity) | AuthEvent::TokenRefreshed(identity) => {
            let before = context.current_ticket();
            let ticket = context.begin_identity(identity);
            let needs_profile = before.as_ref() != Some(&ticket) || context.snapshot().profile.is_none();
            if needs_profile {
                let _ = load_profile(provider, context, &ticket).await;
            }
        }
        AuthEvent::SignedOut => context.clear(),
    }
}
