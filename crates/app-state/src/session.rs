//! Session/profile context
//!
//! [`SessionContext`] is the single owner of "who is signed in and what is
//! their profile". Writers are the identity gateway and the auth listener;
//! readers are the router and the screens.
//!
//! Every write replaces the identity/profile pair under one lock. A
//! generation counter moves whenever the identity changes, and profile
//! results carry a [`ProfileTicket`] naming the generation they were
//! requested for, so a late profile for a previous identity is dropped.

use crate::subscription::AuthSubscription;
use backend_client::{Identity, UserProfile, UserRole};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;

/// Coarse state of the context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    /// Session restore has not finished
    Uninitialized,
    /// Nobody is signed in
    Unauthenticated,
    /// Signed in, profile not resolved yet (or its fetch failed)
    AuthenticatedPending,
    /// Signed in with a resolved profile
    AuthenticatedReady,
}

/// Point-in-time copy of the context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// True until the persisted session has been looked at
    pub loading: bool,
    /// Signed-in identity
    pub identity: Option<Identity>,
    /// Profile of `identity`, once fetched
    pub profile: Option<UserProfile>,
    /// Last profile fetch failure for the current identity
    pub profile_error: Option<String>,
    /// Bumped on every identity change
    pub generation: u64,
}

impl SessionSnapshot {
    fn initial() -> Self {
        Self { loading: true, identity: None, profile: None, profile_error: None, generation: 0 }
    }

    /// Which of the four states this snapshot is in
    pub fn phase(&self) -> SessionPhase {
        match (&self.identity, &self.profile) {
            (None, _) if self.loading => SessionPhase::Uninitialized,
            (None, _) => SessionPhase::Unauthenticated,
            (Some(_), None) => SessionPhase::AuthenticatedPending,
            (Some(_), Some(_)) => SessionPhase::AuthenticatedReady,
        }
    }

    /// Whether an identity is present
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }

    /// Role of the resolved profile
    pub fn role(&self) -> Option<UserRole> {
        self.profile.as_ref().map(|p| p.role)
    }
}

/// Permission to apply one profile result
///
/// Issued when an identity is installed; only valid while that identity and
/// generation are still current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileTicket {
    generation: u64,
    user_id: String,
}

impl ProfileTicket {
    /// The identity the profile should belong to
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Generation the ticket was issued for
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Shared holder of identity, profile and loading state
///
/// # Example
///
/// ```
/// use app_state::session::{SessionContext, SessionPhase};
/// use backend_client::Identity;
///
/// let context = SessionContext::new();
/// assert_eq!(context.snapshot().phase(), SessionPhase::Uninitialized);
///
/// let ticket = context.begin_identity(Identity::new("u1", "a@b.com"));
/// assert_eq!(ticket.user_id(), "u1");
/// assert_eq!(context.snapshot().phase(), SessionPhase::AuthenticatedPending);
///
/// context.clear();
/// assert_eq!(context.snapshot().phase(), SessionPhase::Unauthenticated);
/// ```
pub struct SessionContext {
    state: RwLock<SessionSnapshot>,
    changes: watch::Sender<SessionSnapshot>,
    subscription: Mutex<Option<AuthSubscription>>,
}

impl SessionContext {
    /// Create a context in the `Uninitialized` state
    pub fn new() -> Self {
        let (changes, _) = watch::channel(SessionSnapshot::initial());
        Self {
            state: RwLock::new(SessionSnapshot::initial()),
            changes,
            subscription: Mutex::new(None),
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.read().clone()
    }

    /// Receive every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.changes.subscribe()
    }

    /// Apply `f` under the write lock and publish the result
    fn write<R>(&self, f: impl FnOnce(&mut SessionSnapshot) -> R) -> R {
        let mut state = self.state.write();
        let result = f(&mut state);
        // Publishing under the lock keeps watchers in write order
        self.changes.send_replace(state.clone());
        result
    }

    /// Install `identity` as signed in
    ///
    /// A different identity starts a new generation with no profile. The
    /// same identity again (token refresh) keeps the resolved profile.
    pub fn begin_identity(&self, identity: Identity) -> ProfileTicket {
        self.write(|state| {
            state.loading = false;

            let same = state.identity.as_ref().is_some_and(|current| current.id == identity.id);
            if !same {
                state.generation += 1;
                state.profile = None;
                state.profile_error = None;
                tracing::debug!(user_id = %identity.id, generation = state.generation, "identity changed");
            }

            let ticket = ProfileTicket { generation: state.generation, user_id: identity.id.clone() };
            state.identity = Some(identity);
            ticket
        })
    }

    /// Ticket for the current identity, if any
    pub fn current_ticket(&self) -> Option<ProfileTicket> {
        let state = self.state.read();
        state
            .identity
            .as_ref()
            .map(|identity| ProfileTicket { generation: state.generation, user_id: identity.id.clone() })
    }

    fn ticket_is_current(state: &SessionSnapshot, ticket: &ProfileTicket) -> bool {
        state.generation == ticket.generation
            && state.identity.as_ref().is_some_and(|identity| identity.id == ticket.user_id)
    }

    /// Apply a fetched profile. Returns false if the ticket is stale.
    pub fn resolve_profile(&self, ticket: &ProfileTicket, profile: UserProfile) -> bool {
        if profile.id != ticket.user_id {
            tracing::warn!(expected = %ticket.user_id, got = %profile.id, "profile id mismatch, ignoring");
            return false;
        }

        let applied = {
            let mut state = self.state.write();
            if Self::ticket_is_current(&state, ticket) {
                state.profile = Some(profile);
                state.profile_error = None;
                self.changes.send_replace(state.clone());
                true
            } else {
                false
            }
        };

        if !applied {
            tracing::debug!(user_id = %ticket.user_id, "stale profile dropped");
        }
        applied
    }

    /// Record a failed profile fetch. Returns false if the ticket is stale.
    pub fn profile_failed(&self, ticket: &ProfileTicket, message: impl Into<String>) -> bool {
        let message = message.into();
        let mut state = self.state.write();
        if !Self::ticket_is_current(&state, ticket) {
            return false;
        }
        state.profile_error = Some(message);
        self.changes.send_replace(state.clone());
        true
    }

    /// Forget the identity and profile
    pub fn clear(&self) {
        self.write(|state| {
            if state.identity.is_some() {
                state.generation += 1;
            }
            state.loading = false;
            state.identity = None;
            state.profile = None;
            state.profile_error = None;
        });
    }

    /// Leave `Uninitialized` without an identity (nothing to restore)
    pub fn finish_restore(&self) {
        let mut state = self.state.write();
        if state.loading {
            state.loading = false;
            self.changes.send_replace(state.clone());
        }
    }

    /// Take ownership of the auth listener, stopping any previous one
    pub fn attach_subscription(&self, subscription: AuthSubscription) {
        let previous = self.subscription.lock().replace(subscription);
        if let Some(previous) = previous {
            previous.stop();
        }
    }

    /// Whether an auth listener is attached and running
    pub fn is_listening(&self) -> bool {
        self.subscription.lock().as_ref().is_some_and(|s| !s.is_finished())
    }

    /// Stop the auth listener
    pub fn shutdown(&self) {
        if let Some(subscription) = self.subscription.lock().take() {
            subscription.stop();
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext").field("state", &*self.state.read()).finish()
    }
}
