//! Application screens
//!
//! Screen controllers own their form state and talk to the
//! [`IdentityGateway`]; rendering is left to the platform layer. Every
//! submit ends in a [`Notice`] the user can see.

use crate::navigation::{Navigator, Route};
use crate::role_router::{self, Destination};
use app_core::{AuthError, Credential, IdentityGateway, RegistrationForm};
use backend_client::UserRole;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Navigator shared by all screens
pub type SharedNavigator = Arc<Mutex<Navigator>>;

// =============================================================================
// Notices
// =============================================================================

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    /// Something worked
    Success,
    /// Something failed
    Error,
}

/// Message shown to the user after an action
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// Severity
    pub kind: NoticeKind,
    /// Short heading
    pub title: String,
    /// Body text
    pub message: String,
}

impl Notice {
    /// Success notice
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Success, title: title.into(), message: message.into() }
    }

    /// Error notice
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: NoticeKind::Error, title: title.into(), message: message.into() }
    }

    /// Error notice for a failed auth action
    fn from_auth_error(title: &str, err: &AuthError) -> Self {
        match err {
            AuthError::Validation(_) | AuthError::Unexpected { .. } => {
                Self::error("Error", err.user_message())
            }
            AuthError::Provider { .. } => Self::error(title, err.user_message()),
        }
    }

    /// Whether this reports a failure
    pub fn is_error(&self) -> bool {
        self.kind == NoticeKind::Error
    }
}

/// Result of pressing a submit button
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// A submit is already running; nothing was done
    Busy,
    /// The submit ran to completion
    Completed(Notice),
}

impl Submission {
    /// The notice, if the submit ran
    pub fn notice(&self) -> Option<&Notice> {
        match self {
            Submission::Busy => None,
            Submission::Completed(notice) => Some(notice),
        }
    }
}

/// Clears the in-flight flag when the submit ends, however it ends
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// =============================================================================
// Landing
// =============================================================================

/// A button on the landing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallToAction {
    /// Button text
    pub label: &'static str,
    /// Where it leads
    pub route: Route,
}

/// Welcome page for signed-out visitors
#[derive(Debug, Clone)]
pub struct LandingScreen {
    navigator: SharedNavigator,
}

impl LandingScreen {
    /// Create the landing screen
    pub fn new(navigator: SharedNavigator) -> Self {
        Self { navigator }
    }

    /// The page's calls to action, in display order
    pub fn actions(&self) -> [CallToAction; 3] {
        [
            CallToAction { label: "Sign in", route: Route::Login },
            CallToAction { label: "Start learning now", route: Route::register(None) },
            CallToAction {
                label: "Join as a teacher",
                route: Route::register(Some(UserRole::Teacher)),
            },
        ]
    }

    /// Follow a call to action
    pub fn activate(&self, action: &CallToAction) {
        self.navigator.lock().push(action.route.clone());
    }
}

// =============================================================================
// Login
// =============================================================================

/// Sign-in form input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginForm {
    /// Email as typed
    pub email: String,
    /// Password as typed
    pub password: String,
}

/// Sign-in screen
pub struct LoginScreen {
    gateway: Arc<IdentityGateway>,
    navigator: SharedNavigator,
    form: Mutex<LoginForm>,
    in_flight: AtomicBool,
    notice: Mutex<Option<Notice>>,
}

impl LoginScreen {
    /// Create the sign-in screen
    pub fn new(gateway: Arc<IdentityGateway>, navigator: SharedNavigator) -> Self {
        Self {
            gateway,
            navigator,
            form: Mutex::new(LoginForm::default()),
            in_flight: AtomicBool::new(false),
            notice: Mutex::new(None),
        }
    }

    /// Update the email field
    pub fn set_email(&self, email: impl Into<String>) {
        self.form.lock().email = email.into();
    }

    /// Update the password field
    pub fn set_password(&self, password: impl Into<String>) {
        self.form.lock().password = password.into();
    }

    /// Whether a submit is running
    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Last notice shown
    pub fn notice(&self) -> Option<Notice> {
        self.notice.lock().clone()
    }

    /// Link to the sign-up screen
    pub fn go_to_register(&self) {
        self.navigator.lock().push(Route::register(None));
    }

    /// Validate and sign in; on success the navigator moves to the dashboard
    pub async fn submit(&self) -> Submission {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            return Submission::Busy;
        };

        let form = self.form.lock().clone();
        let notice = match self.sign_in(&form).await {
            Ok(()) => {
                self.navigator.lock().reset(Route::Dashboard);
                Notice::success("Signed in", "Welcome back!")
            }
            Err(err) => Notice::from_auth_error("Sign-in failed", &err),
        };

        *self.notice.lock() = Some(notice.clone());
        Submission::Completed(notice)
    }

    async fn sign_in(&self, form: &LoginForm) -> Result<(), AuthError> {
        let credential = Credential::new(&form.email, &form.password)?;
        self.gateway.sign_in(&credential).await
    }
}

// =============================================================================
// Register
// =============================================================================

/// Sign-up screen
pub struct RegisterScreen {
    gateway: Arc<IdentityGateway>,
    navigator: SharedNavigator,
    form: Mutex<RegistrationForm>,
    in_flight: AtomicBool,
    notice: Mutex<Option<Notice>>,
}

impl RegisterScreen {
    /// Create the sign-up screen, preselecting the role from a deep link
    pub fn new(
        gateway: Arc<IdentityGateway>,
        navigator: SharedNavigator,
        role_hint: Option<UserRole>,
    ) -> Self {
        let form = RegistrationForm { role: role_hint.unwrap_or_default(), ..Default::default() };
        Self {
            gateway,
            navigator,
            form: Mutex::new(form),
            in_flight: AtomicBool::new(false),
            notice: Mutex::new(None),
        }
    }

    /// Edit the form
    pub fn update(&self, edit: impl FnOnce(&mut RegistrationForm)) {
        edit(&mut self.form.lock());
    }

    /// Current form contents
    pub fn form(&self) -> RegistrationForm {
        self.form.lock().clone()
    }

    /// Roles offered by the role picker
    pub fn selectable_roles(&self) -> [UserRole; 2] {
        [UserRole::Student, UserRole::Teacher]
    }

    /// Whether a submit is running
    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Last notice shown
    pub fn notice(&self) -> Option<Notice> {
        self.notice.lock().clone()
    }

    /// Link back to the sign-in screen
    pub fn go_to_login(&self) {
        self.navigator.lock().replace(Route::Login);
    }

    /// Validate and create the account; on success the navigator moves to sign-in
    pub async fn submit(&self) -> Submission {
        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            return Submission::Busy;
        };

        let form = self.form();
        let notice = match self.sign_up(&form).await {
            Ok(()) => {
                self.navigator.lock().replace(Route::Login);
                Notice::success("Account created", "Your account was created. You can sign in now.")
            }
            Err(err) => Notice::from_auth_error("Account creation failed", &err),
        };

        *self.notice.lock() = Some(notice.clone());
        Submission::Completed(notice)
    }

    async fn sign_up(&self, form: &RegistrationForm) -> Result<(), AuthError> {
        let registration = form.validate()?;
        self.gateway.sign_up(&registration).await
    }
}

// =============================================================================
// Dashboard
// =============================================================================

/// Role-specific tab shell
pub struct DashboardShell {
    gateway: Arc<IdentityGateway>,
    navigator: SharedNavigator,
}

impl DashboardShell {
    /// Create the shell
    pub fn new(gateway: Arc<IdentityGateway>, navigator: SharedNavigator) -> Self {
        Self { gateway, navigator }
    }

    /// Decide what to show, following a redirect if the router asks for one
    pub fn render(&self) -> Destination {
        let destination = role_router::route(&self.gateway.context().snapshot());
        if let Destination::Redirect(route) = &destination {
            self.navigator.lock().reset(route.clone());
        }
        destination
    }

    /// Wait for the next context change and render again
    pub async fn next_render(
        &self,
        changes: &mut tokio::sync::watch::Receiver<app_state::SessionSnapshot>,
    ) -> Option<Destination> {
        changes.changed().await.ok()?;
        Some(self.render())
    }

    /// Retry a failed profile load
    pub async fn retry(&self) -> Notice {
        match self.gateway.retry_profile().await {
            Ok(()) => Notice::success("Profile loaded", "Your profile is ready."),
            Err(err) => Notice::from_auth_error("Profile unavailable", &err),
        }
    }

    /// Sign out and go to the sign-in screen
    pub async fn sign_out(&self) -> Notice {
        let result = self.gateway.sign_out().await;
        self.navigator.lock().reset(Route::Login);
        match result {
            Ok(()) => Notice::success("Signed out", "See you soon."),
            Err(err) => Notice::from_auth_error("Sign-out incomplete", &err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_state::{SessionContext, SessionPhase};
    use async_trait::async_trait;
    use backend_client::session::AuthSession;
    use backend_client::{AuthEvent, Identity, IdentityProvider, SignUpRequest, UserProfile};
    use chrono::Utc;
    use mockall::mock;
    use std::time::Duration;
    use tokio::sync::broadcast;

    mock! {
        pub Provider {}

        #[async_trait]
        impl IdentityProvider for Provider {
            async fn authenticate(&self, email: &str, password: &str) -> backend_client::Result<AuthSession>;
            async fn register(&self, request: &SignUpRequest) -> backend_client::Result<Identity>;
            async fn fetch_profile(&self, user_id: &str) -> backend_client::Result<UserProfile>;
            async fn sign_out(&self) -> backend_client::Result<()>;
            async fn restore_session(&self) -> backend_client::Result<Option<AuthSession>>;
            async fn refresh_session(&self) -> backend_client::Result<AuthSession>;
            async fn current_session(&self) -> Option<AuthSession>;
            fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
        }
    }

    fn session(id: &str) -> AuthSession {
        AuthSession {
            access_token: "token".to_string(),
            refresh_token: "refresh".to_string(),
            token_type: "bearer".to_string(),
            expires_at: Some(Utc::now().timestamp() + 3600),
            identity: Identity::new(id, format!("{}@example.com", id)),
        }
    }

    fn profile(id: &str, role: UserRole) -> UserProfile {
        UserProfile {
            id: id.to_string(),
            full_name: "Mona".to_string(),
            email: format!("{}@example.com", id),
            phone: None,
            avatar_url: None,
            role,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn setup(provider: MockProvider) -> (Arc<IdentityGateway>, Arc<SessionContext>, SharedNavigator) {
        let context = Arc::new(SessionContext::new());
        let gateway = Arc::new(IdentityGateway::new(Arc::new(provider), Arc::clone(&context)));
        let navigator = Arc::new(Mutex::new(Navigator::default()));
        (gateway, context, navigator)
    }

    #[test]
    fn test_landing_actions() {
        let navigator = Arc::new(Mutex::new(Navigator::default()));
        let landing = LandingScreen::new(Arc::clone(&navigator));
        let actions = landing.actions();

        assert_eq!(actions[0].route, Route::Login);
        assert_eq!(actions[2].route, Route::register(Some(UserRole::Teacher)));

        landing.activate(&actions[2]);
        assert_eq!(navigator.lock().current(), &Route::register(Some(UserRole::Teacher)));
    }

    #[tokio::test]
    async fn test_login_empty_email_never_calls_backend() {
        let mut provider = MockProvider::new();
        provider.expect_authenticate().never();
        let (gateway, _, navigator) = setup(provider);

        let screen = LoginScreen::new(gateway, Arc::clone(&navigator));
        screen.set_email("");
        screen.set_password("x");

        let notice = screen.submit().await.notice().cloned().unwrap();
        assert!(notice.is_error());
        assert!(notice.message.contains("Email"));
        assert_eq!(navigator.lock().current(), &Route::Landing);
        assert!(!screen.is_submitting());
    }

    #[tokio::test]
    async fn test_login_blank_password_never_calls_backend() {
        let mut provider = MockProvider::new();
        provider.expect_authenticate().never();
        let (gateway, _, navigator) = setup(provider);

        let screen = LoginScreen::new(gateway, Arc::clone(&navigator));
        screen.set_email("a@b.com");
        screen.set_password("   ");

        let notice = screen.submit().await.notice().cloned().unwrap();
        assert!(notice.is_error());
        assert!(notice.message.contains("Password"));
        assert_eq!(navigator.lock().current(), &Route::Landing);
    }

    #[tokio::test]
    async fn test_login_success_navigates_to_dashboard() {
        let mut provider = MockProvider::new();
        provider.expect_authenticate().returning(|_, _| Ok(session("u1")));
        provider.expect_fetch_profile().returning(|id| Ok(profile(id, UserRole::Student)));
        let (gateway, context, navigator) = setup(provider);

        let screen = LoginScreen::new(gateway, Arc::clone(&navigator));
        screen.set_email("u1@example.com");
        screen.set_password("secret123");

        let submission = screen.submit().await;
        assert!(!submission.notice().unwrap().is_error());
        assert_eq!(navigator.lock().current(), &Route::Dashboard);
        assert_eq!(context.snapshot().phase(), SessionPhase::AuthenticatedReady);
    }

    #[tokio::test]
    async fn test_login_provider_message_verbatim() {
        let mut provider = MockProvider::new();
        provider.expect_authenticate().returning(|_, _| {
            Err(backend_client::Error::Provider {
                status: 400,
                code: "invalid_grant".to_string(),
                message: "Invalid login credentials".to_string(),
            })
        });
        let (gateway, _, navigator) = setup(provider);

        let screen = LoginScreen::new(gateway, navigator);
        screen.set_email("u1@example.com");
        screen.set_password("nope");

        screen.submit().await;
        let notice = screen.notice().unwrap();
        assert_eq!(notice.title, "Sign-in failed");
        assert_eq!(notice.message, "Invalid login credentials");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_submit_while_in_flight_is_rejected() {
        let mut provider = MockProvider::new();
        provider.expect_authenticate().times(1).returning(|_, _| {
            std::thread::sleep(Duration::from_millis(50));
            Ok(session("u1"))
        });
        provider.expect_fetch_profile().returning(|id| Ok(profile(id, UserRole::Student)));
        let (gateway, _, navigator) = setup(provider);

        let screen = Arc::new(LoginScreen::new(gateway, navigator));
        screen.set_email("u1@example.com");
        screen.set_password("secret123");

        let first = {
            let screen = Arc::clone(&screen);
            tokio::spawn(async move { screen.submit().await })
        };
        while !screen.is_submitting() {
            tokio::task::yield_now().await;
        }
        assert_eq!(screen.submit().await, Submission::Busy);

        assert!(matches!(first.await.unwrap(), Submission::Completed(_)));
        assert!(!screen.is_submitting());
    }

    #[tokio::test]
    async fn test_register_short_password() {
        let mut provider = MockProvider::new();
        provider.expect_register().never();
        let (gateway, _, navigator) = setup(provider);

        let screen = RegisterScreen::new(gateway, navigator, None);
        screen.update(|form| {
            form.full_name = "Mona".to_string();
            form.email = "a@b.com".to_string();
            form.password = "abc".to_string();
            form.confirm_password = "abc".to_string();
        });

        let notice = screen.submit().await.notice().cloned().unwrap();
        assert!(notice.is_error());
        assert!(notice.message.contains("at least 6"));
    }

    #[tokio::test]
    async fn test_register_teacher_goes_to_login_unauthenticated() {
        let mut provider = MockProvider::new();
        provider
            .expect_register()
            .withf(|request| request.role == UserRole::Teacher)
            .times(1)
            .returning(|request| Ok(Identity::new("new", request.email.clone())));
        provider.expect_authenticate().never();
        let (gateway, context, navigator) = setup(provider);
        navigator.lock().push(Route::register(Some(UserRole::Teacher)));

        let screen = RegisterScreen::new(gateway, Arc::clone(&navigator), Some(UserRole::Teacher));
        assert_eq!(screen.form().role, UserRole::Teacher);
        screen.update(|form| {
            form.full_name = "Mona".to_string();
            form.email = "a@b.com".to_string();
            form.password = "abcdef".to_string();
            form.confirm_password = "abcdef".to_string();
        });

        let notice = screen.submit().await.notice().cloned().unwrap();
        assert_eq!(notice.kind, NoticeKind::Success);
        assert_eq!(navigator.lock().current(), &Route::Login);
        assert!(context.snapshot().identity.is_none());
    }

    #[tokio::test]
    async fn test_register_default_role_is_student() {
        let (gateway, _, navigator) = setup(MockProvider::new());
        let screen = RegisterScreen::new(gateway, navigator, None);
        assert_eq!(screen.form().role, UserRole::Student);
        assert!(!screen.selectable_roles().contains(&UserRole::Admin));
    }

    #[tokio::test]
    async fn test_dashboard_redirects_when_signed_out() {
        let mut provider = MockProvider::new();
        provider.expect_restore_session().returning(|| Ok(None));
        let (gateway, _, navigator) = setup(provider);
        navigator.lock().push(Route::Dashboard);

        gateway.restore_session().await;
        let shell = DashboardShell::new(gateway, Arc::clone(&navigator));

        assert_eq!(shell.render(), Destination::Redirect(Route::Login));
        assert_eq!(navigator.lock().current(), &Route::Login);
        assert_eq!(navigator.lock().depth(), 1);
    }

    #[tokio::test]
    async fn test_dashboard_pending_profile_then_retry() {
        let mut provider = MockProvider::new();
        provider.expect_restore_session().returning(|| Ok(Some(session("u1"))));
        let mut seq = mockall::Sequence::new();
        provider
            .expect_fetch_profile()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(backend_client::Error::Network("offline".to_string())));
        provider
            .expect_fetch_profile()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| Ok(profile(id, UserRole::Admin)));
        let (gateway, _, navigator) = setup(provider);

        gateway.restore_session().await;
        let shell = DashboardShell::new(gateway, navigator);
        assert_eq!(shell.render(), Destination::Placeholder);

        assert!(!shell.retry().await.is_error());
        match shell.render() {
            Destination::Dashboard(set) => assert_eq!(set.role, UserRole::Admin),
            other => panic!("expected dashboard, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dashboard_sign_out() {
        let mut provider = MockProvider::new();
        provider.expect_authenticate().returning(|_, _| Ok(session("u1")));
        provider.expect_fetch_profile().returning(|id| Ok(profile(id, UserRole::Teacher)));
        provider.expect_sign_out().times(1).returning(|| Ok(()));
        let (gateway, context, navigator) = setup(provider);

        let credential = Credential::new("u1@example.com", "secret123").unwrap();
        gateway.sign_in(&credential).await.unwrap();
        let shell = DashboardShell::new(gateway, Arc::clone(&navigator));

        let notice = shell.sign_out().await;
        assert!(!notice.is_error());
        assert_eq!(navigator.lock().current(), &Route::Login);
        assert_eq!(context.snapshot().phase(), SessionPhase::Unauthenticated);
    }
}
