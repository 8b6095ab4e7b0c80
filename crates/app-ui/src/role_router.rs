//! Role-based routing for the dashboard
//!
//! [`route`] is a pure function of a [`SessionSnapshot`]: the same snapshot
//! always yields the same [`Destination`]. Which tabs each role gets is a
//! static table, not branching code.

use crate::navigation::Route;
use app_state::{SessionPhase, SessionSnapshot};
use backend_client::UserRole;
use serde::Serialize;

/// One tab of the dashboard shell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TabSpec {
    /// Screen rendered by the tab
    pub screen: &'static str,
    /// Tab label
    pub label: &'static str,
    /// Icon name
    pub icon: &'static str,
}

const fn tab(screen: &'static str, label: &'static str, icon: &'static str) -> TabSpec {
    TabSpec { screen, label, icon }
}

/// Tabs shown to administrators
pub const ADMIN_TABS: [TabSpec; 3] = [
    tab("admin", "Statistics", "bar-chart"),
    tab("search", "Search", "search"),
    tab("profile", "Profile", "user"),
];

/// Tabs shown to teachers. Their search tab looks for students.
pub const TEACHER_TABS: [TabSpec; 3] = [
    tab("teacher", "Dashboard", "home"),
    tab("search", "Students", "search"),
    tab("profile", "Profile", "user"),
];

/// Tabs shown to students
pub const STUDENT_TABS: [TabSpec; 3] = [
    tab("student", "Home", "home"),
    tab("search", "Search", "search"),
    tab("profile", "Profile", "user"),
];

/// Ordered tab set of one dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TabSet {
    /// Role the set was chosen for
    pub role: UserRole,
    /// Tabs, left to right
    pub tabs: &'static [TabSpec],
}

impl TabSet {
    /// Tab set for `role`
    pub fn for_role(role: UserRole) -> Self {
        let tabs: &'static [TabSpec] = match role {
            UserRole::Admin => &ADMIN_TABS,
            UserRole::Teacher => &TEACHER_TABS,
            UserRole::Student => &STUDENT_TABS,
        };
        Self { role, tabs }
    }

    /// The first tab, shown on entry
    pub fn initial(&self) -> Option<&TabSpec> {
        self.tabs.first()
    }

    /// Screen names in order
    pub fn screens(&self) -> Vec<&'static str> {
        self.tabs.iter().map(|t| t.screen).collect()
    }
}

/// What the dashboard should show
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Destination {
    /// Render nothing yet
    Placeholder,
    /// Leave the dashboard
    Redirect(Route),
    /// Show the role's tabs
    Dashboard(TabSet),
}

/// Decide what the dashboard shows for `snapshot`
///
/// A signed-in user whose profile has not arrived gets a placeholder, never
/// the login screen and never some role's tabs.
pub fn route(snapshot: &SessionSnapshot) -> Destination {
    match snapshot.phase() {
        SessionPhase::Uninitialized | SessionPhase::AuthenticatedPending => Destination::Placeholder,
        SessionPhase::Unauthenticated => Destination::Redirect(Route::Login),
        SessionPhase::AuthenticatedReady => match snapshot.role() {
            Some(role) => Destination::Dashboard(TabSet::for_role(role)),
            None => Destination::Placeholder,
        },
    }
}
