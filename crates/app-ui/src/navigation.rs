//! Navigation for Tutor Compass
//!
//! This module provides:
//! - Route definitions with deep linking support
//! - A path router that accepts the legacy grouped paths (`/(auth)/login`)
//! - The navigation stack the screens push onto

use backend_client::UserRole;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Route Parameters
// =============================================================================

/// Parameters for a route
pub type RouteParams = HashMap<String, String>;

// =============================================================================
// Route Definitions
// =============================================================================

/// All possible routes in the application
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "route", content = "params")]
pub enum Route {
    /// Welcome page with the calls to action
    #[default]
    Landing,
    /// Sign-in form
    Login,
    /// Sign-up form
    Register {
        /// Role preselected by a deep link
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<UserRole>,
    },
    /// Role-specific tab shell
    Dashboard,
    /// Unknown path
    NotFound,
}

impl Route {
    /// Sign-up route with an optional role hint
    pub fn register(role: Option<UserRole>) -> Self {
        Route::Register { role }
    }

    /// Convert route to URL path
    pub fn to_path(&self) -> String {
        match self {
            Route::Landing => "/".to_string(),
            Route::Login => "/login".to_string(),
            Route::Register { role: None } => "/register".to_string(),
            Route::Register { role: Some(role) } => {
                format!("/register?role={}", urlencoding::encode(role.as_str()))
            }
            Route::Dashboard => "/dashboard".to_string(),
            Route::NotFound => "/not-found".to_string(),
        }
    }

    /// Check if this route requires a signed-in user
    pub fn requires_auth(&self) -> bool {
        matches!(self, Route::Dashboard)
    }

    /// Get the title for this route
    pub fn title(&self) -> &'static str {
        match self {
            Route::Landing => "Tutor Compass",
            Route::Login => "Sign In",
            Route::Register { .. } => "Create Account",
            Route::Dashboard => "Dashboard",
            Route::NotFound => "Not Found",
        }
    }
}

// =============================================================================
// Navigation Stack
// =============================================================================

/// A navigation stack entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackEntry {
    /// The route
    pub route: Route,
    /// Unique key for this entry
    pub key: String,
}

impl StackEntry {
    /// Create a new stack entry
    pub fn new(route: Route) -> Self {
        Self { route, key: uuid::Uuid::new_v4().to_string() }
    }
}

/// Screen history
///
/// Never empty: the bottom entry can be replaced or reset but not popped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Navigator {
    /// Stack entries (bottom to top)
    entries: Vec<StackEntry>,
    /// Kept separately so `current` needs no fallible lookup
    top: StackEntry,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(Route::Landing)
    }
}

impl Navigator {
    /// Create a navigator showing `root`
    pub fn new(root: Route) -> Self {
        Self { entries: Vec::new(), top: StackEntry::new(root) }
    }

    /// Push a route onto the stack
    pub fn push(&mut self, route: Route) {
        let previous = std::mem::replace(&mut self.top, StackEntry::new(route));
        self.entries.push(previous);
    }

    /// Go back one screen (returns false if already at the root)
    pub fn back(&mut self) -> bool {
        match self.entries.pop() {
            Some(previous) => {
                self.top = previous;
                true
            }
            None => false,
        }
    }

    /// Replace the top route
    pub fn replace(&mut self, route: Route) {
        self.top = StackEntry::new(route);
    }

    /// Drop all history and show `route`
    pub fn reset(&mut self, route: Route) {
        self.entries.clear();
        self.top = StackEntry::new(route);
    }

    /// Get the current (top) route
    pub fn current(&self) -> &Route {
        &self.top.route
    }

    /// Get the current stack entry
    pub fn current_entry(&self) -> &StackEntry {
        &self.top
    }

    /// Check if we can go back
    pub fn can_go_back(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Get stack depth
    pub fn depth(&self) -> usize {
        self.entries.len() + 1
    }

    /// Navigate to a path, e.g. from a deep link
    pub fn open_path(&mut self, router: &Router, path: &str) {
        self.push(router.match_path(path));
    }
}

// =============================================================================
// Router
// =============================================================================

/// Route pattern for matching
struct RoutePattern {
    /// Literal path segments
    segments: Vec<String>,
    /// Route builder
    builder: fn(&RouteParams) -> Option<Route>,
}

/// URL Router for parsing paths to routes
pub struct Router {
    /// Route patterns
    patterns: Vec<RoutePattern>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Create a new router with all routes
    pub fn new() -> Self {
        let mut router = Self { patterns: Vec::new() };

        router.add_route("/", |_| Some(Route::Landing));

        // Auth, with the grouped and prefixed spellings deep links still use
        for prefix in ["", "/auth", "/(auth)"] {
            router.add_route(&format!("{}/login", prefix), |_| Some(Route::Login));
            router.add_route(&format!("{}/register", prefix), |params| {
                Some(Route::Register { role: params.get("role").and_then(|r| parse_role_hint(r)) })
            });
        }

        router.add_route("/dashboard", |_| Some(Route::Dashboard));
        router.add_route("/(dashboard)", |_| Some(Route::Dashboard));

        router
    }

    /// Add a route pattern
    fn add_route(&mut self, pattern: &str, builder: fn(&RouteParams) -> Option<Route>) {
        let segments = pattern.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect();
        self.patterns.push(RoutePattern { segments, builder });
    }

    /// Match a path to a route
    pub fn match_path(&self, path: &str) -> Route {
        let (pathname, query) = match path.split_once('?') {
            Some((pathname, query)) => (pathname, Some(query)),
            None => (path, None),
        };

        let path_segments: Vec<String> = pathname
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::decode(s).map(|d| d.into_owned()).unwrap_or_else(|_| s.to_string()))
            .collect();

        let params = parse_query(query);

        self.patterns
            .iter()
            .filter(|pattern| pattern.segments == path_segments)
            .find_map(|pattern| (pattern.builder)(&params))
            .unwrap_or(Route::NotFound)
    }
}

/// Role hint carried by sign-up deep links. Only self-assignable roles count.
fn parse_role_hint(value: &str) -> Option<UserRole> {
    match value.trim().to_ascii_lowercase().as_str() {
        "teacher" => Some(UserRole::Teacher),
        "student" => Some(UserRole::Student),
        _ => None,
    }
}

/// Parse query string into params
fn parse_query(query: Option<&str>) -> RouteParams {
    let mut params = RouteParams::new();
    if let Some(query) = query {
        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=') {
                if let Ok(decoded) = urlencoding::decode(value) {
                    params.insert(key.to_string(), decoded.into_owned());
                }
            }
        }
    }
    params
}

// =============================================================================
// Tests
// =============================================================================
