//! User interface layer for Tutor Compass
//!
//! # Modules
//!
//! - [`navigation`] - Routes, deep-link parsing and the navigation stack
//! - [`role_router`] - Which dashboard tabs a session gets
//! - [`screens`] - Landing, sign-in, sign-up and dashboard controllers
//!
//! # Example
//!
//! ```rust
//! use app_ui::navigation::{Navigator, Route, Router};
//!
//! let router = Router::new();
//! let mut navigator = Navigator::default();
//! navigator.push(router.match_path("/(auth)/login"));
//! assert_eq!(navigator.current(), &Route::Login);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod navigation;
pub mod role_router;
pub mod screens;

pub use navigation::{Navigator, Route, RouteParams, Router, StackEntry};
pub use role_router::{route, Destination, TabSet, TabSpec};
pub use screens::{
    CallToAction, DashboardShell, LandingScreen, LoginScreen, Notice, NoticeKind, RegisterScreen,
    SharedNavigator, Submission,
};
