//! Application state for Tutor Compass
//!
//! Holds the signed-in identity and its profile, and owns the background
//! listener that keeps them in sync with the identity provider.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod session;
pub mod subscription;

pub use session::{ProfileTicket, SessionContext, SessionPhase, SessionSnapshot};
pub use subscription::AuthSubscription;
