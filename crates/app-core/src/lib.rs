//! Core business logic for Tutor Compass
//!
//! Sign-in, sign-up and sign-out flows plus the form validation in front
//! of them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod gateway;
pub mod validation;

pub use gateway::{AuthError, IdentityGateway};
pub use validation::{Credential, Registration, RegistrationForm, ValidationError};
