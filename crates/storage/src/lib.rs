//! Storage layer for Tutor Compass
//!
//! This crate provides durable, versioned persistence for small pieces of
//! client state such as the signed-in session.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod persistence;

pub use persistence::{PersistedState, PersistenceConfig, PersistenceError};
