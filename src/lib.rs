//! sessionkeeper - keeps a locally cached authentication session consistent
//! with a remote identity provider.
//!
//! This library exposes modules for use by the binary and integration tests.

pub mod activation;
pub mod adapters;
pub mod auth;
pub mod error;
pub mod session;
pub mod startup;
pub mod traits;
