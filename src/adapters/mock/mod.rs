//! Mock implementations for testing.
//!
//! # Available Mocks
//!
//! - [`InMemoryCredentials`] - In-memory credential storage with operation counters
//! - [`MockIdentityProvider`] - Identity provider with scripted answers

pub mod credentials;
pub mod identity;

pub use credentials::InMemoryCredentials;
pub use identity::{MockIdentityProvider, MockRefresh, MockValidate};
