//! Concrete implementations of trait abstractions.
//!
//! # Adapters
//!
//! - [`FileCredentialsProvider`] - File-based credentials storage
//! - [`CentralIdentityProvider`] - Identity provider over HTTP
//!
//! # Mock Implementations
//!
//! The [`mock`] submodule provides test doubles:
//! - [`mock::InMemoryCredentials`] - In-memory credential storage
//! - [`mock::MockIdentityProvider`] - Scripted validate/refresh answers

pub mod central_identity;
pub mod file_credentials;
pub mod mock;

pub use central_identity::CentralIdentityProvider;
pub use file_credentials::FileCredentialsProvider;
pub use mock::{InMemoryCredentials, MockIdentityProvider};
