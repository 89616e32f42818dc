//! Trait abstractions for dependency injection and testability.
//!
//! # Traits
//!
//! - [`CredentialsProvider`] - Persisted credential storage
//! - [`IdentityProvider`] - Remote validate/refresh calls

pub mod credentials;
pub mod identity;

pub use credentials::{CredentialsError, CredentialsProvider};
pub use identity::{IdentityProvider, ProviderError, RefreshResponse, ValidateResponse};
