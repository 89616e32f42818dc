//! Authentication primitives.
//!
//! This module provides:
//! - Credentials model and atomic file storage
//! - HTTP client for the identity provider's session and refresh endpoints

pub mod central_api;
pub mod credentials;

pub use central_api::CentralApiClient;
pub use credentials::{Credentials, CredentialsManager, SessionUser};
