//! Startup: configuration and wiring.
//!
//! # Components
//!
//! - [`config`] - [`SessionConfig`] with builder methods and env overrides
//! - [`bootstrap`] - Builds the coordinator, sweeps, runs the first check
//!
//! # Usage
//!
//! ```ignore
//! use sessionkeeper::startup::{start, SessionConfig};
//!
//! let runtime = start(&SessionConfig::from_env()).await?;
//! runtime.activation.source.emit(PlatformSignal::FocusGained);
//! ```

pub mod bootstrap;
pub mod config;

pub use bootstrap::{build_coordinator, start, start_with, SessionRuntime, StartupError};
pub use config::SessionConfig;
