//! Error handling for the session subsystem.
//!
//! - **Error Categories**: fatal vs. transient classification
//! - **Network errors**: transport failures talking to the provider
//! - **Session errors**: the taxonomy recorded in the state store
//!
//! | Category | Description | Retryable |
//! |----------|-------------|-----------|
//! | Auth | Credentials rejected or unusable | No |
//! | Network | Provider unreachable | Yes |
//! | Storage | Local credential store | Yes |
//! | Subscriber | Data-refresh callback failed | No |

mod category;
mod network;
mod session;

pub use category::ErrorCategory;
pub use network::{classify_reqwest_error, NetworkError};
pub use session::SessionError;
