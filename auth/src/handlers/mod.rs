//! HTTP handlers for authentication endpoints.
//!
//! - **Federated login**: begin, callback and failure of the provider
//!   round-trip, answered by the handshake relay
//! - **Session**: password sign-in, token validation and sign-out
//! - **Middleware**: `require_auth` for any route that needs a device token

pub mod error;
pub mod middleware;
pub mod omniauth;
pub mod session;

pub use error::ApiError;
pub use middleware::{require_auth, CurrentResource};
