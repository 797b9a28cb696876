//! # Relay Auth
//!
//! Per-device rotating bearer tokens and a federated login handshake relay.
//!
//! ## Features
//!
//! - **Multi-device**: one token record per device, isolated from the others
//! - **Rotating**: every verified request returns a new token
//! - **Hashed at rest**: argon2id, work done on the blocking pool
//! - **Federated**: provider assertions resolve to one local identity per email
//! - **Stateless handshake**: the initiating context travels in a signed `state`
//!
//! ## Architecture
//!
//! ```text
//! provider callback → IdentityBroker → TokenIssuer + TokenStore → HandshakeRelay
//!                                                                  │
//!        opener-window page | redirect to origin | fallback page ◀─┘
//!
//! every authenticated request → TokenVerifier (verify + rotate)
//! ```
//!
//! ## Example: Verify and Rotate
//!
//! ```rust,ignore
//! use relay_auth::*;
//!
//! let env = AuthEnvironment::new(
//!     store,
//!     ResourceRegistry::default(),
//!     &TokenConfig::default(),
//!     RelayConfig::new(secret),
//!     Arc::new(SystemClock),
//! )?;
//!
//! match env.verifier.verify("User", uid, &client_id, token).await? {
//!     Verification::Authenticated { refreshed, .. } => {
//!         // Hand `refreshed` back to the client as response headers
//!     }
//!     Verification::Rejected => {
//!         // Uniform 401
//!     }
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Public modules
pub mod broker;
pub mod config;
pub mod constants;
pub mod credentials;
pub mod environment;
pub mod error;
pub mod providers;
pub mod relay;
pub mod state;
pub mod stores;
pub mod tokens;
pub mod utils;

#[cfg(feature = "axum")]
pub mod handlers;
#[cfg(feature = "axum")]
pub mod router;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use broker::{IdentityBroker, ResolvedIdentity};
pub use config::{AllowList, HashCost, RelayConfig, ResourceKind, ResourceRegistry, TokenConfig};
pub use credentials::CredentialSignIn;
pub use environment::{AuthEnvironment, Clock, SystemClock};
pub use error::{AuthError, Result};
pub use providers::ResourceStore;
pub use relay::{Handshake, HandshakePhase, HandshakeRelay, Outcome, RelayResponse, RelayResult};
pub use state::{
    AuthParams, ClientId, HandshakeContext, IdentityAssertion, Resource, ResourceId, TokenRecord,
    WindowType,
};
pub use tokens::{
    IssuedToken, RefreshedCredentials, TokenHasher, TokenIssuer, TokenStore, TokenVerifier,
    Verification,
};

#[cfg(feature = "axum")]
pub use router::auth_router;
