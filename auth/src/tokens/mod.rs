//! Device token lifecycle.
//!
//! ```text
//! TokenIssuer ──issue()──▶ IssuedToken ──bind()──▶ TokenStore ──▶ Resource.tokens
//!                                                                   │
//!                       TokenVerifier ◀──verify() on every request──┘
//! ```
//!
//! A resource holds one [`crate::state::TokenRecord`] per device. Only the
//! salted hash is stored, and every successful verification replaces the
//! token with a new one.

pub mod hasher;
pub mod issuer;
pub mod store;
pub mod verifier;

pub use hasher::TokenHasher;
pub use issuer::{IssuedToken, TokenIssuer};
pub use store::TokenStore;
pub use verifier::{RefreshedCredentials, TokenVerifier, Verification};
