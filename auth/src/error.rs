//! Error types for token and federated-login operations.

use thiserror::Error;

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Generic message shown to clients when nothing more specific is safe.
pub const GENERIC_FAILURE_MESSAGE: &str = "An error occurred";

/// Error taxonomy for the token lifecycle and the handshake relay.
///
/// Variants that carry a `String` hold server-side diagnostics. They are
/// logged, never rendered: use [`AuthError::client_message`] for anything
/// that reaches a browser or API client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    // ═══════════════════════════════════════════════════════════
    // Authentication Errors
    // ═══════════════════════════════════════════════════════════

    /// Uniform rejection for unknown, expired, or mismatched credentials.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The provider assertion cannot be mapped to a local identity.
    #[error("Identity resolution failed: {reason}")]
    IdentityResolution {
        /// Reason for failure
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Handshake Errors
    // ═══════════════════════════════════════════════════════════

    /// The handshake state parameter is missing, forged, or malformed.
    #[error("Invalid handshake state")]
    HandshakeStateInvalid,

    /// The handshake state parameter outlived its TTL.
    #[error("Handshake state has expired")]
    HandshakeStateExpired,

    /// The handshake was driven through an illegal phase change.
    #[error("Invalid handshake transition from {from} to {to}")]
    InvalidTransition {
        /// Phase the handshake was in
        from: &'static str,
        /// Phase that was requested
        to: &'static str,
    },

    /// The caller named a resource class that is not registered.
    #[error("Unknown resource class: {0}")]
    UnknownResourceClass(String),

    /// Required handshake context (resource class, configuration) is absent.
    #[error("Missing handshake context: {0}")]
    MissingContext(&'static str),

    /// Redirect target is not on the configured allow-list.
    #[error("Redirect target not allowed")]
    RedirectNotAllowed,

    // ═══════════════════════════════════════════════════════════
    // Storage Errors
    // ═══════════════════════════════════════════════════════════

    /// A concurrent writer committed first (optimistic concurrency check failed).
    #[error("Concurrent modification of resource")]
    Conflict,

    /// Another resource of the same kind already holds this uid.
    #[error("Uid already belongs to another resource")]
    UidTaken,

    /// Requested resource not found.
    #[error("Resource not found")]
    ResourceNotFound,

    /// Storage backend failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Hash computation failed.
    #[error("Hashing error: {0}")]
    Hashing(String),

    /// Internal server error (should not be exposed to users).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Create an identity resolution error.
    #[must_use]
    pub fn identity(reason: impl Into<String>) -> Self {
        Self::IdentityResolution {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error is due to invalid user input.
    ///
    /// # Examples
    ///
    /// ```
    /// # use relay_auth::AuthError;
    /// assert!(AuthError::InvalidCredentials.is_user_error());
    /// assert!(!AuthError::Conflict.is_user_error());
    /// ```
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::IdentityResolution { .. }
                | Self::UnknownResourceClass(_)
                | Self::MissingContext(_)
        )
    }

    /// Returns `true` if this error indicates a security issue.
    ///
    /// # Examples
    ///
    /// ```
    /// # use relay_auth::AuthError;
    /// assert!(AuthError::HandshakeStateInvalid.is_security_issue());
    /// assert!(!AuthError::HandshakeStateExpired.is_security_issue());
    /// ```
    #[must_use]
    pub const fn is_security_issue(&self) -> bool {
        matches!(
            self,
            Self::HandshakeStateInvalid | Self::RedirectNotAllowed | Self::InvalidTransition { .. }
        )
    }

    /// Message safe to hand to a client.
    ///
    /// Storage, hashing and internal details collapse to a generic string.
    ///
    /// # Examples
    ///
    /// ```
    /// # use relay_auth::AuthError;
    /// let err = AuthError::Storage("connection refused on 10.0.0.3".into());
    /// assert_eq!(err.client_message(), "An error occurred");
    /// ```
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Invalid login credentials. Please try again.".to_string(),
            Self::IdentityResolution { .. } => {
                "Unable to sign in with this provider account".to_string()
            }
            Self::HandshakeStateExpired => "Sign-in request expired. Please try again.".to_string(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}
