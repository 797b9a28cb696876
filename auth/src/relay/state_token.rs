//! Signed, short-lived `state` parameter.
//!
//! Carries the [`HandshakeContext`] across the provider redirect without any
//! server-side session:
//!
//! ```text
//! base64url(json claims) "." base64url(hmac_sha256(secret, first part))
//! ```
//!
//! Claims hold the context, the provider, issue/expiry times (unix seconds)
//! and a random nonce so two otherwise identical handshakes never share a
//! state value.

use crate::environment::Clock;
use crate::error::{AuthError, Result};
use crate::state::HandshakeContext;
use crate::tokens::issuer::random_urlsafe;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Duration;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

/// Decoded contents of a state token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateClaims {
    /// Context threaded through the provider round-trip.
    pub context: HandshakeContext,

    /// Provider the flow was started for.
    pub provider: String,

    /// Issued at (unix seconds).
    pub iat: i64,

    /// Expires at (unix seconds).
    pub exp: i64,

    /// Random value unique to this handshake.
    pub nonce: String,
}

/// Seals and opens state tokens.
#[derive(Clone)]
pub struct StateSigner {
    secret: Arc<[u8]>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl StateSigner {
    /// Create a signer.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingContext`] if `secret` is empty.
    pub fn new(secret: &[u8], ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        if secret.is_empty() {
            return Err(AuthError::MissingContext("state signing secret"));
        }
        Ok(Self {
            secret: Arc::from(secret),
            ttl,
            clock,
        })
    }

    /// Seal `context` for `provider` into a state token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Serialization`] if the claims cannot be encoded.
    pub fn seal(&self, provider: &str, context: HandshakeContext) -> Result<String> {
        let now = self.clock.now();
        let claims = StateClaims {
            context,
            provider: provider.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            nonce: random_urlsafe(),
        };

        let json = serde_json::to_vec(&claims).map_err(|e| AuthError::Serialization(e.to_string()))?;
        let body = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(body.as_bytes()));

        Ok(format!("{body}.{signature}"))
    }

    /// Verify and decode a state token.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The token is malformed or the signature does not match → `AuthError::HandshakeStateInvalid`
    /// - The token is past its expiry → `AuthError::HandshakeStateExpired`
    pub fn open(&self, token: &str) -> Result<StateClaims> {
        let (body, signature) = token
            .split_once('.')
            .ok_or(AuthError::HandshakeStateInvalid)?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::HandshakeStateInvalid)?;
        let expected = self.sign(body.as_bytes());

        if !constant_time_eq::constant_time_eq(&expected, &signature) {
            return Err(AuthError::HandshakeStateInvalid);
        }

        let json = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| AuthError::HandshakeStateInvalid)?;
        let claims: StateClaims =
            serde_json::from_slice(&json).map_err(|_| AuthError::HandshakeStateInvalid)?;

        if claims.exp < self.clock.now().timestamp() {
            return Err(AuthError::HandshakeStateExpired);
        }

        Ok(claims)
    }

    fn sign(&self, body: &[u8]) -> Vec<u8> {
        // HMAC accepts keys of any length; `new` rejects only the empty key.
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return Vec::new();
        };
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }
}

impl std::fmt::Debug for StateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSigner")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockClock;
    use crate::state::WindowType;

    fn signer(clock: &MockClock) -> StateSigner {
        StateSigner::new(b"test-secret", Duration::minutes(10), Arc::new(clock.clone())).unwrap()
    }

    fn context() -> HandshakeContext {
        HandshakeContext::new("User")
            .with_window_type(WindowType::Popup)
            .with_origin_url("https://app.example.com/login")
            .with_config_name("default")
    }

    #[test]
    fn test_seal_then_open() {
        let clock = MockClock::default();
        let signer = signer(&clock);

        let token = signer.seal("github", context()).unwrap();
        let claims = signer.open(&token).unwrap();

        assert_eq!(claims.context, context());
        assert_eq!(claims.provider, "github");
        assert_eq!(claims.exp - claims.iat, 600);
    }

    #[test]
    fn test_states_are_unique() {
        let clock = MockClock::default();
        let signer = signer(&clock);

        assert_ne!(
            signer.seal("github", context()).unwrap(),
            signer.seal("github", context()).unwrap()
        );
    }

    #[test]
    fn test_tampered_body_is_invalid() {
        let clock = MockClock::default();
        let signer = signer(&clock);
        let token = signer.seal("github", context()).unwrap();
        let (_, signature) = token.split_once('.').unwrap();

        let forged_context = HandshakeContext::new("Admin").with_origin_url("https://evil.example");
        let forged_claims = StateClaims {
            context: forged_context,
            provider: "github".to_string(),
            iat: 0,
            exp: i64::MAX,
            nonce: "n".to_string(),
        };
        let forged_body = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap());

        assert_eq!(
            signer.open(&format!("{forged_body}.{signature}")),
            Err(AuthError::HandshakeStateInvalid)
        );
    }

    #[test]
    fn test_other_secret_is_invalid() {
        let clock = MockClock::default();
        let token = signer(&clock).seal("github", context()).unwrap();
        let other =
            StateSigner::new(b"other-secret", Duration::minutes(10), Arc::new(clock)).unwrap();

        assert_eq!(other.open(&token), Err(AuthError::HandshakeStateInvalid));
    }

    #[test]
    fn test_garbage_is_invalid() {
        let clock = MockClock::default();
        let signer = signer(&clock);

        for token in ["", ".", "abc", "abc.def", "!!!.???"] {
            assert_eq!(signer.open(token), Err(AuthError::HandshakeStateInvalid), "{token}");
        }
    }

    #[test]
    fn test_expired_state() {
        let clock = MockClock::default();
        let signer = signer(&clock);
        let token = signer.seal("github", context()).unwrap();

        clock.advance(Duration::minutes(10));
        assert!(signer.open(&token).is_ok());

        clock.advance(Duration::seconds(1));
        assert_eq!(signer.open(&token), Err(AuthError::HandshakeStateExpired));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let result = StateSigner::new(b"", Duration::minutes(1), Arc::new(MockClock::default()));
        assert!(matches!(result, Err(AuthError::MissingContext(_))));
    }
}
