//! Random client id / token / expiry generation.

use crate::environment::Clock;
use crate::state::ClientId;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;

/// Bytes of OS randomness behind every client id and token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Freshly generated credential, before it is hashed and bound.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Device identifier.
    pub client_id: ClientId,

    /// Plaintext token. Only ever handed to the client.
    pub token: String,

    /// Absolute expiry.
    pub expiry: DateTime<Utc>,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("client_id", &self.client_id)
            .field("token", &"[redacted]")
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Generates client id / token / expiry triples.
///
/// Side-effect free: nothing is stored until [`super::TokenStore::bind`].
#[derive(Clone)]
pub struct TokenIssuer {
    lifespan: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    /// Create an issuer producing tokens that live for `lifespan`.
    #[must_use]
    pub fn new(lifespan: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { lifespan, clock }
    }

    /// Issue a credential for a new device.
    #[must_use]
    pub fn issue(&self) -> IssuedToken {
        self.rotate(ClientId(random_urlsafe()))
    }

    /// Issue a new token and expiry for an existing device.
    #[must_use]
    pub fn rotate(&self, client_id: ClientId) -> IssuedToken {
        IssuedToken {
            client_id,
            token: random_urlsafe(),
            expiry: self.clock.now() + self.lifespan,
        }
    }

    /// Configured token lifespan.
    #[must_use]
    pub const fn lifespan(&self) -> Duration {
        self.lifespan
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("lifespan", &self.lifespan)
            .finish_non_exhaustive()
    }
}

/// URL-safe base64 of [`TOKEN_BYTES`] bytes from the OS generator.
#[must_use]
pub fn random_urlsafe() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockClock;
    use std::collections::HashSet;

    fn issuer(clock: &MockClock) -> TokenIssuer {
        TokenIssuer::new(Duration::hours(1), Arc::new(clock.clone()))
    }

    #[test]
    fn test_issue_sets_expiry_from_lifespan() {
        let clock = MockClock::default();
        let issued = issuer(&clock).issue();

        assert_eq!(issued.expiry, clock.now() + Duration::hours(1));
    }

    #[test]
    fn test_issue_is_url_safe_with_full_entropy() {
        let issued = issuer(&MockClock::default()).issue();

        for value in [issued.client_id.as_str(), issued.token.as_str()] {
            // 32 bytes -> 43 unpadded base64 characters
            assert_eq!(value.len(), 43);
            assert!(value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        }
    }

    #[test]
    fn test_client_id_and_token_are_independent() {
        let issued = issuer(&MockClock::default()).issue();
        assert_ne!(issued.client_id.as_str(), issued.token);
    }

    #[test]
    fn test_issue_never_repeats_client_ids() {
        let issuer = issuer(&MockClock::default());
        let ids: HashSet<String> = (0..200).map(|_| issuer.issue().client_id.0).collect();
        assert_eq!(ids.len(), 200);
    }

    #[test]
    fn test_rotate_keeps_client_id() {
        let clock = MockClock::default();
        let issuer = issuer(&clock);
        let first = issuer.issue();

        clock.advance(Duration::minutes(5));
        let rotated = issuer.rotate(first.client_id.clone());

        assert_eq!(rotated.client_id, first.client_id);
        assert_ne!(rotated.token, first.token);
        assert!(rotated.expiry > first.expiry);
    }

    #[test]
    fn test_debug_redacts_token() {
        let issued = issuer(&MockClock::default()).issue();
        let debug = format!("{issued:?}");
        assert!(!debug.contains(&issued.token));
        assert!(debug.contains("[redacted]"));
    }
}
