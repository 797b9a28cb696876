//! Token verification with rotation on every successful use.
//!
//! # Flow
//!
//! ```text
//! 1. Load resource by uid → look up tokens[client_id]
//! 2. Check expiry and the salted hash (always both, uniform timing)
//! 3. Current token matched → rotate: new token, previous hash kept for the
//!    grace window → commit with the version check → return new credential
//! 4. Previous token matched inside the grace window → consume it once,
//!    authenticate without a new credential
//! 5. Anything else → Rejected
//! ```

use crate::constants::headers;
use crate::environment::Clock;
use crate::error::{AuthError, Result};
use crate::providers::ResourceStore;
use crate::state::{AuthParams, ClientId, PreviousToken, Resource, TokenRecord};
use crate::tokens::hasher::{offload, TokenHasher};
use crate::tokens::issuer::TokenIssuer;
use crate::tokens::store::TokenStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Credential the client must use on its next request.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshedCredentials {
    /// New plaintext token.
    pub access_token: String,

    /// Device identifier (unchanged by rotation).
    pub client_id: ClientId,

    /// Resource uid.
    pub uid: String,

    /// Expiry of the new token.
    pub expiry: DateTime<Utc>,
}

impl RefreshedCredentials {
    /// Header name/value pairs of the authenticated response contract.
    #[must_use]
    pub fn to_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            (headers::ACCESS_TOKEN, self.access_token.clone()),
            (headers::CLIENT_ID, self.client_id.0.clone()),
            (headers::UID, self.uid.clone()),
            (headers::EXPIRY, self.expiry.timestamp().to_string()),
            (headers::TOKEN_TYPE, headers::BEARER.to_string()),
        ]
    }
}

impl From<&AuthParams> for RefreshedCredentials {
    fn from(auth_params: &AuthParams) -> Self {
        Self {
            access_token: auth_params.auth_token.clone(),
            client_id: auth_params.client_id.clone(),
            uid: auth_params.uid.clone(),
            expiry: DateTime::from_timestamp(auth_params.expiry, 0).unwrap_or_default(),
        }
    }
}

impl std::fmt::Debug for RefreshedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedCredentials")
            .field("access_token", &"[redacted]")
            .field("client_id", &self.client_id)
            .field("uid", &self.uid)
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Outcome of a verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The credential was valid.
    Authenticated {
        /// Committed resource after rotation.
        resource: Box<Resource>,

        /// New credential, or `None` when a grace-window token was accepted
        /// and the client should keep the credential another request handed
        /// it.
        refreshed: Option<RefreshedCredentials>,
    },

    /// Unknown device, expired token, or hash mismatch. Deliberately
    /// indistinguishable.
    Rejected,
}

impl Verification {
    /// Returns `true` for [`Verification::Authenticated`].
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenMatch {
    Current,
    Previous,
    None,
}

/// Validates device tokens and rotates them on use.
pub struct TokenVerifier<S> {
    store: Arc<S>,
    tokens: TokenStore<S>,
    issuer: TokenIssuer,
    hasher: TokenHasher,
    clock: Arc<dyn Clock>,
    grace_window: Duration,
    max_write_attempts: u32,
}

impl<S> Clone for TokenVerifier<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            tokens: self.tokens.clone(),
            issuer: self.issuer.clone(),
            hasher: self.hasher.clone(),
            clock: Arc::clone(&self.clock),
            grace_window: self.grace_window,
            max_write_attempts: self.max_write_attempts,
        }
    }
}

impl<S: ResourceStore> TokenVerifier<S> {
    /// Create a verifier.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        tokens: TokenStore<S>,
        issuer: TokenIssuer,
        hasher: TokenHasher,
        clock: Arc<dyn Clock>,
        grace_window: Duration,
        max_write_attempts: u32,
    ) -> Self {
        Self {
            store,
            tokens,
            issuer,
            hasher,
            clock,
            grace_window,
            max_write_attempts: max_write_attempts.max(1),
        }
    }

    /// Verify `candidate` for device `client_id` of the resource `uid`.
    ///
    /// # Errors
    ///
    /// Returns error only for storage or hashing failures. Bad credentials
    /// are reported as [`Verification::Rejected`].
    pub async fn verify(
        &self,
        kind: &str,
        uid: &str,
        client_id: &ClientId,
        candidate: &str,
    ) -> Result<Verification> {
        for attempt in 1..=self.max_write_attempts {
            let resource = self.store.find_by_uid(kind, uid).await?;
            let now = self.clock.now();
            let record = resource
                .as_ref()
                .and_then(|r| r.tokens.get(client_id))
                .cloned();

            let matched = self.check(record.clone(), candidate, now).await?;

            let (Some(mut resource), Some(record)) = (resource, record) else {
                tracing::debug!(kind = kind, "Token verification rejected");
                return Ok(Verification::Rejected);
            };

            let refreshed = match matched {
                TokenMatch::None => {
                    tracing::debug!(kind = kind, "Token verification rejected");
                    return Ok(Verification::Rejected);
                }
                TokenMatch::Current => {
                    let issued = self.issuer.rotate(client_id.clone());
                    let hash = self.hasher.hash(issued.token.clone()).await?;
                    let previous = (self.grace_window > Duration::zero()).then(|| PreviousToken {
                        token: record.token.clone(),
                        valid_until: now + self.grace_window,
                    });
                    resource.tokens.insert(
                        client_id.clone(),
                        TokenRecord {
                            token: hash,
                            expiry: issued.expiry,
                            previous,
                        },
                    );
                    Some(RefreshedCredentials {
                        access_token: issued.token,
                        client_id: issued.client_id,
                        uid: resource.uid.clone(),
                        expiry: issued.expiry,
                    })
                }
                TokenMatch::Previous => {
                    resource.tokens.insert(
                        client_id.clone(),
                        TokenRecord {
                            previous: None,
                            ..record
                        },
                    );
                    None
                }
            };

            resource.updated_at = now;
            match self.store.update(&resource).await {
                Ok(committed) => {
                    tracing::debug!(
                        uid = %committed.uid,
                        client_id = %client_id,
                        rotated = refreshed.is_some(),
                        "Token verified"
                    );
                    return Ok(Verification::Authenticated {
                        resource: Box::new(committed),
                        refreshed,
                    });
                }
                Err(AuthError::Conflict) => {
                    tracing::debug!(
                        client_id = %client_id,
                        attempt = attempt,
                        "Concurrent rotation, re-evaluating"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(client_id = %client_id, "Token verification abandoned after repeated conflicts");
        Ok(Verification::Rejected)
    }

    /// Verify `candidate` without rotating, then remove the device record.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if the credential does not
    /// verify, or a storage error if the removal cannot be committed.
    pub async fn sign_out(
        &self,
        kind: &str,
        uid: &str,
        client_id: &ClientId,
        candidate: &str,
    ) -> Result<Resource> {
        let resource = self.store.find_by_uid(kind, uid).await?;
        let record = resource
            .as_ref()
            .and_then(|r| r.tokens.get(client_id))
            .cloned();
        let matched = self.check(record, candidate, self.clock.now()).await?;

        match (resource, matched) {
            (Some(mut resource), TokenMatch::Current | TokenMatch::Previous) => {
                self.tokens.revoke(&mut resource, client_id).await?;
                Ok(resource)
            }
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    /// Run every check regardless of earlier failures.
    async fn check(
        &self,
        record: Option<TokenRecord>,
        candidate: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenMatch> {
        let hasher = self.hasher.clone();
        let candidate = candidate.to_string();

        offload(move || {
            let Some(record) = record else {
                let _ = hasher.verify_dummy_blocking(&candidate);
                return TokenMatch::None;
            };

            let current = hasher.verify_blocking(&record.token, &candidate);
            let expired = record.is_expired(now);
            if current && !expired {
                return TokenMatch::Current;
            }

            let previous = record
                .previous
                .as_ref()
                .filter(|previous| previous.valid_until >= now && !expired)
                .is_some_and(|previous| hasher.verify_blocking(&previous.token, &candidate));

            if previous {
                TokenMatch::Previous
            } else {
                TokenMatch::None
            }
        })
        .await
    }
}

impl<S> std::fmt::Debug for TokenVerifier<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("grace_window", &self.grace_window)
            .field("max_write_attempts", &self.max_write_attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashCost;
    use crate::mocks::{MockClock, MockResourceStore};
    use crate::tokens::issuer::IssuedToken;

    struct Fixture {
        clock: MockClock,
        issuer: TokenIssuer,
        tokens: TokenStore<MockResourceStore>,
        verifier: TokenVerifier<MockResourceStore>,
    }

    fn fixture(grace: Duration) -> Fixture {
        let store = Arc::new(MockResourceStore::new());
        let clock = MockClock::default();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let hasher = TokenHasher::new(HashCost::minimal()).unwrap();
        let issuer = TokenIssuer::new(Duration::hours(1), Arc::clone(&shared_clock));
        let tokens = TokenStore::new(
            Arc::clone(&store),
            hasher.clone(),
            Arc::clone(&shared_clock),
            None,
            3,
        );
        let verifier = TokenVerifier::new(
            store,
            tokens.clone(),
            issuer.clone(),
            hasher,
            shared_clock,
            grace,
            3,
        );
        Fixture {
            clock,
            issuer,
            tokens,
            verifier,
        }
    }

    async fn signed_in(f: &Fixture) -> (Resource, IssuedToken) {
        let mut resource = Resource::new("User", "a@b.com", f.clock.now());
        resource.uid = "42".to_string();
        let issued = f.issuer.issue();
        f.tokens.bind(&mut resource, &issued).await.unwrap();
        (resource, issued)
    }

    fn refreshed(verification: Verification) -> RefreshedCredentials {
        match verification {
            Verification::Authenticated {
                refreshed: Some(refreshed),
                ..
            } => refreshed,
            other => panic!("expected rotation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_verify_rotates_token() {
        let f = fixture(Duration::seconds(5));
        let (_, issued) = signed_in(&f).await;

        let result = f
            .verifier
            .verify("User", "42", &issued.client_id, &issued.token)
            .await
            .unwrap();
        let refreshed = refreshed(result);

        assert_eq!(refreshed.client_id, issued.client_id);
        assert_eq!(refreshed.uid, "42");
        assert_ne!(refreshed.access_token, issued.token);
    }

    #[tokio::test]
    async fn test_verify_rejects_unknown_client_and_wrong_token() {
        let f = fixture(Duration::seconds(5));
        let (_, issued) = signed_in(&f).await;

        let unknown = f
            .verifier
            .verify("User", "42", &ClientId::from("nope"), &issued.token)
            .await
            .unwrap();
        let wrong = f
            .verifier
            .verify("User", "42", &issued.client_id, "not-the-token")
            .await
            .unwrap();
        let wrong_uid = f
            .verifier
            .verify("User", "43", &issued.client_id, &issued.token)
            .await
            .unwrap();

        assert_eq!(unknown, Verification::Rejected);
        assert_eq!(wrong, Verification::Rejected);
        assert_eq!(wrong_uid, Verification::Rejected);
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let f = fixture(Duration::seconds(5));
        let (_, issued) = signed_in(&f).await;

        f.clock.advance(Duration::hours(1) + Duration::seconds(1));
        let late = f
            .verifier
            .verify("User", "42", &issued.client_id, &issued.token)
            .await
            .unwrap();
        assert_eq!(late, Verification::Rejected);

        f.clock.advance(Duration::seconds(-2));
        let in_time = f
            .verifier
            .verify("User", "42", &issued.client_id, &issued.token)
            .await
            .unwrap();
        assert_ne!(refreshed(in_time).access_token, issued.token);
    }

    #[tokio::test]
    async fn test_previous_token_accepted_once_within_grace() {
        let f = fixture(Duration::seconds(5));
        let (_, issued) = signed_in(&f).await;

        let first = f
            .verifier
            .verify("User", "42", &issued.client_id, &issued.token)
            .await
            .unwrap();
        let rotated = refreshed(first);

        let replay = f
            .verifier
            .verify("User", "42", &issued.client_id, &issued.token)
            .await
            .unwrap();
        assert!(matches!(
            replay,
            Verification::Authenticated { refreshed: None, .. }
        ));

        let second_replay = f
            .verifier
            .verify("User", "42", &issued.client_id, &issued.token)
            .await
            .unwrap();
        assert_eq!(second_replay, Verification::Rejected);

        let current = f
            .verifier
            .verify("User", "42", &issued.client_id, &rotated.access_token)
            .await
            .unwrap();
        assert!(current.is_authenticated());
    }

    #[tokio::test]
    async fn test_previous_token_rejected_after_grace() {
        let f = fixture(Duration::seconds(5));
        let (_, issued) = signed_in(&f).await;

        f.verifier
            .verify("User", "42", &issued.client_id, &issued.token)
            .await
            .unwrap();
        f.clock.advance(Duration::seconds(6));

        let replay = f
            .verifier
            .verify("User", "42", &issued.client_id, &issued.token)
            .await
            .unwrap();
        assert_eq!(replay, Verification::Rejected);
    }

    #[tokio::test]
    async fn test_zero_grace_window_rejects_previous_immediately() {
        let f = fixture(Duration::zero());
        let (_, issued) = signed_in(&f).await;

        f.verifier
            .verify("User", "42", &issued.client_id, &issued.token)
            .await
            .unwrap();
        let replay = f
            .verifier
            .verify("User", "42", &issued.client_id, &issued.token)
            .await
            .unwrap();

        assert_eq!(replay, Verification::Rejected);
    }

    #[tokio::test]
    async fn test_sign_out_requires_valid_token() {
        let f = fixture(Duration::seconds(5));
        let (_, issued) = signed_in(&f).await;

        let bad = f
            .verifier
            .sign_out("User", "42", &issued.client_id, "wrong")
            .await;
        assert_eq!(bad, Err(AuthError::InvalidCredentials));

        let resource = f
            .verifier
            .sign_out("User", "42", &issued.client_id, &issued.token)
            .await
            .unwrap();
        assert!(!resource.tokens.contains_key(&issued.client_id));

        let after = f
            .verifier
            .verify("User", "42", &issued.client_id, &issued.token)
            .await
            .unwrap();
        assert_eq!(after, Verification::Rejected);
    }

    #[test]
    fn test_refreshed_headers() {
        let refreshed = RefreshedCredentials {
            access_token: "tok".to_string(),
            client_id: ClientId::from("cid"),
            uid: "42".to_string(),
            expiry: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };

        let headers = refreshed.to_headers();
        assert!(headers.contains(&("access-token", "tok".to_string())));
        assert!(headers.contains(&("client-id", "cid".to_string())));
        assert!(headers.contains(&("uid", "42".to_string())));
        assert!(headers.contains(&("expiry", "1700000000".to_string())));
        assert!(!format!("{refreshed:?}").contains("tok\""));
    }

    #[test]
    fn test_sign_in_params_share_refreshed_header_contract() {
        let auth_params = AuthParams {
            auth_token: "tok".to_string(),
            client_id: ClientId::from("cid"),
            uid: "42".to_string(),
            expiry: 1_700_000_000,
            config: Some("mobile".to_string()),
            oauth_registration: true,
        };

        let refreshed = RefreshedCredentials::from(&auth_params);

        assert_eq!(refreshed.expiry.timestamp(), auth_params.expiry);
        let headers = refreshed.to_headers();
        assert_eq!(headers.len(), 5);
        assert!(headers.contains(&("access-token", "tok".to_string())));
        assert!(headers.contains(&("expiry", "1700000000".to_string())));
        assert!(headers.contains(&("token-type", "Bearer".to_string())));
    }
}
