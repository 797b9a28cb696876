//! Time source and the assembled authentication environment.

use crate::broker::IdentityBroker;
use crate::config::{RelayConfig, ResourceRegistry, TokenConfig};
use crate::credentials::CredentialSignIn;
use crate::error::{AuthError, Result};
use crate::providers::ResourceStore;
use crate::relay::{Handshake, HandshakeRelay};
use crate::state::{AuthParams, IdentityAssertion, Resource};
use crate::tokens::{TokenHasher, TokenIssuer, TokenStore, TokenVerifier};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Clock trait - abstracts time operations for testability.
pub trait Clock: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Authentication environment.
///
/// Every component wired to one resource store, one clock and one set of
/// configuration values. Components are cheap to clone and share the store.
///
/// # Type Parameters
///
/// - `S`: Resource store
pub struct AuthEnvironment<S> {
    /// Resource store.
    pub store: Arc<S>,

    /// Time source.
    pub clock: Arc<dyn Clock>,

    /// Permitted resource classes.
    pub registry: Arc<ResourceRegistry>,

    /// Token generation.
    pub issuer: TokenIssuer,

    /// argon2 hashing for tokens and passwords.
    pub hasher: TokenHasher,

    /// Token persistence.
    pub tokens: TokenStore<S>,

    /// Token verification and rotation.
    pub verifier: TokenVerifier<S>,

    /// Federated identity resolution.
    pub broker: IdentityBroker<S>,

    /// Handshake relay.
    pub relay: HandshakeRelay,

    /// Email/password sign-in.
    pub credentials: CredentialSignIn<S>,
}

impl<S: ResourceStore> AuthEnvironment<S> {
    /// Wire every component.
    ///
    /// # Errors
    ///
    /// Returns error if the hash cost is rejected or the state secret is empty.
    pub fn new(
        store: S,
        registry: ResourceRegistry,
        token_config: &TokenConfig,
        relay_config: RelayConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let store = Arc::new(store);
        let registry = Arc::new(registry);
        let hasher = TokenHasher::new(token_config.hash_cost)?;
        let issuer = TokenIssuer::new(token_config.lifespan, Arc::clone(&clock));

        let tokens = TokenStore::new(
            Arc::clone(&store),
            hasher.clone(),
            Arc::clone(&clock),
            token_config.max_devices,
            token_config.max_write_attempts,
        );
        let verifier = TokenVerifier::new(
            Arc::clone(&store),
            tokens.clone(),
            issuer.clone(),
            hasher.clone(),
            Arc::clone(&clock),
            token_config.grace_window,
            token_config.max_write_attempts,
        );
        let broker = IdentityBroker::new(
            Arc::clone(&store),
            hasher.clone(),
            Arc::clone(&registry),
            relay_config.uid_prefixes.clone(),
            Arc::clone(&clock),
            token_config.max_write_attempts,
        );
        let credentials = CredentialSignIn::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            hasher.clone(),
            issuer.clone(),
            tokens.clone(),
            Arc::clone(&clock),
        );
        let relay = HandshakeRelay::new(Arc::new(relay_config), Arc::clone(&registry), Arc::clone(&clock))?;

        tracing::info!(
            lifespan_secs = token_config.lifespan.num_seconds(),
            grace_secs = token_config.grace_window.num_seconds(),
            max_devices = ?token_config.max_devices,
            "Authentication environment ready"
        );

        Ok(Self {
            store,
            clock,
            registry,
            issuer,
            hasher,
            tokens,
            verifier,
            broker,
            relay,
            credentials,
        })
    }

    /// Resolve the identity behind a received callback and start a device
    /// session for it.
    ///
    /// Nothing is returned until the token is committed.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The handshake carries no context → `AuthError::MissingContext`
    /// - The resource class is unknown → `AuthError::UnknownResourceClass`
    /// - The assertion cannot be resolved → `AuthError::IdentityResolution`
    /// - Persistence fails
    pub async fn complete_federated_login(
        &self,
        handshake: &Handshake,
        assertion: &IdentityAssertion,
    ) -> Result<(Resource, AuthParams)> {
        let context = handshake
            .context()
            .ok_or(AuthError::MissingContext("handshake context"))?;

        let resolved = self
            .broker
            .resolve(&context.resource_class, assertion, &context.params)
            .await?;
        let mut resource = resolved.resource;

        let issued = self.issuer.issue();
        self.tokens.bind(&mut resource, &issued).await?;

        let auth_params = AuthParams {
            auth_token: issued.token,
            client_id: issued.client_id,
            uid: resource.uid.clone(),
            expiry: issued.expiry.timestamp(),
            config: self.relay.config_name(context),
            oauth_registration: resolved.is_new_registration,
        };

        tracing::info!(
            uid = %resource.uid,
            provider = %resource.provider,
            client_id = %auth_params.client_id,
            new_registration = auth_params.oauth_registration,
            "Federated login complete"
        );
        Ok((resource, auth_params))
    }
}

impl<S> std::fmt::Debug for AuthEnvironment<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthEnvironment")
            .field("registry", &self.registry)
            .field("issuer", &self.issuer)
            .field("relay", &self.relay)
            .finish_non_exhaustive()
    }
}
