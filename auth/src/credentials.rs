//! Direct email/password sign-in.
//!
//! Password accounts get a device token the same way federated logins do.
//! Federation-only accounts hold a placeholder hash of a value nobody knows,
//! so they can never sign in here.

use crate::config::ResourceRegistry;
use crate::environment::Clock;
use crate::error::{AuthError, Result};
use crate::providers::ResourceStore;
use crate::state::{AuthParams, Resource};
use crate::tokens::{TokenHasher, TokenIssuer, TokenStore};
use crate::utils::normalize_email;
use std::sync::Arc;

/// Email/password registration and sign-in.
pub struct CredentialSignIn<S> {
    store: Arc<S>,
    registry: Arc<ResourceRegistry>,
    hasher: TokenHasher,
    issuer: TokenIssuer,
    tokens: TokenStore<S>,
    clock: Arc<dyn Clock>,
}

impl<S> Clone for CredentialSignIn<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            registry: Arc::clone(&self.registry),
            hasher: self.hasher.clone(),
            issuer: self.issuer.clone(),
            tokens: self.tokens.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: ResourceStore> CredentialSignIn<S> {
    /// Create a credential sign-in service.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        registry: Arc<ResourceRegistry>,
        hasher: TokenHasher,
        issuer: TokenIssuer,
        tokens: TokenStore<S>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            registry,
            hasher,
            issuer,
            tokens,
            clock,
        }
    }

    /// Create a password account.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The resource class is not registered → `AuthError::UnknownResourceClass`
    /// - The email is blank → `AuthError::IdentityResolution`
    /// - An account with that email (or that email as uid) exists →
    ///   `AuthError::Conflict`
    pub async fn register(&self, kind: &str, email: &str, password: &str) -> Result<Resource> {
        let kind = self.registry.lookup(kind)?;
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(AuthError::identity("email is blank"));
        }

        let mut resource = Resource::new(&kind.name, &email, self.clock.now());
        resource.encrypted_password = Some(self.hasher.hash(password.to_string()).await?);

        let committed = self.store.insert(&resource).await.map_err(|e| match e {
            AuthError::UidTaken => AuthError::Conflict,
            other => other,
        })?;
        tracing::info!(kind = %kind.name, uid = %committed.uid, "Registered password account");
        Ok(committed)
    }

    /// Check `password` and start a new device session.
    ///
    /// Unknown email, wrong password and federation-only accounts are
    /// indistinguishable to the caller.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The resource class is not registered → `AuthError::UnknownResourceClass`
    /// - The credentials do not verify → `AuthError::InvalidCredentials`
    /// - The device token cannot be persisted
    pub async fn sign_in(
        &self,
        kind: &str,
        email: &str,
        password: &str,
    ) -> Result<(Resource, AuthParams)> {
        let kind = self.registry.lookup(kind)?;
        let email = normalize_email(email);

        let resource = self.store.find_by_email(&kind.name, &email).await?;
        let hash = resource
            .as_ref()
            .and_then(|resource| resource.encrypted_password.clone());
        let verified = self.hasher.verify(hash, password.to_string()).await?;

        let Some(mut resource) = resource.filter(|_| verified) else {
            tracing::info!(kind = %kind.name, "Password sign-in rejected");
            return Err(AuthError::InvalidCredentials);
        };

        let issued = self.issuer.issue();
        self.tokens.bind(&mut resource, &issued).await?;

        tracing::info!(uid = %resource.uid, client_id = %issued.client_id, "Password sign-in");
        let auth_params = AuthParams {
            auth_token: issued.token,
            client_id: issued.client_id,
            uid: resource.uid.clone(),
            expiry: issued.expiry.timestamp(),
            config: None,
            oauth_registration: false,
        };
        Ok((resource, auth_params))
    }
}

impl<S> std::fmt::Debug for CredentialSignIn<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSignIn")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
