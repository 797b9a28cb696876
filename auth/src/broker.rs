//! Federated identity resolution.
//!
//! Maps a provider [`IdentityAssertion`] onto a local [`Resource`], creating
//! the resource on the first login for an unseen email.
//!
//! # Flow
//!
//! ```text
//! 1. Registry lookup of the resource class (unknown → fatal)
//! 2. Normalise email (missing → IdentityResolution error)
//! 3. Find by email, or construct + placeholder password
//! 4. Apply provider attributes (name, provider, uid)
//! 5. Merge allow-listed client parameters
//! 6. Persist (insert race → reload and re-apply, uid held by another
//!    resource → IdentityResolution error)
//! ```

use crate::config::ResourceRegistry;
use crate::environment::Clock;
use crate::error::{AuthError, Result};
use crate::providers::ResourceStore;
use crate::state::{IdentityAssertion, Resource};
use crate::tokens::hasher::TokenHasher;
use crate::tokens::issuer::random_urlsafe;
use crate::utils::{derive_uid, normalize_email, squish};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of [`IdentityBroker::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// Persisted resource.
    pub resource: Resource,

    /// `true` when this login created the resource.
    pub is_new_registration: bool,
}

/// Resolves or creates local resources from provider assertions.
pub struct IdentityBroker<S> {
    store: Arc<S>,
    hasher: TokenHasher,
    registry: Arc<ResourceRegistry>,
    uid_prefixes: Vec<String>,
    clock: Arc<dyn Clock>,
    max_write_attempts: u32,
}

impl<S> Clone for IdentityBroker<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            hasher: self.hasher.clone(),
            registry: Arc::clone(&self.registry),
            uid_prefixes: self.uid_prefixes.clone(),
            clock: Arc::clone(&self.clock),
            max_write_attempts: self.max_write_attempts,
        }
    }
}

impl<S: ResourceStore> IdentityBroker<S> {
    /// Create an identity broker.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        hasher: TokenHasher,
        registry: Arc<ResourceRegistry>,
        uid_prefixes: Vec<String>,
        clock: Arc<dyn Clock>,
        max_write_attempts: u32,
    ) -> Self {
        Self {
            store,
            hasher,
            registry,
            uid_prefixes,
            clock,
            max_write_attempts: max_write_attempts.max(1),
        }
    }

    /// Resolve `assertion` to a persisted resource of class `resource_class`.
    ///
    /// `params` are the parameters of the initiating request; only those on
    /// the resource class allow-list are assigned.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `resource_class` is not registered → `AuthError::UnknownResourceClass`
    /// - The assertion has no usable email or uid, or the uid already
    ///   belongs to another resource → `AuthError::IdentityResolution`
    /// - The resource cannot be persisted
    pub async fn resolve(
        &self,
        resource_class: &str,
        assertion: &IdentityAssertion,
        params: &BTreeMap<String, String>,
    ) -> Result<ResolvedIdentity> {
        let kind = self.registry.lookup(resource_class)?;

        let email = assertion
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|email| !email.is_empty())
            .ok_or_else(|| AuthError::identity("assertion carries no email"))?;

        let uid = derive_uid(&assertion.external_uid, &self.uid_prefixes);
        if uid.is_empty() {
            return Err(AuthError::identity("assertion carries no provider uid"));
        }

        let extra = kind.sign_up_params.filter(params);
        let dropped = params.len() - extra.len();
        if dropped > 0 {
            tracing::debug!(kind = %kind.name, dropped = dropped, "Dropped parameters not on the allow-list");
        }

        for attempt in 1..=self.max_write_attempts {
            let now = self.clock.now();
            let existing = self.store.find_by_email(&kind.name, &email).await?;
            let is_new = existing.is_none();

            let mut resource = match existing {
                Some(resource) => resource,
                None => {
                    let mut resource = Resource::new(&kind.name, &email, now);
                    // Nobody ever learns this value, so password sign-in can
                    // never succeed for a federation-only account.
                    resource.encrypted_password = Some(self.hasher.hash(random_urlsafe()).await?);
                    resource
                }
            };
            let before = resource.clone();

            apply_provider_attributes(&mut resource, assertion, uid.clone());
            resource.attributes.extend(extra.clone());

            if !is_new && resource == before {
                return Ok(ResolvedIdentity {
                    resource,
                    is_new_registration: false,
                });
            }
            resource.updated_at = now;

            let result = if is_new {
                self.store.insert(&resource).await
            } else {
                self.store.update(&resource).await
            };

            match result {
                Ok(committed) => {
                    tracing::info!(
                        kind = %kind.name,
                        uid = %committed.uid,
                        provider = %committed.provider,
                        new_registration = is_new,
                        "Resolved federated identity"
                    );
                    return Ok(ResolvedIdentity {
                        resource: committed,
                        is_new_registration: is_new,
                    });
                }
                Err(AuthError::Conflict) => {
                    tracing::debug!(
                        kind = %kind.name,
                        attempt = attempt,
                        "Concurrent write while resolving identity, retrying"
                    );
                }
                Err(AuthError::UidTaken) => {
                    tracing::warn!(
                        kind = %kind.name,
                        provider = %assertion.provider,
                        uid = %uid,
                        "Provider uid already belongs to another resource"
                    );
                    return Err(AuthError::identity("uid already linked to another account"));
                }
                Err(e) => return Err(e),
            }
        }

        Err(AuthError::Conflict)
    }
}

impl<S> std::fmt::Debug for IdentityBroker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityBroker")
            .field("registry", &self.registry)
            .field("uid_prefixes", &self.uid_prefixes)
            .finish_non_exhaustive()
    }
}

/// Sync name, provider and uid from the provider.
///
/// An existing non-empty name is kept; otherwise the squished
/// "first last" is used, falling back to the display name.
fn apply_provider_attributes(resource: &mut Resource, assertion: &IdentityAssertion, uid: String) {
    let has_name = resource.name.as_deref().is_some_and(|name| !name.trim().is_empty());
    if !has_name {
        resource.name = provider_full_name(assertion);
    }
    resource.provider.clone_from(&assertion.provider);
    resource.uid = uid;
}

fn provider_full_name(assertion: &IdentityAssertion) -> Option<String> {
    let full_name = squish(&format!(
        "{} {}",
        assertion.first_name.as_deref().unwrap_or_default(),
        assertion.last_name.as_deref().unwrap_or_default()
    ));
    if !full_name.is_empty() {
        return Some(full_name);
    }

    assertion
        .display_name
        .as_deref()
        .map(squish)
        .filter(|name| !name.is_empty())
}
