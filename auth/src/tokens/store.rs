//! Binding hashed tokens to resources.

use crate::environment::Clock;
use crate::error::{AuthError, Result};
use crate::providers::ResourceStore;
use crate::state::{ClientId, Resource, TokenRecord};
use crate::tokens::hasher::TokenHasher;
use crate::tokens::issuer::IssuedToken;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Hashes issued tokens and persists them on their resource.
///
/// Each device owns exactly one entry of [`Resource::tokens`]; a bind or
/// revoke only ever touches its own entry, and concurrent writers to other
/// entries are merged by reloading and re-applying after a version conflict.
pub struct TokenStore<S> {
    store: Arc<S>,
    hasher: TokenHasher,
    clock: Arc<dyn Clock>,
    max_devices: Option<usize>,
    max_write_attempts: u32,
}

impl<S> Clone for TokenStore<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            hasher: self.hasher.clone(),
            clock: Arc::clone(&self.clock),
            max_devices: self.max_devices,
            max_write_attempts: self.max_write_attempts,
        }
    }
}

impl<S: ResourceStore> TokenStore<S> {
    /// Create a token store.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        hasher: TokenHasher,
        clock: Arc<dyn Clock>,
        max_devices: Option<usize>,
        max_write_attempts: u32,
    ) -> Self {
        Self {
            store,
            hasher,
            clock,
            max_devices,
            max_write_attempts: max_write_attempts.max(1),
        }
    }

    /// Hash `issued.token` and persist it under `issued.client_id`.
    ///
    /// Overwrites only an existing record for the same client id. On return
    /// `resource` holds the committed record.
    ///
    /// # Errors
    ///
    /// Returns error if hashing fails or the write cannot be committed. The
    /// token must not be handed to the client in that case.
    pub async fn bind(&self, resource: &mut Resource, issued: &IssuedToken) -> Result<()> {
        let hash = self.hasher.hash(issued.token.clone()).await?;
        let record = TokenRecord::new(hash, issued.expiry);
        let client_id = issued.client_id.clone();
        let max_devices = self.max_devices;
        let now = self.clock.now();

        let committed = self
            .modify(resource.clone(), |r| {
                r.tokens.insert(client_id.clone(), record.clone());
                if let Some(max) = max_devices {
                    let evicted = enforce_device_cap(r, &client_id, now, max);
                    if evicted > 0 {
                        tracing::info!(
                            uid = %r.uid,
                            evicted = evicted,
                            max_devices = max,
                            "Evicted device tokens over the device cap"
                        );
                    }
                }
                true
            })
            .await?;

        tracing::info!(
            uid = %committed.uid,
            client_id = %issued.client_id,
            expiry = %issued.expiry,
            devices = committed.tokens.len(),
            "Bound device token"
        );

        *resource = committed;
        Ok(())
    }

    /// Remove the token of one device.
    ///
    /// Returns `false` if the device had no record.
    ///
    /// # Errors
    ///
    /// Returns error if the write cannot be committed.
    pub async fn revoke(&self, resource: &mut Resource, client_id: &ClientId) -> Result<bool> {
        let mut removed = false;
        let committed = self
            .modify(resource.clone(), |r| {
                removed = r.tokens.remove(client_id).is_some();
                removed
            })
            .await?;

        if removed {
            tracing::info!(uid = %committed.uid, client_id = %client_id, "Revoked device token");
        }

        *resource = committed;
        Ok(removed)
    }

    /// Read-modify-write with optimistic concurrency.
    ///
    /// `apply` returns whether it changed anything; unchanged resources are
    /// not written. After a conflict the resource is reloaded and `apply`
    /// runs again against the fresh copy.
    async fn modify<F>(&self, mut resource: Resource, mut apply: F) -> Result<Resource>
    where
        F: FnMut(&mut Resource) -> bool,
    {
        for attempt in 1..=self.max_write_attempts {
            if !apply(&mut resource) {
                return Ok(resource);
            }
            resource.updated_at = self.clock.now();

            let result = if resource.is_new_record() {
                self.store.insert(&resource).await
            } else {
                self.store.update(&resource).await
            };

            match result {
                Ok(committed) => return Ok(committed),
                Err(AuthError::Conflict) => {
                    tracing::debug!(
                        uid = %resource.uid,
                        attempt = attempt,
                        "Resource changed concurrently, reloading"
                    );
                    resource = self
                        .store
                        .find_by_email(&resource.kind, &resource.email)
                        .await?
                        .ok_or(AuthError::ResourceNotFound)?;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(uid = %resource.uid, "Gave up writing contended resource");
        Err(AuthError::Conflict)
    }
}

impl<S> std::fmt::Debug for TokenStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("max_devices", &self.max_devices)
            .field("max_write_attempts", &self.max_write_attempts)
            .finish_non_exhaustive()
    }
}

/// Trim `resource.tokens` to `max` entries, never removing `keep`.
///
/// Expired records go first, then the records closest to expiry.
/// Returns the number of records removed.
pub fn enforce_device_cap(
    resource: &mut Resource,
    keep: &ClientId,
    now: DateTime<Utc>,
    max: usize,
) -> usize {
    let before = resource.tokens.len();
    if before <= max {
        return 0;
    }

    resource
        .tokens
        .retain(|client_id, record| client_id == keep || !record.is_expired(now));

    while resource.tokens.len() > max.max(1) {
        let oldest = resource
            .tokens
            .iter()
            .filter(|(client_id, _)| *client_id != keep)
            .min_by_key(|(_, record)| record.expiry)
            .map(|(client_id, _)| client_id.clone());

        match oldest {
            Some(client_id) => {
                resource.tokens.remove(&client_id);
            }
            None => break,
        }
    }

    before - resource.tokens.len()
}
