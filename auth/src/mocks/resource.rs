//! Mock resource store for testing.

use crate::error::{AuthError, Result};
use crate::providers::ResourceStore;
use crate::state::{Resource, ResourceId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Mock resource store.
///
/// In-memory store with the same compare-and-swap semantics as the Redis
/// store: the version check and the write happen under one lock.
#[derive(Debug, Clone, Default)]
pub struct MockResourceStore {
    resources: Arc<Mutex<HashMap<ResourceId, Resource>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MockResourceStore {
    /// Create a new mock resource store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a storage error (for testing).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored resources (for testing).
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.lock().map_or(0, |resources| resources.len())
    }

    /// Returns `true` if nothing is stored (for testing).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AuthError::Storage("write rejected by mock".to_string()));
        }
        Ok(())
    }

    fn find<P>(&self, predicate: P) -> Result<Option<Resource>>
    where
        P: Fn(&Resource) -> bool,
    {
        let resources = self
            .resources
            .lock()
            .map_err(|_| AuthError::Internal("mock store lock poisoned".to_string()))?;
        Ok(resources.values().find(|r| predicate(r)).cloned())
    }
}

impl ResourceStore for MockResourceStore {
    async fn find_by_email(&self, kind: &str, email: &str) -> Result<Option<Resource>> {
        self.find(|r| r.kind == kind && r.email == email)
    }

    async fn find_by_uid(&self, kind: &str, uid: &str) -> Result<Option<Resource>> {
        self.find(|r| r.kind == kind && r.uid == uid)
    }

    async fn insert(&self, resource: &Resource) -> Result<Resource> {
        self.check_writable()?;
        let mut resources = self
            .resources
            .lock()
            .map_err(|_| AuthError::Internal("mock store lock poisoned".to_string()))?;

        let duplicate = resources
            .values()
            .any(|r| r.kind == resource.kind && r.email == resource.email);
        if duplicate || resources.contains_key(&resource.id) {
            return Err(AuthError::Conflict);
        }
        if uid_taken(&resources, resource) {
            return Err(AuthError::UidTaken);
        }

        let mut committed = resource.clone();
        committed.version = 1;
        resources.insert(committed.id, committed.clone());
        Ok(committed)
    }

    async fn update(&self, resource: &Resource) -> Result<Resource> {
        self.check_writable()?;
        let mut resources = self
            .resources
            .lock()
            .map_err(|_| AuthError::Internal("mock store lock poisoned".to_string()))?;

        let stored = resources
            .get(&resource.id)
            .ok_or(AuthError::ResourceNotFound)?;
        if stored.version != resource.version {
            return Err(AuthError::Conflict);
        }
        if uid_taken(&resources, resource) {
            return Err(AuthError::UidTaken);
        }

        let mut committed = resource.clone();
        committed.version += 1;
        resources.insert(committed.id, committed.clone());
        Ok(committed)
    }
}

fn uid_taken(resources: &HashMap<ResourceId, Resource>, resource: &Resource) -> bool {
    resources
        .values()
        .any(|r| r.id != resource.id && r.kind == resource.kind && r.uid == resource.uid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MockResourceStore::new();
        let mut resource = Resource::new("User", "a@b.com", Utc::now());
        resource.uid = "42".to_string();

        let committed = store.insert(&resource).await.unwrap();

        assert_eq!(committed.version, 1);
        assert_eq!(store.find_by_email("User", "a@b.com").await.unwrap(), Some(committed.clone()));
        assert_eq!(store.find_by_uid("User", "42").await.unwrap(), Some(committed));
        assert_eq!(store.find_by_uid("Admin", "42").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_email() {
        let store = MockResourceStore::new();
        store
            .insert(&Resource::new("User", "a@b.com", Utc::now()))
            .await
            .unwrap();

        let duplicate = store
            .insert(&Resource::new("User", "a@b.com", Utc::now()))
            .await;

        assert_eq!(duplicate, Err(AuthError::Conflict));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_update_detects_stale_version() {
        let store = MockResourceStore::new();
        let committed = store
            .insert(&Resource::new("User", "a@b.com", Utc::now()))
            .await
            .unwrap();

        let mut first = committed.clone();
        first.name = Some("First".to_string());
        let mut second = committed;
        second.name = Some("Second".to_string());

        let updated = store.update(&first).await.unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(store.update(&second).await, Err(AuthError::Conflict));
    }

    #[tokio::test]
    async fn test_uid_stays_unique_per_kind() {
        let store = MockResourceStore::new();
        let mut first = Resource::new("User", "a@b.com", Utc::now());
        first.uid = "42".to_string();
        let first = store.insert(&first).await.unwrap();

        let mut second = Resource::new("User", "c@d.com", Utc::now());
        second.uid = "42".to_string();
        assert_eq!(store.insert(&second).await, Err(AuthError::UidTaken));

        second.uid = "43".to_string();
        let mut second = store.insert(&second).await.unwrap();
        second.uid = "42".to_string();
        assert_eq!(store.update(&second).await, Err(AuthError::UidTaken));

        assert_eq!(store.find_by_uid("User", "42").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MockResourceStore::new();
        store.fail_writes(true);

        let result = store
            .insert(&Resource::new("User", "a@b.com", Utc::now()))
            .await;

        assert!(matches!(result, Err(AuthError::Storage(_))));
        assert!(store.is_empty());
    }
}
