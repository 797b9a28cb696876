//! Redis-based resource store implementation.
//!
//! # Architecture
//!
//! - **Record**: `auth:resource:{id}` → JSON-serialized [`Resource`]
//! - **Email index**: `auth:resource:{kind}:email:{email}` → id
//! - **Uid index**: `auth:resource:{kind}:uid:{uid}` → id
//!
//! # Atomicity
//!
//! Both writes run as Lua scripts, so a write and its index maintenance are
//! applied together:
//!
//! - **Insert** claims the email index with `SETNX`; losing that race is a
//!   [`AuthError::Conflict`]
//! - **Uid index** is never overwritten: a uid owned by another record is
//!   [`AuthError::UidTaken`] for both writes
//! - **Update** compares the stored `version` with the version the caller
//!   read and only then replaces the record (compare-and-swap)
//!
//! Records never expire. Token expiry is checked when a token is presented.

use crate::error::{AuthError, Result};
use crate::providers::ResourceStore;
use crate::state::Resource;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

/// Claim the email index, then write the record and uid index.
///
/// KEYS: record, email index, uid index. ARGV: json, id.
/// Returns 1 on success, 0 when the email is taken, -2 when the uid is.
const INSERT_SCRIPT: &str = r"
local uid_owner = redis.call('GET', KEYS[3])
if uid_owner and uid_owner ~= ARGV[2] then
    return -2
end
if redis.call('SETNX', KEYS[2], ARGV[2]) == 0 then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1])
redis.call('SET', KEYS[3], ARGV[2])
return 1
";

/// Replace the record if its stored version matches, moving the uid index
/// when the uid changed.
///
/// KEYS: record, new uid index. ARGV: json, expected version, id, uid index
/// prefix. Returns 1 on success, 0 on version mismatch, -1 when missing,
/// -2 when the new uid belongs to another record.
const UPDATE_SCRIPT: &str = r"
local current = redis.call('GET', KEYS[1])
if not current then
    return -1
end
local stored = cjson.decode(current)
if tostring(stored.version) ~= ARGV[2] then
    return 0
end
local uid_owner = redis.call('GET', KEYS[2])
if uid_owner and uid_owner ~= ARGV[3] then
    return -2
end
redis.call('SET', KEYS[1], ARGV[1])
local old_uid_key = ARGV[4] .. stored.uid
if old_uid_key ~= KEYS[2] and redis.call('GET', old_uid_key) == ARGV[3] then
    redis.call('DEL', old_uid_key)
end
redis.call('SET', KEYS[2], ARGV[3])
return 1
";

/// `Redis`-backed [`ResourceStore`].
///
/// # Thread Safety
///
/// This type is `Clone` and can be safely shared across threads.
/// Each clone shares the same `ConnectionManager` (connection pool).
#[derive(Clone)]
pub struct RedisResourceStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
}

impl RedisResourceStore {
    /// Create a new `Redis` resource store.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - `Redis` connection URL (e.g., "<redis://127.0.0.1:6379>")
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `Redis` URL is malformed
    /// - Connection to `Redis` server fails
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use relay_auth::stores::RedisResourceStore;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = RedisResourceStore::new("redis://127.0.0.1:6379").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| AuthError::Storage(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            AuthError::Storage(format!("Failed to create Redis connection manager: {e}"))
        })?;

        tracing::info!("RedisResourceStore initialized successfully");

        Ok(Self { conn_manager })
    }

    fn record_key(id: &str) -> String {
        format!("auth:resource:{id}")
    }

    fn email_key(kind: &str, email: &str) -> String {
        format!("auth:resource:{kind}:email:{email}")
    }

    fn uid_prefix(kind: &str) -> String {
        format!("auth:resource:{kind}:uid:")
    }

    fn uid_key(kind: &str, uid: &str) -> String {
        format!("{}{uid}", Self::uid_prefix(kind))
    }

    async fn find_by_index(&self, index_key: &str) -> Result<Option<Resource>> {
        let mut conn = self.conn_manager.clone();

        let id: Option<String> = conn
            .get(index_key)
            .await
            .map_err(|e| AuthError::Storage(format!("Failed to read index: {e}")))?;
        let Some(id) = id else {
            return Ok(None);
        };

        let json: Option<String> = conn
            .get(Self::record_key(&id))
            .await
            .map_err(|e| AuthError::Storage(format!("Failed to read resource: {e}")))?;

        json.map(|json| {
            serde_json::from_str(&json).map_err(|e| AuthError::Serialization(e.to_string()))
        })
        .transpose()
    }
}

impl ResourceStore for RedisResourceStore {
    async fn find_by_email(&self, kind: &str, email: &str) -> Result<Option<Resource>> {
        self.find_by_index(&Self::email_key(kind, email)).await
    }

    async fn find_by_uid(&self, kind: &str, uid: &str) -> Result<Option<Resource>> {
        self.find_by_index(&Self::uid_key(kind, uid)).await
    }

    async fn insert(&self, resource: &Resource) -> Result<Resource> {
        let mut committed = resource.clone();
        committed.version = 1;

        let id = committed.id.0.to_string();
        let json =
            serde_json::to_string(&committed).map_err(|e| AuthError::Serialization(e.to_string()))?;

        let mut conn = self.conn_manager.clone();
        let inserted: i64 = redis::Script::new(INSERT_SCRIPT)
            .key(Self::record_key(&id))
            .key(Self::email_key(&committed.kind, &committed.email))
            .key(Self::uid_key(&committed.kind, &committed.uid))
            .arg(json)
            .arg(&id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AuthError::Storage(format!("Failed to insert resource: {e}")))?;

        match inserted {
            1 => {}
            0 => return Err(AuthError::Conflict),
            _ => return Err(AuthError::UidTaken),
        }

        tracing::debug!(kind = %committed.kind, uid = %committed.uid, "Inserted resource");
        Ok(committed)
    }

    async fn update(&self, resource: &Resource) -> Result<Resource> {
        let mut committed = resource.clone();
        committed.version = resource.version + 1;

        let id = committed.id.0.to_string();
        let json =
            serde_json::to_string(&committed).map_err(|e| AuthError::Serialization(e.to_string()))?;

        let mut conn = self.conn_manager.clone();
        let outcome: i64 = redis::Script::new(UPDATE_SCRIPT)
            .key(Self::record_key(&id))
            .key(Self::uid_key(&committed.kind, &committed.uid))
            .arg(json)
            .arg(resource.version.to_string())
            .arg(&id)
            .arg(Self::uid_prefix(&committed.kind))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AuthError::Storage(format!("Failed to update resource: {e}")))?;

        match outcome {
            1 => Ok(committed),
            0 => Err(AuthError::Conflict),
            -2 => Err(AuthError::UidTaken),
            _ => Err(AuthError::ResourceNotFound),
        }
    }
}

impl std::fmt::Debug for RedisResourceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisResourceStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ClientId, TokenRecord};
    use chrono::{Duration, Utc};

    fn unique_email() -> String {
        format!("{}@example.com", uuid::Uuid::new_v4())
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used, clippy::expect_used)]
    async fn test_redis_resource_lifecycle() {
        let store = RedisResourceStore::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to create store");
        let email = unique_email();

        let inserted = store
            .insert(&Resource::new("User", &email, Utc::now()))
            .await
            .expect("Failed to insert");
        assert_eq!(inserted.version, 1);

        let mut changed = inserted.clone();
        changed.uid = format!("uid-{}", uuid::Uuid::new_v4());
        changed.tokens.insert(
            ClientId::from("device"),
            TokenRecord::new("hash".to_string(), Utc::now() + Duration::hours(1)),
        );
        let updated = store.update(&changed).await.expect("Failed to update");
        assert_eq!(updated.version, 2);

        let by_email = store.find_by_email("User", &email).await.unwrap().unwrap();
        let by_uid = store.find_by_uid("User", &changed.uid).await.unwrap().unwrap();
        assert_eq!(by_email, updated);
        assert_eq!(by_uid, updated);

        // The email was the uid before the update; that index entry is gone.
        assert!(store.find_by_uid("User", &email).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used, clippy::expect_used)]
    async fn test_duplicate_email_conflicts() {
        let store = RedisResourceStore::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to create store");
        let email = unique_email();

        store.insert(&Resource::new("User", &email, Utc::now())).await.unwrap();
        let second = store.insert(&Resource::new("User", &email, Utc::now())).await;

        assert_eq!(second.unwrap_err(), AuthError::Conflict);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used, clippy::expect_used)]
    async fn test_stale_version_conflicts() {
        let store = RedisResourceStore::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to create store");
        let inserted = store
            .insert(&Resource::new("User", &unique_email(), Utc::now()))
            .await
            .unwrap();

        store.update(&inserted).await.unwrap();
        let stale = store.update(&inserted).await;

        assert_eq!(stale.unwrap_err(), AuthError::Conflict);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used, clippy::expect_used)]
    async fn test_update_missing_resource() {
        let store = RedisResourceStore::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to create store");
        let mut ghost = Resource::new("User", &unique_email(), Utc::now());
        ghost.version = 1;

        assert_eq!(store.update(&ghost).await.unwrap_err(), AuthError::ResourceNotFound);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used, clippy::expect_used)]
    async fn test_uid_index_is_never_stolen() {
        let store = RedisResourceStore::new("redis://127.0.0.1:6379")
            .await
            .expect("Failed to create store");
        let uid = format!("uid-{}", uuid::Uuid::new_v4());

        let mut owner = Resource::new("User", &unique_email(), Utc::now());
        owner.uid.clone_from(&uid);
        let owner = store.insert(&owner).await.unwrap();

        let mut intruder = Resource::new("User", &unique_email(), Utc::now());
        intruder.uid.clone_from(&uid);
        assert_eq!(store.insert(&intruder).await.unwrap_err(), AuthError::UidTaken);

        let mut intruder = store
            .insert(&Resource::new("User", &unique_email(), Utc::now()))
            .await
            .unwrap();
        intruder.uid.clone_from(&uid);
        assert_eq!(store.update(&intruder).await.unwrap_err(), AuthError::UidTaken);

        let by_uid = store.find_by_uid("User", &uid).await.unwrap().unwrap();
        assert_eq!(by_uid.id, owner.id);
    }
}
