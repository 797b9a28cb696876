//! Resource store trait.

use crate::error::Result;
use crate::state::Resource;

/// Keyed record store for identity resources.
///
/// The store is the only shared mutable state in the system, so it owns the
/// concurrency contract: every write is a compare-and-swap on
/// [`Resource::version`].
///
/// # Implementation Notes
///
/// - `insert` MUST fail with `AuthError::Conflict` when a resource of the same
///   kind already exists for the email (no duplicate identities)
/// - `update` MUST fail with `AuthError::Conflict` when the stored version
///   differs from `resource.version` (lost update protection)
/// - `insert` and `update` MUST fail with `AuthError::UidTaken` when another
///   resource of the same kind holds the uid; `find_by_uid` relies on it
/// - Both return the committed record with its new version; a write is only
///   reported once it is durable
pub trait ResourceStore: Send + Sync {
    /// Find a resource by normalised email.
    ///
    /// # Errors
    ///
    /// Returns error if the storage operation fails.
    fn find_by_email(
        &self,
        kind: &str,
        email: &str,
    ) -> impl std::future::Future<Output = Result<Option<Resource>>> + Send;

    /// Find a resource by uid.
    ///
    /// # Errors
    ///
    /// Returns error if the storage operation fails.
    fn find_by_uid(
        &self,
        kind: &str,
        uid: &str,
    ) -> impl std::future::Future<Output = Result<Option<Resource>>> + Send;

    /// Persist a new resource.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - A resource with the same kind and email exists → `AuthError::Conflict`
    /// - Another resource of the same kind has the uid → `AuthError::UidTaken`
    /// - Storage operation fails
    fn insert(
        &self,
        resource: &Resource,
    ) -> impl std::future::Future<Output = Result<Resource>> + Send;

    /// Replace a persisted resource if nobody else wrote it since it was read.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Stored version differs → `AuthError::Conflict`
    /// - Another resource of the same kind has the uid → `AuthError::UidTaken`
    /// - Resource does not exist → `AuthError::ResourceNotFound`
    /// - Storage operation fails
    fn update(
        &self,
        resource: &Resource,
    ) -> impl std::future::Future<Output = Result<Resource>> + Send;
}
