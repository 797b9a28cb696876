//! Salted, one-way token hashing.
//!
//! argon2id with an adjustable work factor. Hashing is CPU-bound, so every
//! async entry point runs on Tokio's blocking pool and never on a request
//! worker.

use crate::config::HashCost;
use crate::error::{AuthError, Result};
use crate::tokens::issuer::random_urlsafe;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;
use std::sync::Arc;

/// argon2id hasher for device tokens and placeholder passwords.
#[derive(Clone)]
pub struct TokenHasher {
    argon2: Argon2<'static>,
    /// Hash of a discarded random value, verified against when there is no
    /// stored hash so that "absent" costs the same as "mismatch".
    dummy_hash: Arc<str>,
}

impl TokenHasher {
    /// Create a hasher with the given work factor.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Hashing`] if argon2 rejects the parameters.
    pub fn new(cost: HashCost) -> Result<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| AuthError::Hashing(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let dummy_hash = hash_with(&argon2, &random_urlsafe())?;

        Ok(Self {
            argon2,
            dummy_hash: Arc::from(dummy_hash),
        })
    }

    /// Hash `plaintext` with a fresh random salt (blocking).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Hashing`] if argon2 fails.
    pub fn hash_blocking(&self, plaintext: &str) -> Result<String> {
        hash_with(&self.argon2, plaintext)
    }

    /// Check `candidate` against a stored PHC hash (blocking).
    ///
    /// Malformed hashes never verify.
    #[must_use]
    pub fn verify_blocking(&self, hash: &str, candidate: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.argon2
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok()
    }

    /// Spend one verification worth of work and fail.
    #[must_use]
    pub fn verify_dummy_blocking(&self, candidate: &str) -> bool {
        // The dummy hash belongs to a value nobody holds; the result is
        // ignored on purpose.
        let _ = self.verify_blocking(&self.dummy_hash, candidate);
        false
    }

    /// Hash `plaintext` on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns error if hashing fails or the blocking task panics.
    pub async fn hash(&self, plaintext: String) -> Result<String> {
        let hasher = self.clone();
        offload(move || hasher.hash_blocking(&plaintext)).await?
    }

    /// Verify `candidate` against `hash` on the blocking pool.
    ///
    /// # Errors
    ///
    /// Returns error if the blocking task panics.
    pub async fn verify(&self, hash: Option<String>, candidate: String) -> Result<bool> {
        let hasher = self.clone();
        offload(move || match hash {
            Some(hash) => hasher.verify_blocking(&hash, &candidate),
            None => hasher.verify_dummy_blocking(&candidate),
        })
        .await
    }
}

impl std::fmt::Debug for TokenHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenHasher")
            .field("params", self.argon2.params())
            .finish_non_exhaustive()
    }
}

/// Run CPU-bound work on the blocking pool.
///
/// # Errors
///
/// Returns [`AuthError::Internal`] if the closure panics or is cancelled.
pub async fn offload<F, T>(work: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AuthError::Internal(format!("Hashing task failed: {e}")))
}

fn hash_with(argon2: &Argon2<'static>, plaintext: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hashing(e.to_string()))
}
