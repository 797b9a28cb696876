//! Authentication configuration.
//!
//! Configuration values are provided by the application and passed into the
//! components at construction, never read from process-wide state.

use crate::constants::{DEFAULT_RESOURCE_CLASS, DEFAULT_UID_PREFIXES, RESERVED_ATTRIBUTES};
use crate::error::{AuthError, Result};
use chrono::Duration;
use std::collections::{BTreeMap, BTreeSet};

/// Argon2 work factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    /// Memory cost in KiB.
    pub memory_kib: u32,

    /// Number of passes.
    pub iterations: u32,

    /// Degree of parallelism.
    pub parallelism: u32,
}

impl HashCost {
    /// Smallest parameters argon2 accepts. Only suitable for tests.
    #[must_use]
    pub const fn minimal() -> Self {
        Self {
            memory_kib: 8,
            iterations: 1,
            parallelism: 1,
        }
    }
}

impl Default for HashCost {
    /// argon2id with 19 MiB, 2 passes, 1 lane.
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Device token configuration.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Lifetime of an issued token.
    ///
    /// Default: 2 weeks
    pub lifespan: Duration,

    /// Hash work factor.
    pub hash_cost: HashCost,

    /// How long the token replaced by a rotation stays acceptable (once).
    ///
    /// Default: 5 seconds
    pub grace_window: Duration,

    /// Maximum live devices per resource. `None` keeps every record until
    /// it is replaced.
    ///
    /// Default: `None`
    pub max_devices: Option<usize>,

    /// Attempts at a read-modify-write before giving up on a contended
    /// resource.
    ///
    /// Default: 3
    pub max_write_attempts: u32,
}

impl TokenConfig {
    /// Create token configuration with the given lifespan.
    #[must_use]
    pub fn new(lifespan: Duration) -> Self {
        Self {
            lifespan,
            ..Self::default()
        }
    }

    /// Set the hash work factor.
    #[must_use]
    pub const fn with_hash_cost(mut self, hash_cost: HashCost) -> Self {
        self.hash_cost = hash_cost;
        self
    }

    /// Set the rotation grace window.
    #[must_use]
    pub const fn with_grace_window(mut self, grace_window: Duration) -> Self {
        self.grace_window = grace_window;
        self
    }

    /// Cap the number of live devices per resource.
    #[must_use]
    pub const fn with_max_devices(mut self, max_devices: usize) -> Self {
        self.max_devices = Some(max_devices);
        self
    }

    /// Set the read-modify-write attempt budget.
    #[must_use]
    pub const fn with_max_write_attempts(mut self, attempts: u32) -> Self {
        self.max_write_attempts = attempts;
        self
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            lifespan: Duration::weeks(2),
            hash_cost: HashCost::default(),
            grace_window: Duration::seconds(5),
            max_devices: None,
            max_write_attempts: 3,
        }
    }
}

/// Handshake relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// HMAC key for the signed state parameter. Must be shared by every
    /// instance that can receive a callback.
    pub state_secret: Vec<u8>,

    /// Lifetime of a signed state parameter.
    ///
    /// Default: 10 minutes
    pub state_ttl: Duration,

    /// Origins (`scheme://host[:port]`) a same-window flow may redirect to.
    /// Empty allows any origin.
    pub redirect_allow_list: Vec<String>,

    /// Provider uid prefixes stripped before a uid is stored.
    pub uid_prefixes: Vec<String>,

    /// Config name reported when the initiating client sent none.
    pub default_config_name: Option<String>,

    /// Provider authorization endpoints keyed by provider name.
    pub provider_endpoints: BTreeMap<String, String>,
}

impl RelayConfig {
    /// Create relay configuration with the given signing secret.
    #[must_use]
    pub fn new(state_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            state_secret: state_secret.into(),
            ..Self::default()
        }
    }

    /// Set the state lifetime.
    #[must_use]
    pub const fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    /// Allow redirects to `origin`.
    #[must_use]
    pub fn allow_redirect_origin(mut self, origin: impl Into<String>) -> Self {
        self.redirect_allow_list.push(origin.into());
        self
    }

    /// Add a provider uid prefix to strip.
    #[must_use]
    pub fn with_uid_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.uid_prefixes.push(prefix.into());
        self
    }

    /// Set the default config name.
    #[must_use]
    pub fn with_default_config_name(mut self, name: impl Into<String>) -> Self {
        self.default_config_name = Some(name.into());
        self
    }

    /// Register the authorization endpoint of `provider`.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>, authorize_url: impl Into<String>) -> Self {
        self.provider_endpoints.insert(provider.into(), authorize_url.into());
        self
    }
}

impl Default for RelayConfig {
    /// Uses a random per-process secret, so state tokens only verify on the
    /// instance that issued them.
    fn default() -> Self {
        let secret: [u8; 32] = rand::random();
        Self {
            state_secret: secret.to_vec(),
            state_ttl: Duration::minutes(10),
            redirect_allow_list: Vec::new(),
            uid_prefixes: DEFAULT_UID_PREFIXES.iter().map(ToString::to_string).collect(),
            default_config_name: None,
            provider_endpoints: BTreeMap::new(),
        }
    }
}

/// Names of client-supplied parameters a resource class accepts.
///
/// The policy itself belongs to the application; this type only applies it.
/// Reserved attribute names are dropped even when listed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    permitted: BTreeSet<String>,
}

impl AllowList {
    /// Create an allow-list from parameter names.
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            permitted: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` if `name` may be assigned.
    #[must_use]
    pub fn permits(&self, name: &str) -> bool {
        self.permitted.contains(name) && !RESERVED_ATTRIBUTES.contains(&name)
    }

    /// Keep only permitted parameters. Everything else is silently dropped.
    #[must_use]
    pub fn filter(&self, params: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        params
            .iter()
            .filter(|(key, _)| self.permits(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// One permitted identity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceKind {
    /// Class name clients use to select this kind (e.g. "User").
    pub name: String,

    /// Parameters accepted at federated registration.
    pub sign_up_params: AllowList,
}

impl ResourceKind {
    /// Create a resource kind with an empty allow-list.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sign_up_params: AllowList::default(),
        }
    }

    /// Set the sign-up allow-list.
    #[must_use]
    pub fn with_sign_up_params(mut self, allow_list: AllowList) -> Self {
        self.sign_up_params = allow_list;
        self
    }
}

/// Registry of resource classes a caller may name.
///
/// Lookups are exact; a caller-supplied string never selects anything that
/// was not registered here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRegistry {
    kinds: BTreeMap<String, ResourceKind>,
}

impl ResourceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            kinds: BTreeMap::new(),
        }
    }

    /// Register a resource kind, replacing any kind of the same name.
    #[must_use]
    pub fn register(mut self, kind: ResourceKind) -> Self {
        self.kinds.insert(kind.name.clone(), kind);
        self
    }

    /// Look up a kind by class name.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownResourceClass`] if `name` is not registered.
    pub fn lookup(&self, name: &str) -> Result<&ResourceKind> {
        self.kinds
            .get(name)
            .ok_or_else(|| AuthError::UnknownResourceClass(name.to_string()))
    }
}

impl Default for ResourceRegistry {
    /// A single `User` kind accepting no extra parameters.
    fn default() -> Self {
        Self::empty().register(ResourceKind::new(DEFAULT_RESOURCE_CLASS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_config_builder() {
        let config = TokenConfig::new(Duration::hours(6))
            .with_hash_cost(HashCost::minimal())
            .with_grace_window(Duration::seconds(2))
            .with_max_devices(4)
            .with_max_write_attempts(5);

        assert_eq!(config.lifespan, Duration::hours(6));
        assert_eq!(config.hash_cost, HashCost::minimal());
        assert_eq!(config.grace_window, Duration::seconds(2));
        assert_eq!(config.max_devices, Some(4));
        assert_eq!(config.max_write_attempts, 5);
    }

    #[test]
    fn test_default_configs() {
        let tokens = TokenConfig::default();
        assert_eq!(tokens.lifespan, Duration::weeks(2));
        assert_eq!(tokens.max_devices, None);

        let relay = RelayConfig::default();
        assert_eq!(relay.state_secret.len(), 32);
        assert_eq!(relay.state_ttl, Duration::minutes(10));
        assert!(relay.uid_prefixes.contains(&"https://openid.intuit.com/".to_string()));
    }

    #[test]
    fn test_default_relay_secrets_differ() {
        assert_ne!(RelayConfig::default().state_secret, RelayConfig::default().state_secret);
    }

    #[test]
    fn test_allow_list_drops_unlisted_and_reserved() {
        let allow_list = AllowList::new(["nickname", "email", "tokens"]);
        let params: BTreeMap<String, String> = [
            ("nickname", "ab"),
            ("email", "attacker@example.com"),
            ("tokens", "{}"),
            ("admin", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let filtered = allow_list.filter(&params);

        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.get("nickname"), Some(&"ab".to_string()));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ResourceRegistry::default().register(ResourceKind::new("Admin"));

        assert!(registry.lookup("User").is_ok());
        assert!(registry.lookup("Admin").is_ok());
        assert_eq!(
            registry.lookup("Object"),
            Err(AuthError::UnknownResourceClass("Object".to_string()))
        );
    }
}
