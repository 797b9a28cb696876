//! Authentication state types.
//!
//! The identity record ([`Resource`]), its per-device [`TokenRecord`]s, and
//! the transient values exchanged during a federated login.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Unique identifier for a resource (identity record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(pub uuid::Uuid);

impl ResourceId {
    /// Generate a new random `ResourceId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable identifier of one authenticated device.
///
/// Distinct from the rotating token value: the client id survives rotation,
/// the token does not.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Token Records
// ═══════════════════════════════════════════════════════════════════════

/// Hashed token bound to one device.
///
/// The plaintext token is never stored; `token` is a salted argon2 PHC
/// string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Salted hash of the current token.
    pub token: String,

    /// Absolute expiry of the current token.
    pub expiry: DateTime<Utc>,

    /// Immediately-previous token, still accepted once inside the grace
    /// window after a rotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<PreviousToken>,
}

impl TokenRecord {
    /// Create a record with no grace-window predecessor.
    #[must_use]
    pub const fn new(token: String, expiry: DateTime<Utc>) -> Self {
        Self {
            token,
            expiry,
            previous: None,
        }
    }

    /// Returns `true` once `now` is past the expiry.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry < now
    }
}

/// Hash of the token replaced by the most recent rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousToken {
    /// Salted hash of the superseded token.
    pub token: String,

    /// Instant after which the superseded token is no longer accepted.
    pub valid_until: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════
// Resource
// ═══════════════════════════════════════════════════════════════════════

/// Local identity record.
///
/// `version` is the optimistic-concurrency counter maintained by the
/// resource store; `0` means the record has never been persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Resource ID.
    pub id: ResourceId,

    /// Registered resource class this record belongs to.
    pub kind: String,

    /// Provider-scoped uid (URL prefix stripped).
    pub uid: String,

    /// Normalised email address (lookup key).
    pub email: String,

    /// Provider the uid belongs to.
    pub provider: String,

    /// Display name.
    pub name: Option<String>,

    /// Allow-listed extra attributes supplied by the initiating client.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Live device tokens keyed by client id.
    #[serde(default)]
    pub tokens: BTreeMap<ClientId, TokenRecord>,

    /// Password hash. Federation-only accounts hold an unusable placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_password: Option<String>,

    /// Optimistic-concurrency version.
    #[serde(default)]
    pub version: u64,

    /// Created timestamp.
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Resource {
    /// Construct an unpersisted resource for `email`.
    #[must_use]
    pub fn new(kind: impl Into<String>, email: impl Into<String>, now: DateTime<Utc>) -> Self {
        let email = email.into();
        Self {
            id: ResourceId::new(),
            kind: kind.into(),
            uid: email.clone(),
            email,
            provider: "email".to_string(),
            name: None,
            attributes: BTreeMap::new(),
            tokens: BTreeMap::new(),
            encrypted_password: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns `true` if the store has never seen this record.
    #[must_use]
    pub const fn is_new_record(&self) -> bool {
        self.version == 0
    }

    /// Fields a client is allowed to see.
    ///
    /// Tokens, password hash and version never appear here.
    #[must_use]
    pub fn public_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (key, value) in &self.attributes {
            object.insert(key.clone(), serde_json::Value::String(value.clone()));
        }
        object.insert("id".to_string(), serde_json::json!(self.id.0));
        object.insert("email".to_string(), serde_json::json!(self.email));
        object.insert("uid".to_string(), serde_json::json!(self.uid));
        object.insert("provider".to_string(), serde_json::json!(self.provider));
        object.insert("name".to_string(), serde_json::json!(self.name));
        serde_json::Value::Object(object)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Federated Login Values
// ═══════════════════════════════════════════════════════════════════════

/// Credentials returned to the client exactly once after sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthParams {
    /// Plaintext bearer token.
    pub auth_token: String,

    /// Device identifier.
    pub client_id: ClientId,

    /// Resource uid.
    pub uid: String,

    /// Token expiry (unix seconds).
    pub expiry: i64,

    /// Client configuration name echoed from the initiating request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    /// Present (and `true`) only when this sign-in created the resource.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub oauth_registration: bool,
}

/// Identity claim received from a provider after the external exchange.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdentityAssertion {
    /// Provider name (e.g. "github").
    pub provider: String,

    /// Provider-side identifier, possibly a URL.
    pub external_uid: String,

    /// Email address.
    pub email: Option<String>,

    /// Given name.
    pub first_name: Option<String>,

    /// Family name.
    pub last_name: Option<String>,

    /// Display name (used when first/last are empty).
    pub display_name: Option<String>,
}

impl IdentityAssertion {
    /// Create an assertion with only the provider identity set.
    #[must_use]
    pub fn new(provider: impl Into<String>, external_uid: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            external_uid: external_uid.into(),
            ..Self::default()
        }
    }

    /// Set the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set given and family names.
    #[must_use]
    pub fn with_names(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// How the initiating client opened the provider page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WindowType {
    /// `window.open` popup.
    Popup,

    /// New browser window or tab.
    NewWindow,

    /// Embedded in-app browser (mobile hybrid apps).
    InAppBrowser,
}

impl WindowType {
    /// Parse the wire name. Unknown names mean "same window".
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "popup" => Some(Self::Popup),
            "newWindow" => Some(Self::NewWindow),
            "inAppBrowser" => Some(Self::InAppBrowser),
            _ => None,
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Popup => "popup",
            Self::NewWindow => "newWindow",
            Self::InAppBrowser => "inAppBrowser",
        }
    }
}

/// Context carried across the provider redirect inside the signed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeContext {
    /// Registered resource class.
    pub resource_class: String,

    /// Window the flow was started from, if not the same window.
    pub window_type: Option<WindowType>,

    /// Where to send the result in the same-window flow.
    pub origin_url: Option<String>,

    /// Client configuration name.
    pub config_name: Option<String>,

    /// Remaining initiation parameters, filtered by the resource class
    /// allow-list at resolution time.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl HandshakeContext {
    /// Create a context for `resource_class` with nothing else set.
    #[must_use]
    pub fn new(resource_class: impl Into<String>) -> Self {
        Self {
            resource_class: resource_class.into(),
            window_type: None,
            origin_url: None,
            config_name: None,
            params: BTreeMap::new(),
        }
    }

    /// Set the window type.
    #[must_use]
    pub const fn with_window_type(mut self, window_type: WindowType) -> Self {
        self.window_type = Some(window_type);
        self
    }

    /// Set the origin URL.
    #[must_use]
    pub fn with_origin_url(mut self, origin_url: impl Into<String>) -> Self {
        self.origin_url = Some(origin_url.into());
        self
    }

    /// Set the config name.
    #[must_use]
    pub fn with_config_name(mut self, config_name: impl Into<String>) -> Self {
        self.config_name = Some(config_name.into());
        self
    }

    /// Add a forwarded parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}
