//! Authentication constants.
//!
//! Header names, relay message names and reserved attribute names shared by
//! the token lifecycle and the handshake relay.

/// Header names of the authenticated response contract.
///
/// Every authenticated response carries a refreshed credential under these
/// names and the client must replace its stored credential with them.
pub mod headers {
    /// Plaintext bearer token for the next request.
    pub const ACCESS_TOKEN: &str = "access-token";

    /// Device identifier the token is bound to.
    pub const CLIENT_ID: &str = "client-id";

    /// Resource uid.
    pub const UID: &str = "uid";

    /// Token expiry (unix seconds).
    pub const EXPIRY: &str = "expiry";

    /// Token type (always `Bearer`).
    pub const TOKEN_TYPE: &str = "token-type";

    /// Value of the `token-type` header.
    pub const BEARER: &str = "Bearer";
}

/// Message names posted to the window that initiated a federated login.
pub mod messages {
    /// Sent with the success payload.
    pub const DELIVER_CREDENTIALS: &str = "deliverCredentials";

    /// Sent with the failure payload.
    pub const AUTH_FAILURE: &str = "authFailure";
}

/// Query parameter names used during the provider round-trip.
pub mod params {
    /// Resource class requested by the initiating client.
    pub const RESOURCE_CLASS: &str = "resource_class";

    /// How the initiating client opened the provider page.
    pub const WINDOW_TYPE: &str = "omniauth_window_type";

    /// Where to send the result in the same-window flow.
    pub const AUTH_ORIGIN_URL: &str = "auth_origin_url";

    /// Legacy alias of [`AUTH_ORIGIN_URL`].
    pub const ORIGIN: &str = "origin";

    /// Named client configuration echoed back in the result.
    pub const CONFIG_NAME: &str = "config_name";

    /// Signed handshake state.
    pub const STATE: &str = "state";

    /// Failure message supplied by the provider layer.
    pub const MESSAGE: &str = "message";

    /// Marker appended to every redirect so clients can detect the relay.
    pub const BLANK: &str = "blank";

    /// Parameters consumed by the handshake itself, never forwarded to the
    /// allow-list filter.
    pub const HANDSHAKE: &[&str] = &[
        RESOURCE_CLASS,
        WINDOW_TYPE,
        AUTH_ORIGIN_URL,
        ORIGIN,
        CONFIG_NAME,
        STATE,
    ];
}

/// Resource class used when a request names none.
pub const DEFAULT_RESOURCE_CLASS: &str = "User";

/// Attribute names that client-supplied parameters can never assign, even
/// when an allow-list names them.
pub const RESERVED_ATTRIBUTES: &[&str] = &[
    "id",
    "uid",
    "email",
    "provider",
    "name",
    "tokens",
    "password",
    "password_confirmation",
    "encrypted_password",
    "version",
];

/// Provider uid prefixes stripped before a uid is stored.
pub const DEFAULT_UID_PREFIXES: &[&str] = &["https://openid.intuit.com/"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_params_are_not_forwardable() {
        for name in params::HANDSHAKE {
            assert!(!name.is_empty());
        }
        assert!(params::HANDSHAKE.contains(&params::STATE));
        assert!(!params::HANDSHAKE.contains(&params::MESSAGE));
    }

    #[test]
    fn test_reserved_attributes_cover_credentials() {
        assert!(RESERVED_ATTRIBUTES.contains(&"tokens"));
        assert!(RESERVED_ATTRIBUTES.contains(&"encrypted_password"));
        assert!(RESERVED_ATTRIBUTES.contains(&"password"));
    }
}
