//! Token authentication middleware.
//!
//! # Flow
//!
//! 1. **Extract** `access-token`, `client-id` and `uid` headers
//! 2. **Verify** through [`crate::tokens::TokenVerifier`] (rotates the token)
//! 3. **Store** the resource in request extensions as [`CurrentResource`]
//! 4. **Inject** the refreshed credential into the response headers
//!
//! Clients must replace their stored credential with the response headers
//! on every authenticated response.
//!
//! # Example
//!
//! ```ignore
//! let protected = Router::new()
//!     .route("/me", get(me))
//!     .route_layer(axum::middleware::from_fn_with_state(env.clone(), require_auth::<S>));
//! ```

use crate::constants::{headers, params, DEFAULT_RESOURCE_CLASS};
use crate::environment::AuthEnvironment;
use crate::handlers::error::ApiError;
use crate::providers::ResourceStore;
use crate::state::{ClientId, Resource};
use crate::tokens::{RefreshedCredentials, Verification};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// Resource authenticated by [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentResource(pub Resource);

/// Credential headers presented by a client.
#[derive(Clone)]
pub struct PresentedCredentials {
    /// Plaintext token.
    pub access_token: String,
    /// Device identifier.
    pub client_id: ClientId,
    /// Resource uid.
    pub uid: String,
}

impl PresentedCredentials {
    /// Read the credential headers. `None` if any is missing or not ASCII.
    #[must_use]
    pub fn from_headers(map: &HeaderMap) -> Option<Self> {
        let get = |name: &str| {
            map.get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToString::to_string)
        };

        Some(Self {
            access_token: get(headers::ACCESS_TOKEN)?,
            client_id: ClientId(get(headers::CLIENT_ID)?),
            uid: get(headers::UID)?,
        })
    }
}

impl std::fmt::Debug for PresentedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresentedCredentials")
            .field("access_token", &"[redacted]")
            .field("client_id", &self.client_id)
            .field("uid", &self.uid)
            .finish()
    }
}

/// Resource class named by the `resource_class` query parameter, or the
/// default class.
#[must_use]
pub fn resource_class_of(req: &Request) -> String {
    req.uri()
        .query()
        .and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == params::RESOURCE_CLASS)
                .map(|(_, value)| value.into_owned())
        })
        .unwrap_or_else(|| DEFAULT_RESOURCE_CLASS.to_string())
}

/// Write the refreshed credential onto `map`.
pub fn insert_credential_headers(map: &mut HeaderMap, refreshed: &RefreshedCredentials) {
    for (name, value) in refreshed.to_headers() {
        if let Ok(value) = HeaderValue::from_str(&value) {
            map.insert(HeaderName::from_static(name), value);
        }
    }
}

/// Require a valid device token; rejects with a uniform 401 otherwise.
pub async fn require_auth<S>(
    State(env): State<Arc<AuthEnvironment<S>>>,
    mut req: Request,
    next: Next,
) -> Response
where
    S: ResourceStore + 'static,
{
    let Some(presented) = PresentedCredentials::from_headers(req.headers()) else {
        return rejected();
    };
    let kind = resource_class_of(&req);

    let verification = match env
        .verifier
        .verify(&kind, &presented.uid, &presented.client_id, &presented.access_token)
        .await
    {
        Ok(verification) => verification,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let Verification::Authenticated { resource, refreshed } = verification else {
        tracing::debug!(client_id = %presented.client_id, "Rejected token");
        return rejected();
    };

    req.extensions_mut().insert(CurrentResource(*resource));
    let mut response = next.run(req).await;

    if let Some(refreshed) = refreshed {
        insert_credential_headers(response.headers_mut(), &refreshed);
    }

    response
}

fn rejected() -> Response {
    ApiError::unauthorized("Authorized users only.").into_response()
}
