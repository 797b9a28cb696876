//! Authentication router composition.

use crate::environment::AuthEnvironment;
use crate::handlers::{middleware::require_auth, omniauth, session};
use crate::providers::ResourceStore;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

/// Create authentication router with all auth endpoints.
///
/// # Routes
///
/// ## Federated login
/// - `GET /omniauth/:provider` - Redirect to the provider with signed state
/// - `GET /omniauth/:provider/callback` - Resolve identity, issue token, relay result
/// - `GET /omniauth/failure` - Relay a provider-side failure
///
/// ## Session
/// - `POST /sign_in` - Email/password sign-in
/// - `GET /validate_token` - Return the authenticated resource (rotates token)
/// - `DELETE /sign_out` - Revoke the presenting device
///
/// The callback expects an upstream layer to have placed the provider's
/// [`crate::state::IdentityAssertion`] in the request extensions.
///
/// # Example
///
/// ```rust,ignore
/// let env = Arc::new(AuthEnvironment::new(
///     RedisResourceStore::new("redis://127.0.0.1:6379").await?,
///     ResourceRegistry::default(),
///     &TokenConfig::default(),
///     RelayConfig::new(secret).with_provider("github", "https://github.com/login/oauth/authorize"),
///     Arc::new(SystemClock),
/// )?);
///
/// let app = Router::new().nest("/auth", auth_router(env));
/// ```
pub fn auth_router<S>(env: Arc<AuthEnvironment<S>>) -> Router
where
    S: ResourceStore + 'static,
{
    let protected = Router::new()
        .route("/validate_token", get(session::validate_token))
        .route_layer(axum::middleware::from_fn_with_state(
            Arc::clone(&env),
            require_auth::<S>,
        ));

    Router::new()
        // Federated login
        .route("/omniauth/failure", get(omniauth::omniauth_failure::<S>))
        .route("/omniauth/:provider", get(omniauth::omniauth_begin::<S>))
        .route("/omniauth/:provider/callback", get(omniauth::omniauth_callback::<S>))

        // Session
        .route("/sign_in", post(session::sign_in::<S>))
        .route("/sign_out", delete(session::sign_out::<S>))
        .merge(protected)
        .with_state(env)
}
