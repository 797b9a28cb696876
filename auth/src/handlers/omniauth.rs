//! Federated login handlers.
//!
//! The provider exchange itself (authorization code → identity) is done by
//! an upstream layer, which hands the resulting [`IdentityAssertion`] to the
//! callback through request extensions.

use crate::constants::{params, DEFAULT_RESOURCE_CLASS};
use crate::environment::AuthEnvironment;
use crate::error::{AuthError, GENERIC_FAILURE_MESSAGE};
use crate::handlers::error::ApiError;
use crate::providers::ResourceStore;
use crate::relay::{Handshake, RelayResult};
use crate::state::{HandshakeContext, IdentityAssertion, WindowType};
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    Extension,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Callback query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    /// Signed handshake state.
    pub state: Option<String>,
}

/// Failure query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FailureQuery {
    /// Failure code from the provider layer.
    pub message: Option<String>,

    /// Signed handshake state.
    pub state: Option<String>,

    /// Provider that failed.
    pub strategy: Option<String>,
}

/// Build the handshake context from the initiating request's parameters.
///
/// `auth_origin_url` wins over `origin`. Everything that is not a handshake
/// parameter is forwarded for the allow-list filter.
#[must_use]
pub fn context_from_params(query: &BTreeMap<String, String>) -> HandshakeContext {
    let resource_class = query
        .get(params::RESOURCE_CLASS)
        .map_or(DEFAULT_RESOURCE_CLASS, String::as_str);
    let mut context = HandshakeContext::new(resource_class);

    if let Some(window_type) = query
        .get(params::WINDOW_TYPE)
        .and_then(|value| WindowType::parse(value))
    {
        context = context.with_window_type(window_type);
    }
    if let Some(origin_url) = query
        .get(params::AUTH_ORIGIN_URL)
        .or_else(|| query.get(params::ORIGIN))
        .filter(|value| !value.is_empty())
    {
        context = context.with_origin_url(origin_url.clone());
    }
    if let Some(config_name) = query.get(params::CONFIG_NAME) {
        context = context.with_config_name(config_name.clone());
    }

    for (key, value) in query {
        if !params::HANDSHAKE.contains(&key.as_str()) {
            context = context.with_param(key.clone(), value.clone());
        }
    }
    context
}

/// Start a federated login.
///
/// # Endpoint
///
/// ```text
/// GET /omniauth/:provider?resource_class=User&omniauth_window_type=popup&auth_origin_url=...
/// ```
///
/// # Response
///
/// Redirect to the provider's authorization page with a signed `state`.
/// An unknown resource class is a 400 before anything else happens.
pub async fn omniauth_begin<S>(
    State(env): State<Arc<AuthEnvironment<S>>>,
    Path(provider): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
) -> Result<Response, ApiError>
where
    S: ResourceStore + 'static,
{
    let context = context_from_params(&query);
    let (_, url) = env.relay.begin(&provider, context)?;
    Ok(Redirect::to(url.as_str()).into_response())
}

/// Finish a federated login.
///
/// # Endpoint
///
/// ```text
/// GET /omniauth/:provider/callback?state=...
/// ```
///
/// # Response
///
/// One of: opener-window page, redirect to the origin, fallback page.
/// Unknown resource class and persistence failures abort with an error
/// response instead.
pub async fn omniauth_callback<S>(
    State(env): State<Arc<AuthEnvironment<S>>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    assertion: Option<Extension<IdentityAssertion>>,
) -> Result<Response, ApiError>
where
    S: ResourceStore + 'static,
{
    let mut handshake = env.relay.receive(Some(&provider), query.state.as_deref());

    let result = match (handshake.context(), assertion) {
        (None, _) => RelayResult::failure(GENERIC_FAILURE_MESSAGE),
        (Some(_), None) => {
            tracing::warn!(provider = %provider, "Callback without provider identity");
            RelayResult::failure(GENERIC_FAILURE_MESSAGE)
        }
        (Some(_), Some(Extension(assertion))) if assertion.provider != provider => {
            tracing::warn!(expected = %provider, actual = %assertion.provider, "Identity from another provider");
            RelayResult::failure(GENERIC_FAILURE_MESSAGE)
        }
        (Some(_), Some(Extension(assertion))) => login(&env, &handshake, &assertion).await?,
    };

    Ok(env.relay.resolve(&mut handshake, &result)?.into_response())
}

async fn login<S: ResourceStore + 'static>(
    env: &AuthEnvironment<S>,
    handshake: &Handshake,
    assertion: &IdentityAssertion,
) -> Result<RelayResult, ApiError> {
    match env.complete_federated_login(handshake, assertion).await {
        Ok((resource, auth_params)) => Ok(RelayResult::success(auth_params, &resource)),
        Err(e @ AuthError::IdentityResolution { .. }) => {
            tracing::info!(provider = %handshake.provider(), error = %e, "Federated login failed");
            Ok(RelayResult::from_error(&e))
        }
        Err(e) => Err(e.into()),
    }
}

/// Report a provider-side failure to the initiating window.
///
/// # Endpoint
///
/// ```text
/// GET /omniauth/failure?message=access_denied&strategy=github&state=...
/// ```
pub async fn omniauth_failure<S>(
    State(env): State<Arc<AuthEnvironment<S>>>,
    Query(query): Query<FailureQuery>,
) -> Result<Response, ApiError>
where
    S: ResourceStore + 'static,
{
    let mut handshake = env
        .relay
        .receive(query.strategy.as_deref(), query.state.as_deref());

    let message = query
        .message
        .as_deref()
        .filter(|message| is_failure_code(message))
        .unwrap_or(GENERIC_FAILURE_MESSAGE);
    tracing::info!(provider = %handshake.provider(), message = %message, "Provider reported failure");

    let result = RelayResult::failure(message);
    Ok(env.relay.resolve(&mut handshake, &result)?.into_response())
}

/// Provider failure codes are short identifiers like `access_denied`.
/// Anything else is replaced by the generic message.
fn is_failure_code(message: &str) -> bool {
    !message.is_empty()
        && message.len() <= 64
        && message
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' '))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_context_from_params() {
        let context = context_from_params(&query(&[
            ("resource_class", "User"),
            ("omniauth_window_type", "newWindow"),
            ("origin", "https://legacy.example.com"),
            ("auth_origin_url", "https://app.example.com"),
            ("config_name", "mobile"),
            ("nickname", "ab"),
        ]));

        assert_eq!(context.resource_class, "User");
        assert_eq!(context.window_type, Some(WindowType::NewWindow));
        assert_eq!(context.origin_url.as_deref(), Some("https://app.example.com"));
        assert_eq!(context.config_name.as_deref(), Some("mobile"));
        assert_eq!(context.params, query(&[("nickname", "ab")]));
    }

    #[test]
    fn test_context_defaults() {
        let context = context_from_params(&query(&[("omniauth_window_type", "sameWindow")]));

        assert_eq!(context.resource_class, DEFAULT_RESOURCE_CLASS);
        assert_eq!(context.window_type, None);
        assert_eq!(context.origin_url, None);
    }

    #[test]
    fn test_failure_codes() {
        assert!(is_failure_code("access_denied"));
        assert!(is_failure_code("invalid_credentials"));
        assert!(!is_failure_code(""));
        assert!(!is_failure_code("<script>alert(1)</script>"));
        assert!(!is_failure_code(&"x".repeat(65)));
    }
}
