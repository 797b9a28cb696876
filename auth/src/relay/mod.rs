//! Handshake relay.
//!
//! Returns a federated login result to the browser context that started
//! the flow, even though the provider redirects somewhere else.
//!
//! # Phases
//!
//! ```text
//! Initiated → ProviderRedirect → CallbackReceived → Resolved(Success | Failure)
//! ```
//!
//! The [`HandshakeContext`] crosses the provider round-trip inside a signed
//! `state` parameter (see [`state_token`]), so no server-side session is
//! needed and any instance sharing the secret can finish the flow.
//!
//! # Delivery
//!
//! 1. `window_type` set → page posting the result to the opener window;
//!    credentials only go to an allowed `origin_url`, never to `"*"`
//! 2. else `origin_url` set and allowed → 302 to `origin_url` with the result
//!    as query parameters plus `blank=true`
//! 3. else → fallback page with the error string or a generic message

pub mod render;
pub mod state_token;

use crate::config::{RelayConfig, ResourceRegistry};
use crate::constants::{messages, params};
use crate::environment::Clock;
use crate::error::{AuthError, Result, GENERIC_FAILURE_MESSAGE};
use crate::state::{AuthParams, HandshakeContext, Resource};
use serde_json::{Map, Value};
use state_token::StateSigner;
use std::borrow::Cow;
use std::sync::Arc;
use url::Url;

// ═══════════════════════════════════════════════════════════════════════
// Phases
// ═══════════════════════════════════════════════════════════════════════

/// Terminal result of a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Credentials were delivered.
    Success,
    /// An error was delivered.
    Failure,
}

/// Where a handshake is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Context captured from the initiating request.
    Initiated,
    /// Browser sent to the provider with the sealed state.
    ProviderRedirect,
    /// Provider redirected back; state has been checked.
    CallbackReceived,
    /// Result delivered.
    Resolved(Outcome),
}

impl HandshakePhase {
    /// Phase name for logs and errors.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::ProviderRedirect => "provider_redirect",
            Self::CallbackReceived => "callback_received",
            Self::Resolved(Outcome::Success) => "resolved_success",
            Self::Resolved(Outcome::Failure) => "resolved_failure",
        }
    }

    /// Whether `self → next` is a legal step.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Initiated, Self::ProviderRedirect)
                | (Self::ProviderRedirect, Self::CallbackReceived)
                | (Self::CallbackReceived, Self::Resolved(_))
        )
    }
}

/// One federated login attempt as seen by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    phase: HandshakePhase,
    provider: String,
    context: Option<HandshakeContext>,
}

impl Handshake {
    /// Start a handshake for `provider`.
    #[must_use]
    pub fn initiated(provider: impl Into<String>, context: HandshakeContext) -> Self {
        Self {
            phase: HandshakePhase::Initiated,
            provider: provider.into(),
            context: Some(context),
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Provider name.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Threaded context. `None` when the callback carried no valid state.
    #[must_use]
    pub const fn context(&self) -> Option<&HandshakeContext> {
        self.context.as_ref()
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidTransition`] for an illegal step; the
    /// phase is left unchanged.
    pub fn advance(&mut self, next: HandshakePhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(AuthError::InvalidTransition {
                from: self.phase.name(),
                to: next.name(),
            });
        }
        tracing::debug!(provider = %self.provider, from = self.phase.name(), to = next.name(), "Handshake transition");
        self.phase = next;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Results and Responses
// ═══════════════════════════════════════════════════════════════════════

/// What the relay delivers.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayResult {
    /// Sign-in succeeded.
    Success {
        /// Freshly issued credentials.
        auth_params: AuthParams,
        /// Public resource fields (see [`Resource::public_json`]).
        resource: Value,
    },
    /// Sign-in failed.
    Failure {
        /// Client-safe message.
        error: String,
    },
}

impl RelayResult {
    /// Success result for `resource`.
    #[must_use]
    pub fn success(auth_params: AuthParams, resource: &Resource) -> Self {
        Self::Success {
            auth_params,
            resource: resource.public_json(),
        }
    }

    /// Failure result with a client-safe `message`.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    /// Failure result for `error`, using only its client-safe message.
    #[must_use]
    pub fn from_error(error: &AuthError) -> Self {
        Self::failure(error.client_message())
    }

    const fn outcome(&self) -> Outcome {
        match self {
            Self::Success { .. } => Outcome::Success,
            Self::Failure { .. } => Outcome::Failure,
        }
    }

    const fn message(&self) -> &'static str {
        match self {
            Self::Success { .. } => messages::DELIVER_CREDENTIALS,
            Self::Failure { .. } => messages::AUTH_FAILURE,
        }
    }

    /// Fields meant for the initiating client. Public resource fields are
    /// only included when `with_resource` is set.
    fn data(&self, with_resource: bool) -> Result<Map<String, Value>> {
        match self {
            Self::Success {
                auth_params,
                resource,
            } => {
                let mut data = match resource {
                    Value::Object(fields) if with_resource => fields.clone(),
                    _ => Map::new(),
                };
                let Value::Object(auth) = serde_json::to_value(auth_params)
                    .map_err(|e| AuthError::Serialization(e.to_string()))?
                else {
                    return Err(AuthError::Serialization("auth params are not an object".to_string()));
                };
                data.extend(auth);
                Ok(data)
            }
            Self::Failure { error } => {
                let mut data = Map::new();
                data.insert("error".to_string(), Value::String(error.clone()));
                Ok(data)
            }
        }
    }
}

/// Relay output, one of exactly three shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayResponse {
    /// HTML page posting the result to the opener window.
    PostMessage {
        /// Page body.
        html: String,
    },
    /// Redirect to the initiating origin.
    Redirect {
        /// `Location` value.
        location: String,
    },
    /// Minimal page with an error string only.
    Fallback {
        /// Page body.
        html: String,
    },
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for RelayResponse {
    fn into_response(self) -> axum::response::Response {
        use axum::http::{header, StatusCode};
        use axum::response::Html;

        let no_store = [(header::CACHE_CONTROL, "no-store")];
        match self {
            Self::PostMessage { html } | Self::Fallback { html } => {
                (no_store, Html(html)).into_response()
            }
            Self::Redirect { location } => (
                StatusCode::FOUND,
                no_store,
                [(header::LOCATION, location)],
            )
                .into_response(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Relay
// ═══════════════════════════════════════════════════════════════════════

/// Threads handshake context through the provider and delivers the result.
#[derive(Debug, Clone)]
pub struct HandshakeRelay {
    signer: StateSigner,
    registry: Arc<ResourceRegistry>,
    config: Arc<RelayConfig>,
}

impl HandshakeRelay {
    /// Create a relay.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingContext`] if the state secret is empty.
    pub fn new(
        config: Arc<RelayConfig>,
        registry: Arc<ResourceRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let signer = StateSigner::new(&config.state_secret, config.state_ttl, clock)?;
        Ok(Self {
            signer,
            registry,
            config,
        })
    }

    /// Start a handshake and build the provider URL carrying the sealed state.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The resource class is not registered → `AuthError::UnknownResourceClass`
    /// - No endpoint is configured for `provider` → `AuthError::MissingContext`
    /// - The configured endpoint is not a URL → `AuthError::Internal`
    pub fn begin(&self, provider: &str, context: HandshakeContext) -> Result<(Handshake, Url)> {
        self.registry.lookup(&context.resource_class)?;

        let endpoint = self
            .config
            .provider_endpoints
            .get(provider)
            .ok_or(AuthError::MissingContext("provider endpoint"))?;
        let mut url = Url::parse(endpoint)
            .map_err(|e| AuthError::Internal(format!("Invalid endpoint for {provider}: {e}")))?;

        let mut handshake = Handshake::initiated(provider, context.clone());
        let state = self.signer.seal(provider, context)?;
        url.query_pairs_mut().append_pair(params::STATE, &state);
        handshake.advance(HandshakePhase::ProviderRedirect)?;

        tracing::info!(provider = %provider, "Started federated handshake");
        Ok((handshake, url))
    }

    /// Accept the provider callback.
    ///
    /// When `provider` is given the state must have been issued for it. A
    /// missing, forged, stale or cross-provider state yields a handshake
    /// without context; resolving it always renders the fallback page.
    #[must_use]
    pub fn receive(&self, provider: Option<&str>, state: Option<&str>) -> Handshake {
        let claims = match state.map(|state| self.signer.open(state)) {
            Some(Ok(claims)) => match provider {
                Some(provider) if provider != claims.provider => {
                    tracing::warn!(expected = %provider, actual = %claims.provider, "State issued for another provider");
                    None
                }
                _ => Some(claims),
            },
            Some(Err(e)) => {
                tracing::warn!(provider = ?provider, error = %e, "Rejected handshake state");
                None
            }
            None => {
                tracing::warn!(provider = ?provider, "Callback without handshake state");
                None
            }
        };

        let provider = claims
            .as_ref()
            .map(|claims| claims.provider.clone())
            .or_else(|| provider.map(ToString::to_string))
            .unwrap_or_default();

        Handshake {
            phase: HandshakePhase::CallbackReceived,
            provider,
            context: claims.map(|claims| claims.context),
        }
    }

    /// Config name reported back to the client for `context`.
    #[must_use]
    pub fn config_name(&self, context: &HandshakeContext) -> Option<String> {
        context
            .config_name
            .clone()
            .or_else(|| self.config.default_config_name.clone())
    }

    /// Deliver `result` and close the handshake.
    ///
    /// The handshake resolves as a failure whenever credentials are
    /// withheld, even if `result` is a success.
    ///
    /// # Errors
    ///
    /// Returns error if the handshake is not in `CallbackReceived` or the
    /// payload cannot be encoded.
    pub fn resolve(&self, handshake: &mut Handshake, result: &RelayResult) -> Result<RelayResponse> {
        let (response, outcome) = self.deliver(handshake, result)?;
        handshake.advance(HandshakePhase::Resolved(outcome))?;
        Ok(response)
    }

    fn deliver(&self, handshake: &Handshake, result: &RelayResult) -> Result<(RelayResponse, Outcome)> {
        let Some(context) = handshake.context() else {
            return Ok((Self::fallback(result), Outcome::Failure));
        };

        if context.window_type.is_some() {
            return self.post_message(handshake.provider(), context, result);
        }

        if let Some(origin_url) = context.origin_url.as_deref() {
            return match self.redirect_target(origin_url) {
                Ok(url) => {
                    tracing::info!(provider = %handshake.provider, origin = %url.origin().ascii_serialization(), message = result.message(), "Relaying result by redirect");
                    Ok((
                        RelayResponse::Redirect {
                            location: render::redirect_location(&url, &result.data(false)?),
                        },
                        result.outcome(),
                    ))
                }
                Err(e) => {
                    tracing::warn!(provider = %handshake.provider, error = %e, "Refusing redirect target");
                    Ok((Self::fallback(result), Outcome::Failure))
                }
            };
        }

        Ok((Self::fallback(result), Outcome::Failure))
    }

    /// Opener-window page. Credentials are only posted to an allowed tuple
    /// origin; without one a success degrades to a generic failure posted
    /// to `"*"`.
    fn post_message(
        &self,
        provider: &str,
        context: &HandshakeContext,
        result: &RelayResult,
    ) -> Result<(RelayResponse, Outcome)> {
        let target_origin = context.origin_url.as_deref().and_then(|origin_url| {
            match self.redirect_target(origin_url) {
                Ok(url) => Some(url.origin())
                    .filter(url::Origin::is_tuple)
                    .map(|origin| origin.ascii_serialization()),
                Err(e) => {
                    tracing::warn!(provider, error = %e, "Refusing opener origin");
                    None
                }
            }
        });

        let (delivered, target_origin) = match (target_origin, result) {
            (Some(origin), _) => (Cow::Borrowed(result), origin),
            (None, RelayResult::Failure { .. }) => (Cow::Borrowed(result), "*".to_string()),
            (None, RelayResult::Success { .. }) => {
                tracing::warn!(provider, "No trusted opener origin, withholding credentials");
                (
                    Cow::Owned(RelayResult::failure(GENERIC_FAILURE_MESSAGE)),
                    "*".to_string(),
                )
            }
        };

        let mut data = delivered.data(true)?;
        data.insert("message".to_string(), Value::String(delivered.message().to_string()));

        tracing::info!(provider, target_origin = %target_origin, message = delivered.message(), "Relaying result to opener window");
        Ok((
            RelayResponse::PostMessage {
                html: render::post_message_page(&Value::Object(data), &target_origin),
            },
            delivered.outcome(),
        ))
    }

    /// Parse `origin_url` and check it against the redirect allow-list.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RedirectNotAllowed`] if the URL does not parse or
    /// its origin is not allowed.
    pub fn redirect_target(&self, origin_url: &str) -> Result<Url> {
        let url = Url::parse(origin_url).map_err(|_| AuthError::RedirectNotAllowed)?;
        if matches!(url.scheme(), "javascript" | "data" | "vbscript") {
            return Err(AuthError::RedirectNotAllowed);
        }

        if self.config.redirect_allow_list.is_empty() {
            return Ok(url);
        }

        let origin = origin_of(&url);
        let allowed = self
            .config
            .redirect_allow_list
            .iter()
            .any(|entry| entry.trim_end_matches('/') == origin);

        if allowed {
            Ok(url)
        } else {
            Err(AuthError::RedirectNotAllowed)
        }
    }

    fn fallback(result: &RelayResult) -> RelayResponse {
        let message = match result {
            RelayResult::Failure { error } if !error.is_empty() => error.as_str(),
            _ => GENERIC_FAILURE_MESSAGE,
        };
        tracing::info!(message = %message, "Relaying result to fallback page");
        RelayResponse::Fallback {
            html: render::fallback_page(message),
        }
    }
}

/// `scheme://host[:port]`; custom app schemes keep their host if any.
fn origin_of(url: &Url) -> String {
    let origin = url.origin();
    if origin.is_tuple() {
        return origin.ascii_serialization();
    }
    format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default())
}
