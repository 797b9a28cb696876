//! Password sign-in, token validation and sign-out handlers.

use crate::constants::DEFAULT_RESOURCE_CLASS;
use crate::environment::AuthEnvironment;
use crate::handlers::error::ApiError;
use crate::handlers::middleware::{
    insert_credential_headers, resource_class_of, CurrentResource, PresentedCredentials,
};
use crate::providers::ResourceStore;
use crate::tokens::RefreshedCredentials;
use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Password sign-in request.
#[derive(Clone, Deserialize)]
pub struct SignInRequest {
    /// Account email.
    pub email: String,

    /// Account password.
    pub password: String,

    /// Resource class (defaults to `User`).
    #[serde(default)]
    pub resource_class: Option<String>,
}

impl std::fmt::Debug for SignInRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInRequest")
            .field("email", &self.email)
            .field("password", &"[redacted]")
            .field("resource_class", &self.resource_class)
            .finish()
    }
}

/// Body returned with a resource.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceResponse {
    /// Always `true`.
    pub success: bool,

    /// Public resource fields.
    pub data: serde_json::Value,
}

/// Sign in with email and password.
///
/// # Endpoint
///
/// ```text
/// POST /sign_in
/// Content-Type: application/json
///
/// {"email": "user@example.com", "password": "..."}
/// ```
///
/// # Response
///
/// Public resource fields in the body and the new credential in the
/// `access-token`, `client-id`, `uid`, `expiry` and `token-type` headers.
pub async fn sign_in<S>(
    State(env): State<Arc<AuthEnvironment<S>>>,
    Json(request): Json<SignInRequest>,
) -> Result<Response, ApiError>
where
    S: ResourceStore + 'static,
{
    let kind = request
        .resource_class
        .as_deref()
        .unwrap_or(DEFAULT_RESOURCE_CLASS);

    let (resource, auth_params) = env
        .credentials
        .sign_in(kind, &request.email, &request.password)
        .await?;

    let mut response = Json(ResourceResponse {
        success: true,
        data: resource.public_json(),
    })
    .into_response();
    insert_credential_headers(response.headers_mut(), &RefreshedCredentials::from(&auth_params));
    Ok(response)
}

/// Return the authenticated resource.
///
/// # Endpoint
///
/// ```text
/// GET /validate_token
/// access-token: ...
/// client-id: ...
/// uid: ...
/// ```
///
/// Runs behind [`super::middleware::require_auth`], which rotates the token
/// and writes the refreshed credential headers.
pub async fn validate_token(
    Extension(CurrentResource(resource)): Extension<CurrentResource>,
) -> Json<ResourceResponse> {
    Json(ResourceResponse {
        success: true,
        data: resource.public_json(),
    })
}

/// Revoke the presenting device's token.
///
/// # Endpoint
///
/// ```text
/// DELETE /sign_out
/// access-token: ...
/// client-id: ...
/// uid: ...
/// ```
///
/// Other devices of the same resource stay signed in.
pub async fn sign_out<S>(
    State(env): State<Arc<AuthEnvironment<S>>>,
    req: Request,
) -> Result<Json<serde_json::Value>, ApiError>
where
    S: ResourceStore + 'static,
{
    let presented = PresentedCredentials::from_headers(req.headers())
        .ok_or_else(|| ApiError::unauthorized("Authorized users only."))?;
    let kind = resource_class_of(&req);

    env.verifier
        .sign_out(&kind, &presented.uid, &presented.client_id, &presented.access_token)
        .await?;

    Ok(Json(serde_json::json!({ "success": true })))
}
