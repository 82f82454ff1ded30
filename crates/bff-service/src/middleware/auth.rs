//! Authentication middleware for protected routes.
//!
//! Pulls the access token from the `Authorization: Bearer` header, or from
//! the configured cookie when no Bearer header is present, verifies it, and
//! injects the resulting [`Principal`] and the raw [`BearerToken`] into
//! request extensions.

use crate::auth::jwt::TokenVerifier;
use crate::auth::principal::Principal;
use crate::auth::AuthError;
use crate::errors::BffError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::IntoResponse,
};
use common::secret::SecretString;
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<TokenVerifier>,

    /// Cookie consulted when no Bearer header is present.
    pub cookie_name: String,
}

/// The caller's verified access token, forwarded unchanged downstream.
#[derive(Clone)]
pub struct BearerToken(pub Arc<SecretString>);

/// Find the access token: `Authorization: Bearer` first (scheme matched
/// case-insensitively), then the named cookie.
pub fn extract_token<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    bearer_from_header(headers).or_else(|| token_from_cookie(headers, cookie_name))
}

fn bearer_from_header(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn token_from_cookie<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == cookie_name && !value.is_empty())
        .map(|(_, value)| value)
}

/// Authentication middleware for user tokens.
///
/// # Response
///
/// - Returns 401 Unauthorized if the token is missing or fails verification
/// - Continues with `Principal` and `BearerToken` in extensions otherwise
#[instrument(skip_all, name = "bff.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, BffError> {
    let token = extract_token(req.headers(), &state.cookie_name)
        .map(ToString::to_string)
        .ok_or_else(|| {
            tracing::debug!(target: "bff.middleware.auth", "No access token in header or cookie");
            AuthError::MissingToken
        })?;

    let principal = state.verifier.authenticate(&token).await?;

    tracing::debug!(
        target: "bff.middleware.auth",
        username = %principal.username,
        roles = ?principal.sorted_roles(),
        "Request authenticated"
    );

    req.extensions_mut().insert(principal);
    req.extensions_mut()
        .insert(BearerToken(Arc::new(SecretString::from(token))));

    Ok(next.run(req).await)
}

/// Extension trait for reading the authenticated principal.
pub trait PrincipalExt {
    /// `None` if the auth middleware did not run for this request.
    fn principal(&self) -> Option<&Principal>;
}

impl<B> PrincipalExt for axum::http::Request<B> {
    fn principal(&self) -> Option<&Principal> {
        self.extensions().get::<Principal>()
    }
}
