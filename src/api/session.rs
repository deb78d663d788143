//! Session API endpoints.
//!
//! - GET `/login?principal=` - Mint a token and remember it in a cookie
//! - POST `/logout` - Forget the token cookie
//! - GET `/token?principal=` - Mint a token for header-transport clients
//! - GET `/whoami` - Resolved principal, effective principals and claims
//! - GET `/me` - Same as `/whoami` but requires authentication

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderName, HeaderValue, StatusCode, request::Parts},
    response::{AppendHeaders, IntoResponse},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use super::error::{ApiError, ResultExt, validate_principal};
use crate::auth::{
    Authenticated, JwtClaims, JwtToken, MaybeAuthenticated, TransportError, with_auth_request,
};
use crate::impl_has_jwt_policy;
use crate::jwt::Claims;
use crate::policy::{JwtPolicy, RememberOptions};

#[derive(Clone)]
pub struct SessionState {
    pub policy: Arc<JwtPolicy>,
}

impl_has_jwt_policy!(SessionState);

pub fn router(state: SessionState) -> Router {
    Router::new()
        .route("/login", get(login))
        .route("/logout", post(logout))
        .route("/token", get(issue_token))
        .route("/whoami", get(whoami))
        .route("/me", get(me))
        .with_state(state)
}

#[derive(Deserialize)]
struct TokenQuery {
    principal: String,
    /// Token lifetime in seconds, overriding the policy expiration
    expires_in: Option<u64>,
}

#[derive(Serialize)]
struct TokenResponse {
    principal: String,
    token: String,
}

#[derive(Serialize)]
struct WhoAmIResponse {
    principal: Option<String>,
    effective_principals: Vec<String>,
    claims: Claims,
}

#[derive(Serialize)]
struct MeResponse {
    principal: String,
    claims: Claims,
}

fn mint(policy: &JwtPolicy, query: &TokenQuery) -> Result<String, ApiError> {
    validate_principal(&query.principal)?;
    policy
        .create_token(
            &query.principal,
            query.expires_in.map(Duration::from_secs),
            None,
            Claims::new(),
        )
        .token_err("Failed to create token")
}

/// Cookie headers for a remember/forget, or none for the header transport.
fn cookie_headers(
    result: Result<Vec<(HeaderName, HeaderValue)>, TransportError>,
) -> Result<Vec<(HeaderName, HeaderValue)>, ApiError> {
    match result {
        Ok(headers) => Ok(headers),
        Err(TransportError::Unsupported) => Ok(Vec::new()),
        Err(e) => Err(ApiError::token_error("Failed to set cookie", e)),
    }
}

/// Mint a token and store it in the transport cookie.
async fn login(
    State(state): State<SessionState>,
    Query(query): Query<TokenQuery>,
    parts: Parts,
) -> Result<impl IntoResponse, ApiError> {
    let policy = &state.policy;
    let token = mint(policy, &query)?;

    let max_age = query.expires_in.map(Duration::from_secs);
    let headers = cookie_headers(with_auth_request(&parts, |request| {
        policy.remember(
            request,
            &token,
            RememberOptions {
                max_age,
                ..Default::default()
            },
        )
    }))?;

    tracing::info!(principal = %query.principal, "Issued session token");
    Ok((
        AppendHeaders(headers),
        Json(TokenResponse {
            principal: query.principal,
            token,
        }),
    ))
}

/// Clear the transport cookie.
async fn logout(
    State(state): State<SessionState>,
    parts: Parts,
) -> Result<impl IntoResponse, ApiError> {
    let policy = &state.policy;
    let headers = cookie_headers(with_auth_request(&parts, |request| policy.forget(request)))?;
    Ok((StatusCode::NO_CONTENT, AppendHeaders(headers)))
}

/// Mint a token without touching cookies.
async fn issue_token(
    State(state): State<SessionState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = mint(&state.policy, &query)?;
    Ok(Json(TokenResponse {
        principal: query.principal,
        token,
    }))
}

async fn whoami(
    State(state): State<SessionState>,
    MaybeAuthenticated(auth): MaybeAuthenticated,
    JwtClaims(claims): JwtClaims,
    parts: Parts,
) -> Json<WhoAmIResponse> {
    let policy = &state.policy;
    let effective_principals =
        with_auth_request(&parts, |request| policy.effective_principals(request));
    Json(WhoAmIResponse {
        principal: auth.map(|auth| auth.principal),
        effective_principals,
        claims,
    })
}

async fn me(Authenticated(auth): Authenticated, JwtToken(token): JwtToken) -> impl IntoResponse {
    tracing::debug!(principal = %auth.principal, has_token = token.is_some(), "Authenticated request");
    Json(MeResponse {
        principal: auth.principal,
        claims: auth.claims,
    })
}
