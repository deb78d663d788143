//! Axum extractors for authentication.

use std::cell::RefCell;
use std::convert::Infallible;

use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use super::errors::AuthRejection;
use super::reissue::{ReissueState, RequestScope};
use super::request::{AuthRequest, client_addr};
use super::state::HasJwtPolicy;
use crate::jwt::Claims;

tokio::task_local! {
    /// Per-request authentication state.
    /// Shared between the extractors and the response middleware.
    pub static REQUEST_SCOPE: RefCell<RequestScope>;
}

/// Middleware that opens a [`RequestScope`] for the request and appends any
/// reissued cookie to the response, unless a handler remembered or forgot
/// explicitly.
pub async fn apply_reissue_cookie(request: Request, next: Next) -> Response {
    let (mut response, headers) = REQUEST_SCOPE
        .scope(RefCell::new(RequestScope::new()), async move {
            let response = next.run(request).await;
            let headers = REQUEST_SCOPE.with(|scope| scope.borrow_mut().finalize());
            (response, headers)
        })
        .await;

    for (name, value) in headers {
        response.headers_mut().append(name, value);
    }
    response
}

/// Run `f` against the request's [`AuthRequest`].
///
/// Outside [`apply_reissue_cookie`] a throwaway scope is used. Reissue is
/// disabled for it, since a reissued cookie could never reach the response.
pub fn with_auth_request<R>(parts: &Parts, f: impl FnOnce(&mut AuthRequest<'_>) -> R) -> R {
    let taken = REQUEST_SCOPE
        .try_with(|cell| {
            cell.try_borrow_mut()
                .ok()
                .map(|mut scope| std::mem::take(&mut *scope))
        })
        .ok()
        .flatten();
    let scoped = taken.is_some();
    let mut scope = taken.unwrap_or_else(|| {
        tracing::warn!(
            path = %parts.uri.path(),
            "No request scope, apply_reissue_cookie layer missing; cookie reissue disabled"
        );
        let mut scope = RequestScope::new();
        scope.set_reissue_state(ReissueState::NotReissued);
        scope
    });

    let result = {
        let mut request = AuthRequest::new(&parts.headers, &mut scope)
            .with_remote_addr(client_addr(parts));
        f(&mut request)
    };

    if scoped {
        let _ = REQUEST_SCOPE.try_with(|cell| {
            if let Ok(mut slot) = cell.try_borrow_mut() {
                *slot = scope;
            }
        });
    }
    result
}

/// Principal accepted by the policy, with the claims it was read from.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal {
    pub principal: String,
    pub claims: Claims,
}

fn authenticate<S: HasJwtPolicy>(parts: &Parts, state: &S) -> Option<AuthenticatedPrincipal> {
    let policy = state.jwt_policy();
    with_auth_request(parts, |request| {
        let principal = policy.authenticated_principal(request)?;
        Some(AuthenticatedPrincipal {
            principal,
            claims: policy.get_claims(request),
        })
    })
}

/// Verified claims of the request; empty when anonymous. Never rejects.
pub struct JwtClaims(pub Claims);

impl<S> FromRequestParts<S> for JwtClaims
where
    S: HasJwtPolicy + Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let policy = state.jwt_policy();
        Ok(JwtClaims(with_auth_request(parts, |request| {
            policy.get_claims(request)
        })))
    }
}

/// Raw token of the request, as selected by the transport.
pub struct JwtToken(pub Option<String>);

impl<S> FromRequestParts<S> for JwtToken
where
    S: HasJwtPolicy + Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let policy = state.jwt_policy();
        Ok(JwtToken(with_auth_request(parts, |request| {
            policy.get_token(request).into_token()
        })))
    }
}

/// Extractor for endpoints that require authentication.
/// Rejects with `401` when there is no accepted principal.
pub struct Authenticated(pub AuthenticatedPrincipal);

impl<S> FromRequestParts<S> for Authenticated
where
    S: HasJwtPolicy + Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate(parts, state)
            .map(Authenticated)
            .ok_or(AuthRejection)
    }
}

/// Optional authentication extractor - never fails.
pub struct MaybeAuthenticated(pub Option<AuthenticatedPrincipal>);

impl<S> FromRequestParts<S> for MaybeAuthenticated
where
    S: HasJwtPolicy + Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthenticated(authenticate(parts, state)))
    }
}
