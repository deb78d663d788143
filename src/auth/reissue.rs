//! Sliding expiration for cookie tokens.
//!
//! When a verified cookie token is older than the reissue threshold, a
//! replacement token is minted and queued as a [`PendingCookie`]. The queued
//! cookie is only written to the response if nothing later in the same
//! request called `remember` or `forget`.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};

use super::authenticator::principal_of;
use super::errors::{BoxError, ReissueError};
use super::request::AuthRequest;
use crate::jwt::Claims;
use crate::policy::{JwtPolicy, RememberOptions};

/// Mints a replacement token: `(policy, request, principal, claims) -> token`.
///
/// Returning `Ok(None)` declines the reissue.
pub type ReissueCallback = Arc<
    dyn Fn(&JwtPolicy, &mut AuthRequest<'_>, &str, &Claims) -> Result<Option<String>, BoxError>
        + Send
        + Sync,
>;

/// Reissue progress for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReissueState {
    #[default]
    NotEvaluated,
    /// Evaluation running; guards against re-entry from the callback
    InProgress,
    NotReissued,
    Reissued,
}

/// What a single evaluation decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReissueOutcome {
    /// Already decided earlier in this request
    AlreadyEvaluated,
    /// Token younger than the threshold
    NotDue,
    /// Callback returned no token
    Declined,
    /// Replacement cookie queued for the response
    Scheduled,
}

/// `Set-Cookie` headers waiting for the response to be finalised.
#[derive(Debug, Clone)]
pub struct PendingCookie {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl PendingCookie {
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }
}

/// Mutable state scoped to one request. Create one per request and drop it with the request.
#[derive(Debug, Default)]
pub struct RequestScope {
    cached: Option<(String, Claims)>,
    reissue: ReissueState,
    revoked: bool,
    pending: Option<PendingCookie>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reissue_state(&self) -> ReissueState {
        self.reissue
    }

    /// Whether an explicit remember/forget superseded the reissue cookie.
    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    pub fn pending(&self) -> Option<&PendingCookie> {
        self.pending.as_ref()
    }

    pub(crate) fn cached_claims(&self, token: &str) -> Option<&Claims> {
        match &self.cached {
            Some((cached_token, claims)) if cached_token == token => Some(claims),
            _ => None,
        }
    }

    pub(crate) fn cache_claims(&mut self, token: &str, claims: Claims) {
        self.cached = Some((token.to_string(), claims));
    }

    pub(crate) fn set_reissue_state(&mut self, state: ReissueState) {
        self.reissue = state;
    }

    pub(crate) fn revoke(&mut self) {
        self.revoked = true;
    }

    fn schedule(&mut self, pending: PendingCookie) {
        self.pending = Some(pending);
    }

    /// Headers to append to the outgoing response.
    ///
    /// Empty when nothing was reissued or when the reissue was revoked.
    pub fn finalize(&mut self) -> Vec<(HeaderName, HeaderValue)> {
        match self.pending.take() {
            Some(pending) if !self.revoked => pending.headers,
            _ => Vec::new(),
        }
    }
}

/// Decides when a cookie token is old enough to replace, and replaces it.
#[derive(Clone)]
pub struct ReissueCoordinator {
    threshold: Duration,
    callback: Option<ReissueCallback>,
}

impl std::fmt::Debug for ReissueCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReissueCoordinator")
            .field("threshold", &self.threshold)
            .field("custom_callback", &self.callback.is_some())
            .finish()
    }
}

impl ReissueCoordinator {
    pub fn new(threshold: Duration, callback: Option<ReissueCallback>) -> Self {
        Self {
            threshold,
            callback,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Evaluate reissue for the verified `claims` of the request's cookie.
    ///
    /// Runs at most once per request. Any error leaves the request in
    /// [`ReissueState::NotReissued`] and queues nothing.
    pub fn evaluate(
        &self,
        policy: &JwtPolicy,
        request: &mut AuthRequest<'_>,
        claims: &Claims,
    ) -> Result<ReissueOutcome, ReissueError> {
        if request.scope().reissue_state() != ReissueState::NotEvaluated {
            return Ok(ReissueOutcome::AlreadyEvaluated);
        }
        request
            .scope_mut()
            .set_reissue_state(ReissueState::InProgress);

        let outcome = self.reissue(policy, request, claims);

        let state = match outcome {
            Ok(ReissueOutcome::Scheduled) => ReissueState::Reissued,
            _ => ReissueState::NotReissued,
        };
        request.scope_mut().set_reissue_state(state);
        outcome
    }

    fn reissue(
        &self,
        policy: &JwtPolicy,
        request: &mut AuthRequest<'_>,
        claims: &Claims,
    ) -> Result<ReissueOutcome, ReissueError> {
        let issued_at = claims.iat().ok_or(ReissueError::MissingClaim("iat"))?;
        let principal = principal_of(claims).ok_or(ReissueError::MissingClaim("sub"))?;
        // A numeric `sub` stays numeric in the replacement token
        let subject = claims.get("sub").cloned().ok_or(ReissueError::MissingClaim("sub"))?;

        let now = policy.now().map_err(ReissueError::Clock)?;
        if (now as f64) < issued_at + self.threshold.as_secs_f64() {
            return Ok(ReissueOutcome::NotDue);
        }

        let token = match &self.callback {
            Some(callback) => callback(policy, request, &principal, claims),
            None => policy
                .authenticator()
                .create_token_for(subject, None, None, claims.without_reserved())
                .map(Some)
                .map_err(BoxError::from),
        }
        .map_err(ReissueError::Callback)?;

        let Some(token) = token else {
            return Ok(ReissueOutcome::Declined);
        };

        let headers = policy
            .remember(request, &token, RememberOptions::default())
            .map_err(ReissueError::Cookie)?;
        request.scope_mut().schedule(PendingCookie { headers });
        tracing::debug!(principal = %principal, "Reissued JWT cookie");

        Ok(ReissueOutcome::Scheduled)
    }
}
