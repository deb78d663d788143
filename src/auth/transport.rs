//! Cookie transport: header/cookie precedence, remember and forget.

use std::borrow::Cow;

use axum::http::{HeaderName, HeaderValue};

use super::authenticator::TokenLookup;
use super::cookie::{CookieSettings, cookie_value};
use super::errors::{ReissueError, TransportError};
use super::reissue::{ReissueCoordinator, ReissueState};
use super::request::AuthRequest;
use crate::policy::{JwtPolicy, RememberOptions};

/// How a cookie transport treats a token sent in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderPolicy {
    /// Only the cookie is read
    Ignore,
    /// The header is used when no cookie was sent
    Fallback,
    /// The header wins when it carries a token
    Preferred,
}

impl HeaderPolicy {
    pub fn from_flags(accept_header: bool, header_first: bool) -> Self {
        match (accept_header, header_first) {
            (false, _) => HeaderPolicy::Ignore,
            (true, false) => HeaderPolicy::Fallback,
            (true, true) => HeaderPolicy::Preferred,
        }
    }
}

/// Token carried in a cookie, with optional sliding reissue.
#[derive(Debug, Clone)]
pub struct CookieTransport {
    settings: CookieSettings,
    header: HeaderPolicy,
    reissue: Option<ReissueCoordinator>,
}

impl CookieTransport {
    pub fn new(
        settings: CookieSettings,
        header: HeaderPolicy,
        reissue: Option<ReissueCoordinator>,
    ) -> Self {
        Self {
            settings,
            header,
            reissue,
        }
    }

    pub fn settings(&self) -> &CookieSettings {
        &self.settings
    }

    pub fn header_policy(&self) -> HeaderPolicy {
        self.header
    }

    pub fn reissue(&self) -> Option<&ReissueCoordinator> {
        self.reissue.as_ref()
    }

    /// Token for the request according to the header policy.
    ///
    /// Reissue is evaluated here, on the first read of a cookie token, so that
    /// requests authenticated by header never get a reissued cookie.
    pub(crate) fn get_token(
        &self,
        policy: &JwtPolicy,
        request: &mut AuthRequest<'_>,
    ) -> TokenLookup {
        let header = match self.header {
            HeaderPolicy::Ignore => TokenLookup::Absent,
            HeaderPolicy::Fallback | HeaderPolicy::Preferred => {
                policy.authenticator().get_token(request.headers())
            }
        };
        if self.header == HeaderPolicy::Preferred && header.token().is_some() {
            return header;
        }

        let Some(cookie) = cookie_value(request.headers(), self.settings.name())
            .filter(|value| !value.is_empty())
            .map(Cow::into_owned)
        else {
            return header;
        };

        if let Some(reissue) = &self.reissue {
            if request.scope().reissue_state() == ReissueState::NotEvaluated {
                let claims = policy.decode_cached(request, &cookie);
                if !claims.is_empty() {
                    if let Err(e) = reissue.evaluate(policy, request, &claims) {
                        log_reissue_error(request, &e);
                    }
                }
            }
        }

        TokenLookup::Found(cookie)
    }

    /// `Set-Cookie` headers storing `token`.
    ///
    /// An explicit remember after a reissue in the same request supersedes
    /// the reissued cookie.
    pub(crate) fn remember(
        &self,
        policy: &JwtPolicy,
        request: &mut AuthRequest<'_>,
        token: &str,
        options: RememberOptions,
    ) -> Result<Vec<(HeaderName, HeaderValue)>, TransportError> {
        if request.scope().reissue_state() == ReissueState::Reissued {
            request.scope_mut().revoke();
        }

        let max_age = options
            .max_age
            .or(policy.authenticator().expiration())
            .map(|age| age.as_secs());
        let domains = self
            .settings
            .resolve_domains(request.domain(), options.domains.as_deref());
        self.settings
            .set_cookie_headers(Some(token), &domains, max_age, policy.now().ok())
    }

    /// `Set-Cookie` headers clearing the cookie; always suppresses a pending reissue.
    pub(crate) fn forget(
        &self,
        request: &mut AuthRequest<'_>,
    ) -> Result<Vec<(HeaderName, HeaderValue)>, TransportError> {
        request.scope_mut().revoke();
        let domains = self.settings.resolve_domains(request.domain(), None);
        self.settings.set_cookie_headers(None, &domains, None, None)
    }
}

fn log_reissue_error(request: &AuthRequest<'_>, e: &ReissueError) {
    let remote_addr = request.remote_addr().unwrap_or("unknown");
    match e {
        ReissueError::MissingClaim(_) => {
            tracing::warn!(remote_addr, error = %e, "Malformed JWT cookie, skipping reissue")
        }
        _ => tracing::error!(remote_addr, error = %e, "JWT cookie reissue failed"),
    }
}
