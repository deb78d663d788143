//! Token creation and header extraction shared by every transport.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use serde_json::Value;

use super::request::AuthRequest;
use crate::jwt::{Claims, Clock, JwtError, TokenCodec};

/// Scheme expected in the `Authorization` header when none is configured.
pub const DEFAULT_SCHEME: &str = "JWT";

/// Result of looking for a token on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLookup {
    /// No token was sent, or it was sent under another scheme
    Absent,
    /// The header is present but cannot be parsed
    Malformed,
    Found(String),
}

impl TokenLookup {
    pub fn token(&self) -> Option<&str> {
        match self {
            TokenLookup::Found(token) => Some(token),
            _ => None,
        }
    }

    pub fn into_token(self) -> Option<String> {
        match self {
            TokenLookup::Found(token) => Some(token),
            _ => None,
        }
    }
}

/// Creates tokens and reads them back from a request header.
#[derive(Clone)]
pub struct TokenAuthenticator {
    codec: TokenCodec,
    header: HeaderName,
    scheme: Option<String>,
    expiration: Option<Duration>,
    default_claims: Claims,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("codec", &self.codec)
            .field("header", &self.header)
            .field("scheme", &self.scheme)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

impl TokenAuthenticator {
    /// `scheme` only applies to the `Authorization` header; for any other
    /// header the whole value is the token.
    pub fn new(
        codec: TokenCodec,
        header_name: HeaderName,
        scheme: Option<String>,
        expiration: Option<Duration>,
        default_claims: Claims,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let scheme = if header_name == header::AUTHORIZATION {
            Some(scheme.unwrap_or_else(|| DEFAULT_SCHEME.to_string()))
        } else {
            None
        };
        Self {
            codec,
            header: header_name,
            scheme,
            expiration: expiration.filter(|e| !e.is_zero()),
            default_claims,
            clock,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn expiration(&self) -> Option<Duration> {
        self.expiration
    }

    pub fn now(&self) -> Result<u64, JwtError> {
        self.clock.now()
    }

    /// Mint a token for `principal`.
    ///
    /// Claims are layered: policy defaults, then `extra`, then `sub` and
    /// `iat`. `exp` is `iat + expiration` when an expiration applies (the
    /// argument wins over the policy default) and is never taken from
    /// `extra`. `aud` is set the same way from `audience`.
    pub fn create_token(
        &self,
        principal: &str,
        expiration: Option<Duration>,
        audience: Option<&str>,
        extra: Claims,
    ) -> Result<String, JwtError> {
        self.create_token_for(Value::from(principal), expiration, audience, extra)
    }

    /// Like [`create_token`](Self::create_token), with `sub` stored as given.
    pub(crate) fn create_token_for(
        &self,
        subject: Value,
        expiration: Option<Duration>,
        audience: Option<&str>,
        extra: Claims,
    ) -> Result<String, JwtError> {
        let mut claims = self.default_claims.clone();
        claims.merge(extra);
        claims.remove("exp");

        let issued_at = self.clock.now()?;
        claims.insert("sub", subject);
        claims.insert("iat", issued_at);

        let expiration = expiration
            .filter(|e| !e.is_zero())
            .or(self.expiration);
        if let Some(expiration) = expiration {
            claims.insert("exp", issued_at.saturating_add(expiration.as_secs()));
        }

        let audience = audience
            .filter(|a| !a.is_empty())
            .or(self.codec.audience());
        if let Some(audience) = audience {
            claims.insert("aud", audience);
        }

        self.codec.encode(&claims)
    }

    /// Token from the configured header.
    pub fn get_token(&self, headers: &HeaderMap) -> TokenLookup {
        let Some(value) = headers.get(&self.header) else {
            return TokenLookup::Absent;
        };

        match &self.scheme {
            Some(expected) => match parse_authorization(value) {
                Some((scheme, token)) if scheme == expected => {
                    TokenLookup::Found(token.to_string())
                }
                Some(_) => TokenLookup::Absent,
                None => TokenLookup::Malformed,
            },
            None => match value.to_str() {
                Ok(token) if token.trim().is_empty() => TokenLookup::Absent,
                Ok(token) => TokenLookup::Found(token.trim().to_string()),
                Err(_) => TokenLookup::Malformed,
            },
        }
    }

    /// Verify `token`; any failure is logged and yields empty claims.
    pub fn decode(&self, request: &AuthRequest<'_>, token: &str) -> Claims {
        let result = self
            .clock
            .now()
            .and_then(|now| self.codec.decode(token, now));
        match result {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(
                    remote_addr = request.remote_addr().unwrap_or("unknown"),
                    error = %e,
                    "Invalid JWT token"
                );
                Claims::new()
            }
        }
    }

    /// Claims of the header token, or empty claims.
    pub fn get_claims(&self, request: &AuthRequest<'_>) -> Claims {
        match self.get_token(request.headers()) {
            TokenLookup::Found(token) => self.decode(request, &token),
            TokenLookup::Absent | TokenLookup::Malformed => Claims::new(),
        }
    }
}

/// Split an `Authorization` value into `(scheme, credentials)`.
fn parse_authorization(value: &HeaderValue) -> Option<(&str, &str)> {
    let value = value.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if scheme.is_empty() || token.is_empty() {
        return None;
    }
    Some((scheme, token))
}

/// Principal asserted by `claims`.
pub fn principal_of(claims: &Claims) -> Option<String> {
    match claims.get("sub")? {
        Value::String(sub) => Some(sub.clone()),
        Value::Number(sub) => Some(sub.to_string()),
        _ => None,
    }
}
