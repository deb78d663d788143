//! The authentication policy: one token core composed with a transport.
//!
//! ```ignore
//! let policy = JwtPolicy::builder(secret)
//!     .expiration(Duration::from_secs(3600))
//!     .cookie(CookieOptions::default().reissue_time(Duration::from_secs(600)))
//!     .build()?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, header};
use jsonwebtoken::Algorithm;

use crate::auth::{
    AuthRequest, BoxError, ConfigError, CookieDomain, CookieSettings, CookieTransport,
    DEFAULT_COOKIE_NAME, HeaderPolicy, ReissueCallback, ReissueCoordinator, SameSite,
    TokenAuthenticator, TokenLookup, TransportError, principal_of,
};
use crate::jwt::{
    ClaimSerializer, Claims, Clock, DEFAULT_ALGORITHM, JsonClaims, JwtError, SystemClock,
    TokenCodec, is_symmetric,
};

/// Principal every request has.
pub const EVERYONE: &str = "system.Everyone";

/// Principal of every authenticated request.
pub const AUTHENTICATED: &str = "system.Authenticated";

/// Maps an authenticated principal to its groups; `None` rejects the principal.
pub type GroupFinder = Arc<dyn Fn(&str, &Claims) -> Option<Vec<String>> + Send + Sync>;

/// Where tokens travel between client and server.
#[derive(Debug, Clone)]
pub enum Transport {
    /// Request header only; clients store the token themselves
    Header,
    Cookie(CookieTransport),
}

/// Per-call overrides for [`JwtPolicy::remember`].
#[derive(Debug, Clone, Default)]
pub struct RememberOptions {
    /// Emit one cookie per domain instead of the configured domain
    pub domains: Option<Vec<String>>,
    /// Override the `Max-Age` derived from the policy expiration
    pub max_age: Option<Duration>,
}

/// Issues, verifies and transports tokens. Immutable once built; share it behind an `Arc`.
#[derive(Clone)]
pub struct JwtPolicy {
    authenticator: TokenAuthenticator,
    transport: Transport,
    groupfinder: Option<GroupFinder>,
}

impl std::fmt::Debug for JwtPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtPolicy")
            .field("authenticator", &self.authenticator)
            .field("transport", &self.transport)
            .field("groupfinder", &self.groupfinder.is_some())
            .finish()
    }
}

impl JwtPolicy {
    pub fn builder(private_key: impl Into<Vec<u8>>) -> PolicyBuilder {
        PolicyBuilder::new(private_key.into())
    }

    pub fn authenticator(&self) -> &TokenAuthenticator {
        &self.authenticator
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn now(&self) -> Result<u64, JwtError> {
        self.authenticator.now()
    }

    /// Wrap a header-transport policy in a cookie transport.
    ///
    /// Fails for a policy that already carries tokens in a cookie.
    pub fn with_cookie_transport(self, options: CookieOptions) -> Result<Self, ConfigError> {
        if !matches!(self.transport, Transport::Header) {
            return Err(ConfigError::IncompatibleBase);
        }
        Ok(Self {
            transport: Transport::Cookie(options.into_transport()?),
            ..self
        })
    }

    /// Mint a token for `principal`. See [`TokenAuthenticator::create_token`].
    pub fn create_token(
        &self,
        principal: &str,
        expiration: Option<Duration>,
        audience: Option<&str>,
        extra: Claims,
    ) -> Result<String, JwtError> {
        self.authenticator
            .create_token(principal, expiration, audience, extra)
    }

    pub fn get_token(&self, request: &mut AuthRequest<'_>) -> TokenLookup {
        match &self.transport {
            Transport::Header => self.authenticator.get_token(request.headers()),
            Transport::Cookie(cookie) => cookie.get_token(self, request),
        }
    }

    /// Verified claims of the request's token; empty when anonymous.
    pub fn get_claims(&self, request: &mut AuthRequest<'_>) -> Claims {
        match self.get_token(request) {
            TokenLookup::Found(token) => self.decode_cached(request, &token),
            TokenLookup::Absent | TokenLookup::Malformed => Claims::new(),
        }
    }

    /// Decode `token` once per request.
    pub(crate) fn decode_cached(&self, request: &mut AuthRequest<'_>, token: &str) -> Claims {
        if let Some(claims) = request.scope().cached_claims(token) {
            return claims.clone();
        }
        let claims = self.authenticator.decode(request, token);
        request.scope_mut().cache_claims(token, claims.clone());
        claims
    }

    /// The `sub` claim, without consulting the group finder.
    pub fn resolve_principal(&self, request: &mut AuthRequest<'_>) -> Option<String> {
        principal_of(&self.get_claims(request))
    }

    /// The principal, if the group finder (when configured) accepts it.
    pub fn authenticated_principal(&self, request: &mut AuthRequest<'_>) -> Option<String> {
        let claims = self.get_claims(request);
        self.authenticate(&claims).map(|(principal, _)| principal)
    }

    /// [`EVERYONE`], plus [`AUTHENTICATED`], the principal and its groups when authenticated.
    pub fn effective_principals(&self, request: &mut AuthRequest<'_>) -> Vec<String> {
        let mut principals = vec![EVERYONE.to_string()];
        let claims = self.get_claims(request);
        if let Some((principal, groups)) = self.authenticate(&claims) {
            principals.push(AUTHENTICATED.to_string());
            principals.push(principal);
            principals.extend(groups);
        }
        principals
    }

    fn authenticate(&self, claims: &Claims) -> Option<(String, Vec<String>)> {
        let principal = principal_of(claims)?;
        if principal == EVERYONE || principal == AUTHENTICATED {
            return None;
        }
        match &self.groupfinder {
            Some(groupfinder) => groupfinder(&principal, claims).map(|groups| (principal, groups)),
            None => Some((principal, Vec::new())),
        }
    }

    /// Headers that make the client store `token`.
    pub fn remember(
        &self,
        request: &mut AuthRequest<'_>,
        token: &str,
        options: RememberOptions,
    ) -> Result<Vec<(HeaderName, HeaderValue)>, TransportError> {
        match &self.transport {
            Transport::Header => Err(TransportError::Unsupported),
            Transport::Cookie(cookie) => cookie.remember(self, request, token, options),
        }
    }

    /// Headers that make the client drop its token.
    pub fn forget(
        &self,
        request: &mut AuthRequest<'_>,
    ) -> Result<Vec<(HeaderName, HeaderValue)>, TransportError> {
        match &self.transport {
            Transport::Header => Err(TransportError::Unsupported),
            Transport::Cookie(cookie) => cookie.forget(request),
        }
    }
}

/// Cookie transport configuration.
#[derive(Clone)]
pub struct CookieOptions {
    name: String,
    https_only: bool,
    same_site: Option<SameSite>,
    path: String,
    domain: CookieDomain,
    reissue_time: Option<Duration>,
    accept_header: bool,
    header_first: bool,
    reissue_callback: Option<ReissueCallback>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: DEFAULT_COOKIE_NAME.to_string(),
            https_only: true,
            same_site: None,
            path: "/".to_string(),
            domain: CookieDomain::RequestHost,
            reissue_time: None,
            accept_header: false,
            header_first: false,
            reissue_callback: None,
        }
    }
}

impl CookieOptions {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Mark the cookie `Secure`.
    pub fn https_only(mut self, https_only: bool) -> Self {
        self.https_only = https_only;
        self
    }

    pub fn same_site(mut self, same_site: Option<SameSite>) -> Self {
        self.same_site = same_site;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn domain(mut self, domain: CookieDomain) -> Self {
        self.domain = domain;
        self
    }

    /// Reissue cookie tokens once they are at least this old.
    pub fn reissue_time(mut self, reissue_time: Duration) -> Self {
        self.reissue_time = Some(reissue_time);
        self
    }

    /// Also accept tokens from the header when no cookie is sent.
    pub fn accept_header(mut self, accept_header: bool) -> Self {
        self.accept_header = accept_header;
        self
    }

    /// With `accept_header`, prefer the header over the cookie.
    pub fn header_first(mut self, header_first: bool) -> Self {
        self.header_first = header_first;
        self
    }

    /// Replace the default reissue, which re-mints the token with the same claims.
    pub fn reissue_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&JwtPolicy, &mut AuthRequest<'_>, &str, &Claims) -> Result<Option<String>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.reissue_callback = Some(Arc::new(callback));
        self
    }

    fn into_transport(self) -> Result<CookieTransport, ConfigError> {
        let settings = CookieSettings::new(
            &self.name,
            self.https_only,
            self.same_site,
            &self.path,
            self.domain,
        )?;
        let reissue = self
            .reissue_time
            .map(|threshold| ReissueCoordinator::new(threshold, self.reissue_callback));
        Ok(CookieTransport::new(
            settings,
            HeaderPolicy::from_flags(self.accept_header, self.header_first),
            reissue,
        ))
    }
}

/// Builder for [`JwtPolicy`].
pub struct PolicyBuilder {
    private_key: Vec<u8>,
    public_key: Option<Vec<u8>>,
    algorithm: Algorithm,
    leeway: Duration,
    expiration: Option<Duration>,
    audience: Option<String>,
    default_claims: Claims,
    header_name: String,
    scheme: Option<String>,
    serializer: Arc<dyn ClaimSerializer>,
    clock: Arc<dyn Clock>,
    groupfinder: Option<GroupFinder>,
    cookie: Option<CookieOptions>,
}

impl PolicyBuilder {
    fn new(private_key: Vec<u8>) -> Self {
        Self {
            private_key,
            public_key: None,
            algorithm: DEFAULT_ALGORITHM,
            leeway: Duration::ZERO,
            expiration: None,
            audience: None,
            default_claims: Claims::new(),
            header_name: header::AUTHORIZATION.as_str().to_string(),
            scheme: None,
            serializer: Arc::new(JsonClaims),
            clock: Arc::new(SystemClock),
            groupfinder: None,
            cookie: None,
        }
    }

    /// Verification key for asymmetric algorithms; ignored for `HS*`.
    pub fn public_key(mut self, public_key: impl Into<Vec<u8>>) -> Self {
        self.public_key = Some(public_key.into());
        self
    }

    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Claims added to every token, below caller-supplied claims.
    pub fn default_claims(mut self, claims: Claims) -> Self {
        self.default_claims = claims;
        self
    }

    pub fn header_name(mut self, header_name: impl Into<String>) -> Self {
        self.header_name = header_name.into();
        self
    }

    /// Scheme expected in the `Authorization` header (default `JWT`).
    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn claim_serializer(mut self, serializer: Arc<dyn ClaimSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn groupfinder<F>(mut self, groupfinder: F) -> Self
    where
        F: Fn(&str, &Claims) -> Option<Vec<String>> + Send + Sync + 'static,
    {
        self.groupfinder = Some(Arc::new(groupfinder));
        self
    }

    /// Carry tokens in a cookie instead of the header.
    pub fn cookie(mut self, options: CookieOptions) -> Self {
        self.cookie = Some(options);
        self
    }

    pub fn build(self) -> Result<JwtPolicy, ConfigError> {
        let public_key = if is_symmetric(self.algorithm) {
            None
        } else {
            self.public_key.as_deref()
        };
        let codec = TokenCodec::new(self.algorithm, &self.private_key, public_key)?
            .with_leeway(self.leeway)
            .with_audience(self.audience)
            .with_serializer(self.serializer);

        let header_name = HeaderName::from_bytes(self.header_name.as_bytes())
            .map_err(|_| ConfigError::InvalidHeaderName(self.header_name.clone()))?;

        let authenticator = TokenAuthenticator::new(
            codec,
            header_name,
            self.scheme,
            self.expiration,
            self.default_claims,
            self.clock,
        );

        let transport = match self.cookie {
            Some(options) => Transport::Cookie(options.into_transport()?),
            None => Transport::Header,
        };

        Ok(JwtPolicy {
            authenticator,
            transport,
            groupfinder: self.groupfinder,
        })
    }
}
