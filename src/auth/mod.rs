//! Token transports and request plumbing.
//!
//! A token is read from the `Authorization` header or from a cookie. Cookie
//! tokens may be reissued when they get old; the replacement cookie is
//! attached to the response by [`apply_reissue_cookie`].

mod authenticator;
mod cookie;
mod errors;
mod extractors;
mod reissue;
mod request;
mod state;
mod transport;

pub use authenticator::{DEFAULT_SCHEME, TokenAuthenticator, TokenLookup, principal_of};
pub use cookie::{
    CookieDomain, CookieSettings, DEFAULT_COOKIE_NAME, SameSite, cookie_value, get_cookie,
};
pub use errors::{AuthRejection, BoxError, ConfigError, ReissueError, TransportError};
pub use extractors::{
    Authenticated, AuthenticatedPrincipal, JwtClaims, JwtToken, MaybeAuthenticated,
    REQUEST_SCOPE, apply_reissue_cookie, with_auth_request,
};
pub use reissue::{
    PendingCookie, ReissueCallback, ReissueCoordinator, ReissueOutcome, ReissueState,
    RequestScope,
};
pub use request::{AuthRequest, client_addr};
pub use state::HasJwtPolicy;
pub use transport::{CookieTransport, HeaderPolicy};
