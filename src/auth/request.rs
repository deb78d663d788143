//! The request as seen by the policy: headers, client address and request scope.

use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, header, request::Parts},
};

use super::reissue::RequestScope;

/// One in-flight request.
///
/// Borrows the request headers and the [`RequestScope`] that lives for the
/// duration of the request; every policy call for the request goes through
/// the same value so cached claims and reissue flags are shared.
pub struct AuthRequest<'a> {
    headers: &'a HeaderMap,
    remote_addr: Option<String>,
    scope: &'a mut RequestScope,
}

impl<'a> AuthRequest<'a> {
    pub fn new(headers: &'a HeaderMap, scope: &'a mut RequestScope) -> Self {
        Self {
            headers,
            remote_addr: None,
            scope,
        }
    }

    pub fn with_remote_addr(mut self, remote_addr: Option<String>) -> Self {
        self.remote_addr = remote_addr;
        self
    }

    pub fn headers(&self) -> &'a HeaderMap {
        self.headers
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.remote_addr.as_deref()
    }

    pub fn scope(&self) -> &RequestScope {
        &*self.scope
    }

    pub fn scope_mut(&mut self) -> &mut RequestScope {
        &mut *self.scope
    }

    /// Host the request was addressed to, without the port.
    pub fn domain(&self) -> Option<&'a str> {
        let host = self.headers.get(header::HOST)?.to_str().ok()?.trim();
        let domain = if host.starts_with('[') {
            host.split_inclusive(']').next()?
        } else {
            host.split(':').next()?
        };
        if domain.is_empty() {
            None
        } else {
            Some(domain)
        }
    }
}

/// Client address from the connection info, when the server was started with it.
pub fn client_addr(parts: &Parts) -> Option<String> {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}
