//! Cookie parsing and `Set-Cookie` rendering for the cookie transport.

use std::borrow::Cow;
use std::str::FromStr;

use axum::http::{HeaderMap, HeaderName, HeaderValue, header};
use chrono::{DateTime, Utc};

use super::errors::{ConfigError, TransportError};

/// Cookie name used when none is configured.
pub const DEFAULT_COOKIE_NAME: &str = "Authorization";

const EXPIRED: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// Extract a cookie value from the Cookie header(s).
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    for cookie_header in headers.get_all(header::COOKIE) {
        let Ok(cookie_header) = cookie_header.to_str() else {
            continue;
        };
        for part in cookie_header.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                if key.trim() == name {
                    return Some(value.trim());
                }
            }
        }
    }
    None
}

/// Cookie value with surrounding quotes and escapes removed.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<Cow<'a, str>> {
    get_cookie(headers, name).map(unquote)
}

fn is_cookie_octet(c: char) -> bool {
    matches!(c, '\x21' | '\x23'..='\x2b' | '\x2d'..='\x3a' | '\x3c'..='\x5b' | '\x5d'..='\x7e')
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

/// Quote a value that contains characters a bare cookie value may not.
fn quote(value: &str) -> Cow<'_, str> {
    if value.chars().all(is_cookie_octet) {
        return Cow::Borrowed(value);
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

fn unquote(value: &str) -> Cow<'_, str> {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return Cow::Borrowed(value);
    };
    let mut unquoted = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                unquoted.push(escaped);
            }
        } else {
            unquoted.push(c);
        }
    }
    Cow::Owned(unquoted)
}

/// SameSite cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

impl FromStr for SameSite {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(SameSite::Strict),
            "lax" => Ok(SameSite::Lax),
            "none" => Ok(SameSite::None),
            _ => Err(ConfigError::InvalidSameSite(s.to_string())),
        }
    }
}

/// Where the `Domain` attribute comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CookieDomain {
    /// The host the request was addressed to
    #[default]
    RequestHost,
    /// No `Domain` attribute; the browser scopes the cookie to the exact host
    HostOnly,
    /// One cookie per listed domain
    Fixed(Vec<String>),
}

/// Static cookie attributes of the transport.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    name: String,
    secure: bool,
    same_site: Option<SameSite>,
    path: String,
    domain: CookieDomain,
}

impl CookieSettings {
    pub fn new(
        name: &str,
        secure: bool,
        same_site: Option<SameSite>,
        path: &str,
        domain: CookieDomain,
    ) -> Result<Self, ConfigError> {
        if name.is_empty() || !name.chars().all(is_token_char) {
            return Err(ConfigError::InvalidCookieName(name.to_string()));
        }
        if path.chars().any(|c| c == ';' || c.is_control()) {
            return Err(ConfigError::InvalidCookiePath(path.to_string()));
        }
        let path = if path.is_empty() { "/" } else { path };
        Ok(Self {
            name: name.to_string(),
            secure,
            same_site,
            path: path.to_string(),
            domain,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn same_site(&self) -> Option<SameSite> {
        self.same_site
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn domain(&self) -> &CookieDomain {
        &self.domain
    }

    /// Domains to emit a cookie for; `None` entries carry no `Domain` attribute.
    pub fn resolve_domains(
        &self,
        request_domain: Option<&str>,
        explicit: Option<&[String]>,
    ) -> Vec<Option<String>> {
        if let Some(domains) = explicit {
            return domains.iter().cloned().map(Some).collect();
        }
        match &self.domain {
            CookieDomain::RequestHost => vec![request_domain.map(str::to_string)],
            CookieDomain::HostOnly => vec![None],
            CookieDomain::Fixed(domains) => domains.iter().cloned().map(Some).collect(),
        }
    }

    /// `Set-Cookie` headers carrying `value`, one per domain.
    ///
    /// `None` as value renders a clearing cookie that expires immediately.
    /// `Expires` is only written when `now` is known.
    pub fn set_cookie_headers(
        &self,
        value: Option<&str>,
        domains: &[Option<String>],
        max_age: Option<u64>,
        now: Option<u64>,
    ) -> Result<Vec<(HeaderName, HeaderValue)>, TransportError> {
        let (value, max_age, expires) = match value {
            Some(value) => {
                let expires = max_age
                    .zip(now)
                    .and_then(|(age, now)| http_date(now.saturating_add(age)));
                (quote(value), max_age, expires)
            }
            None => (Cow::Borrowed(""), Some(0), Some(EXPIRED.to_string())),
        };

        domains
            .iter()
            .map(|domain| {
                let mut cookie = format!("{}={}; Path={}", self.name, value, self.path);
                if let Some(domain) = domain {
                    cookie.push_str(&format!("; Domain={}", domain));
                }
                if let Some(max_age) = max_age {
                    cookie.push_str(&format!("; Max-Age={}", max_age));
                }
                if let Some(expires) = &expires {
                    cookie.push_str(&format!("; Expires={}", expires));
                }
                cookie.push_str("; HttpOnly");
                if let Some(same_site) = self.same_site {
                    cookie.push_str(&format!("; SameSite={}", same_site.as_str()));
                }
                if self.secure {
                    cookie.push_str("; Secure");
                }
                HeaderValue::from_str(&cookie)
                    .map(|v| (header::SET_COOKIE, v))
                    .map_err(|_| TransportError::InvalidCookieValue)
            })
            .collect()
    }
}

fn http_date(secs: u64) -> Option<String> {
    let secs = i64::try_from(secs).ok()?;
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
}
