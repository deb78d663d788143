#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Request, header},
};
use cookiejwt::jwt::ManualClock;
use cookiejwt::policy::{CookieOptions, JwtPolicy, PolicyBuilder};

pub const SECRET: &[u8] = b"test-jwt-secret-for-testing-purposes";
pub const NOW: u64 = 1_700_000_000;
pub const HOST: &str = "example.com";

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(NOW))
}

/// Builder with the test secret, a 100 second expiration and `clock`.
pub fn builder(clock: &Arc<ManualClock>) -> PolicyBuilder {
    JwtPolicy::builder(SECRET)
        .expiration(Duration::from_secs(100))
        .clock(clock.clone())
}

pub fn cookie_policy(clock: &Arc<ManualClock>, options: CookieOptions) -> Arc<JwtPolicy> {
    Arc::new(builder(clock).cookie(options).build().unwrap())
}

pub fn header_policy(clock: &Arc<ManualClock>) -> Arc<JwtPolicy> {
    Arc::new(builder(clock).build().unwrap())
}

pub fn new_principal() -> String {
    format!("user-{}", uuid::Uuid::new_v4())
}

/// Request with optional `Cookie` and `Authorization` headers.
pub fn request(
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    authorization: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("host", HOST);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    if let Some(authorization) = authorization {
        builder = builder.header("authorization", authorization);
    }
    builder.body(Body::empty()).unwrap()
}

/// Header map for driving the policy without a router.
pub fn headers(cookie: Option<&str>, authorization: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::HOST, HeaderValue::from_static(HOST));
    if let Some(cookie) = cookie {
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
    }
    if let Some(authorization) = authorization {
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(authorization).unwrap(),
        );
    }
    headers
}

/// Extract Set-Cookie headers from response
pub fn extract_set_cookies(response: &axum::http::Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .collect()
}

/// Token carried by a Set-Cookie value for `name`, if it is not a clearing cookie.
pub fn cookie_token(set_cookie: &str, name: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?;
    let value = pair.strip_prefix(name)?.strip_prefix('=')?;
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub async fn json_body(response: axum::http::Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
