//! Tests for header token extraction and header/cookie precedence.
//!
//! Tests cover:
//! - Header transport: Authorization scheme, custom header names
//! - Token expiry against an injected clock
//! - Header transport has no cookies to remember or forget
//! - accept_header / header_first precedence with a cookie transport
//! - Malformed Authorization header alongside a cookie

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use common::{
    NOW, builder, clock, cookie_policy, extract_set_cookies, header_policy, headers, json_body,
    new_principal, request,
};
use cookiejwt::auth::{AuthRequest, RequestScope, TokenLookup};
use cookiejwt::create_app;
use cookiejwt::jwt::Claims;
use cookiejwt::policy::CookieOptions;
use tower::ServiceExt;

#[tokio::test]
async fn test_token_endpoint_and_header_authentication() {
    let clock = clock();
    let app = create_app(header_policy(&clock));
    let principal = new_principal();

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/token?principal={}", principal),
            None,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(extract_set_cookies(&response).is_empty());
    let json = json_body(response).await;
    let token = json["token"].as_str().unwrap().to_string();

    let response = app
        .oneshot(request(
            "GET",
            "/whoami",
            None,
            Some(&format!("JWT {}", token)),
        ))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["principal"], principal.as_str());
    assert_eq!(json["claims"]["iat"], NOW);
    assert_eq!(json["claims"]["exp"], NOW + 100);
}

#[tokio::test]
async fn test_other_scheme_is_anonymous() {
    let clock = clock();
    let policy = header_policy(&clock);
    let token = policy
        .create_token("alice", None, None, Claims::new())
        .unwrap();
    let app = create_app(policy);

    let response = app
        .oneshot(request(
            "GET",
            "/me",
            None,
            Some(&format!("Bearer {}", token)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_custom_scheme() {
    let clock = clock();
    let policy = Arc::new(builder(&clock).scheme("Bearer").build().unwrap());
    let token = policy
        .create_token("alice", None, None, Claims::new())
        .unwrap();
    let app = create_app(policy);

    let response = app
        .oneshot(request(
            "GET",
            "/me",
            None,
            Some(&format!("Bearer {}", token)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_custom_header_carries_raw_token() {
    let clock = clock();
    let policy = Arc::new(builder(&clock).header_name("X-Auth-Token").build().unwrap());
    let token = policy
        .create_token("alice", None, None, Claims::new())
        .unwrap();
    let app = create_app(policy);

    let response = app
        .oneshot(
            axum::http::Request::builder()
                .uri("/whoami")
                .header("x-auth-token", &token)
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["principal"], "alice");
}

#[tokio::test]
async fn test_expired_header_token() {
    let clock = clock();
    let policy = header_policy(&clock);
    let token = policy
        .create_token("alice", Some(Duration::from_secs(1)), None, Claims::new())
        .unwrap();
    let app = create_app(policy);

    let response = app
        .clone()
        .oneshot(request("GET", "/me", None, Some(&format!("JWT {}", token))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    clock.advance(Duration::from_secs(2));

    let response = app
        .oneshot(request(
            "GET",
            "/whoami",
            None,
            Some(&format!("JWT {}", token)),
        ))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert!(json["principal"].is_null());
    assert_eq!(json["claims"], serde_json::json!({}));
}

#[tokio::test]
async fn test_leeway_tolerates_skew() {
    let clock = clock();
    let policy = Arc::new(
        builder(&clock)
            .leeway(Duration::from_secs(5))
            .build()
            .unwrap(),
    );
    let token = policy
        .create_token("alice", Some(Duration::from_secs(1)), None, Claims::new())
        .unwrap();
    let app = create_app(policy);

    clock.advance(Duration::from_secs(3));
    let response = app
        .clone()
        .oneshot(request("GET", "/me", None, Some(&format!("JWT {}", token))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    clock.advance(Duration::from_secs(10));
    let response = app
        .oneshot(request("GET", "/me", None, Some(&format!("JWT {}", token))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_header_transport_login_and_logout_set_no_cookies() {
    let clock = clock();
    let app = create_app(header_policy(&clock));

    let response = app
        .clone()
        .oneshot(request("GET", "/login?principal=alice", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(extract_set_cookies(&response).is_empty());

    let response = app
        .oneshot(request("POST", "/logout", None, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(extract_set_cookies(&response).is_empty());
}

#[tokio::test]
async fn test_accept_header_falls_back_to_header() {
    let clock = clock();
    let policy = cookie_policy(&clock, CookieOptions::default().name("auth").accept_header(true));
    let token = policy
        .create_token("alice", None, None, Claims::new())
        .unwrap();
    let app = create_app(policy);

    let response = app
        .oneshot(request(
            "GET",
            "/whoami",
            None,
            Some(&format!("JWT {}", token)),
        ))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["principal"], "alice");
}

#[tokio::test]
async fn test_cookie_wins_over_header_by_default() {
    let clock = clock();
    let policy = cookie_policy(&clock, CookieOptions::default().name("auth").accept_header(true));
    let alice = policy
        .create_token("alice", None, None, Claims::new())
        .unwrap();
    let bob = policy.create_token("bob", None, None, Claims::new()).unwrap();
    let app = create_app(policy);

    let response = app
        .oneshot(request(
            "GET",
            "/whoami",
            Some(&format!("auth={}", bob)),
            Some(&format!("JWT {}", alice)),
        ))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["principal"], "bob");
}

#[tokio::test]
async fn test_header_first_prefers_header() {
    let clock = clock();
    let options = CookieOptions::default()
        .name("auth")
        .accept_header(true)
        .header_first(true);
    let policy = cookie_policy(&clock, options);
    let alice = policy
        .create_token("alice", None, None, Claims::new())
        .unwrap();
    let bob = policy.create_token("bob", None, None, Claims::new()).unwrap();
    let app = create_app(policy);

    let response = app
        .clone()
        .oneshot(request(
            "GET",
            "/whoami",
            Some(&format!("auth={}", bob)),
            Some(&format!("JWT {}", alice)),
        ))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["principal"], "alice");

    // No header token: the cookie still authenticates
    let response = app
        .oneshot(request(
            "GET",
            "/whoami",
            Some(&format!("auth={}", bob)),
            None,
        ))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["principal"], "bob");
}

#[test]
fn test_malformed_header_with_cookie() {
    let clock = clock();
    let options = CookieOptions::default()
        .name("auth")
        .accept_header(true)
        .header_first(true);
    let policy = cookie_policy(&clock, options);
    let bob = policy.create_token("bob", None, None, Claims::new()).unwrap();

    // Cookie wins over a malformed header
    let headers = headers(Some(&format!("auth={}", bob)), Some("JWT"));
    let mut scope = RequestScope::new();
    let mut request = AuthRequest::new(&headers, &mut scope);
    assert_eq!(policy.get_token(&mut request), TokenLookup::Found(bob));
    assert_eq!(policy.resolve_principal(&mut request).as_deref(), Some("bob"));

    // Without a cookie the malformed signal is returned
    let headers = common::headers(None, Some("JWT"));
    let mut scope = RequestScope::new();
    let mut request = AuthRequest::new(&headers, &mut scope);
    assert_eq!(policy.get_token(&mut request), TokenLookup::Malformed);
    assert!(policy.get_claims(&mut request).is_empty());
}

#[test]
fn test_header_transport_lookup_distinguishes_absent_and_malformed() {
    let clock = clock();
    let policy = header_policy(&clock);

    let headers = common::headers(None, None);
    let mut scope = RequestScope::new();
    let mut request = AuthRequest::new(&headers, &mut scope);
    assert_eq!(policy.get_token(&mut request), TokenLookup::Absent);

    let headers = common::headers(None, Some("JWT"));
    let mut scope = RequestScope::new();
    let mut request = AuthRequest::new(&headers, &mut scope);
    assert_eq!(policy.get_token(&mut request), TokenLookup::Malformed);
    assert_eq!(policy.resolve_principal(&mut request), None);
}
