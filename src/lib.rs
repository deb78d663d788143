pub mod api;
pub mod auth;
pub mod cli;
pub mod jwt;
pub mod policy;

use api::create_api_router;
use auth::apply_reissue_cookie;
use axum::{Router, middleware};
use policy::JwtPolicy;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;

/// Create the application router for the given policy.
///
/// Every route runs inside [`apply_reissue_cookie`], so cookie tokens are
/// reissued transparently.
pub fn create_app(policy: Arc<JwtPolicy>) -> Router {
    create_api_router(policy)
        .layer(ServiceBuilder::new().layer(middleware::from_fn(apply_reissue_cookie)))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(
    policy: Arc<JwtPolicy>,
    listener: TcpListener,
) -> Result<(), std::io::Error> {
    let app = create_app(policy);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
