mod error;
mod session;

use axum::Router;
use std::sync::Arc;

use crate::policy::JwtPolicy;

pub use error::ApiError;
pub use session::SessionState;

/// Create the API router.
pub fn create_api_router(policy: Arc<JwtPolicy>) -> Router {
    session::router(session::SessionState { policy })
}
