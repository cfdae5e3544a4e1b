//! HTTP router and handlers

use std::sync::Arc;

use axum::{Extension, Json, Router, middleware, response::IntoResponse, routing::get};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::auth::{ResolvedAuthConfig, auth_middleware};
use crate::auth::AuthContext;

/// Create the router
///
/// `/health` is expected to be listed in the public paths; everything else
/// runs behind [`auth_middleware`].
pub fn create_router(auth_config: Arc<ResolvedAuthConfig>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/whoami", get(whoami_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(auth_config, auth_middleware)),
        )
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Echo the resolved identity back to the caller.
async fn whoami_handler(Extension(context): Extension<AuthContext>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "data": context,
    }))
}
