use axum::{
    Router,
    extract::{Request, State},
    http::{HeaderValue, Method, header, header::InvalidHeaderValue},
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::db::services::PingResultStore;

pub mod error;
pub mod routes;

pub use error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub store: PingResultStore,
}

/// Only `allowed_origin` may call the API from a browser.
pub fn cors_layer(allowed_origin: &str) -> Result<CorsLayer, InvalidHeaderValue> {
    Ok(CorsLayer::new()
        .allow_origin(HeaderValue::from_str(allowed_origin)?)
        .allow_methods(vec![Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(vec![header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT]))
}

#[derive(Clone)]
struct OriginPolicy {
    allowed: HeaderValue,
}

/// Requests carrying an `Origin` other than the configured one get 403.
/// Requests without an `Origin` header (non-browser clients) pass through.
async fn reject_unlisted_origin(
    State(policy): State<OriginPolicy>,
    req: Request,
    next: Next,
) -> Response {
    match req.headers().get(header::ORIGIN) {
        Some(origin) if origin != &policy.allowed => {
            AppError::Forbidden("Origin not allowed".to_string()).into_response()
        }
        _ => next.run(req).await,
    }
}

async fn health_check_handler() -> &'static str {
    "OK"
}

async fn not_found_handler() -> AppError {
    AppError::NotFound("No such route".to_string())
}

pub fn create_axum_router(
    store: PingResultStore,
    allowed_origin: &str,
) -> Result<Router, InvalidHeaderValue> {
    let app_state = Arc::new(AppState { store });
    let origin_policy = OriginPolicy {
        allowed: HeaderValue::from_str(allowed_origin)?,
    };

    // The origin check is the outer layer, so unlisted origins never reach CORS or handlers.
    Ok(Router::new()
        .route("/api/health", get(health_check_handler))
        .merge(routes::ping_routes::ping_router())
        .fallback(not_found_handler)
        .with_state(app_state)
        .layer(cors_layer(allowed_origin)?)
        .layer(axum_middleware::from_fn_with_state(
            origin_policy,
            reject_unlisted_origin,
        )))
}
