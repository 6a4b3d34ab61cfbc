pub mod routes;

use crate::state::VerifyServiceState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Largest accepted request body (document photos and base64 frames)
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Where a client goes after enrolling
pub const VERIFY_PAGE_PATH: &str = "/verify_page";

/// Where a client goes after a passed verification
pub const SUCCESS_PAGE_PATH: &str = "/success";

/// Build the API router
pub fn router(state: VerifyServiceState) -> Router {
    Router::new()
        // Pages
        .route("/", get(routes::index))
        .route(VERIFY_PAGE_PATH, get(routes::verify_page))
        .route(SUCCESS_PAGE_PATH, get(routes::success_page))
        // Enrollment and verification
        .route("/upload_ic", post(routes::upload_ic))
        .route("/process_frame", post(routes::process_frame))
        // Health and metrics endpoints
        .route("/health", get(routes::health).options(routes::health))
        .route("/metrics", get(routes::metrics))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        // Browser and mobile clients call from any origin
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
