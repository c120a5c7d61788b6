//! Router

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use memorial_core::MAX_PHOTO_BYTES;

use crate::handlers::{
    code_finalize, code_save, code_view, create_checkout, get_memorial, health_check,
    local_photo, session_finalize, session_save, session_view, stripe_webhook, todays_memorials,
    verify_checkout,
};
use crate::state::AppState;

/// Room for the photo plus the text fields of the details form
const MAX_FORM_BYTES: usize = MAX_PHOTO_BYTES + 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let static_files = ServeDir::new(&state.config.static_dir);

    Router::new()
        // Health & listing
        .route("/health", get(health_check))
        .route("/api/memorials/today", get(todays_memorials))
        .route("/api/memorials/{id}", get(get_memorial))
        // Payments
        .route("/api/checkout", post(create_checkout))
        .route("/api/checkout/verify", get(verify_checkout))
        .route("/webhook/stripe", post(stripe_webhook))
        // Editing right after payment
        .route("/api/sessions/{session_id}", get(session_view))
        .route("/api/sessions/{session_id}/memorial", post(session_save))
        .route("/api/sessions/{session_id}/finalize", post(session_finalize))
        // Editing by code
        .route("/api/edit/{code}", get(code_view))
        .route("/api/edit/{code}/memorial", post(code_save))
        .route("/api/edit/{code}/finalize", post(code_finalize))
        // Photos when running on the in-memory bucket
        .route("/storage/v1/object/public/{*photo_path}", get(local_photo))
        // Presentation layer
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(MAX_FORM_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
