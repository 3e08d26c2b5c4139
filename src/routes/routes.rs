//! Defines the HTTP surface.
//!
//! ## Structure
//! - `GET /healthz` — liveness
//! - `GET /{width}[x{height}]/{bucket}/{*key}` — resized JPEG
//!
//! Every other GET path also reaches the resize handler, which answers
//! with a diagnostic when the path is too short to name an object.

use crate::{
    handlers::{health_handlers::healthz, resize_handlers::resize_image},
    state::AppState,
};
use axum::{Router, routing::get};

/// Build and return the router.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/", get(resize_image))
        .route("/{*path}", get(resize_image))
}
