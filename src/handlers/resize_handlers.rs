//! The resize endpoint.
//!
//! Every request runs Parse -> Fetch -> Decode -> Resize -> Encode -> Respond
//! in order. The first failing stage decides the status; nothing is retried
//! here and nothing is cached between requests.

use crate::{
    errors::AppError,
    models::resize_request::ResizeRequest,
    services::{
        image_service::{self, EncodedImage},
        storage_service::fetch_object,
    },
    state::AppState,
};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::Response,
};
use tokio::time::timeout;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

const CACHE_CONTROL: &str = "max-age=86400, public";

/// `GET /{width}[x{height}]/{bucket}/{key...}`
pub async fn resize_image(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let path = uri.path().to_string();
    let span = info_span!("resize", request_id = %Uuid::new_v4(), path = %path);

    async move {
        info!("request received");
        let result = run_pipeline(&state, &path, &headers).await;
        if let Err(err) = &result {
            if err.is_server_error() {
                error!(status = err.status.as_u16(), error = %err, "resize failed");
            } else {
                warn!(status = err.status.as_u16(), error = %err, "resize rejected");
            }
        }
        result
    }
    .instrument(span)
    .await
}

async fn run_pipeline(
    state: &AppState,
    path: &str,
    headers: &HeaderMap,
) -> Result<Response, AppError> {
    let req = ResizeRequest::from_path(path)?;

    let raw = timeout(
        state.timeouts.fetch,
        fetch_object(state.store.as_ref(), &req.bucket, &req.key),
    )
    .await
    .map_err(|_| AppError::timeout("fetch"))??;

    // Image work is CPU-bound; keep it off the async workers. A timed-out
    // job still runs to completion on the blocking pool.
    let (width, height) = (req.width, req.height);
    let job = tokio::task::spawn_blocking(move || image_service::transform(&raw, width, height));
    let encoded = timeout(state.timeouts.transform, job)
        .await
        .map_err(|_| AppError::timeout("transform"))?
        .map_err(|err| AppError::internal(format!("transform task failed: {err}")))??;

    info!(
        bucket = %req.bucket,
        key = %req.key,
        width,
        height,
        bytes = encoded.bytes.len(),
        "delivering"
    );
    Ok(image_response(encoded, headers))
}

/// Build the reply for an encoded image.
///
/// Answers `304 Not Modified` without a body when the client already holds
/// this exact output.
pub fn image_response(encoded: EncodedImage, request_headers: &HeaderMap) -> Response {
    let EncodedImage { bytes, etag } = encoded;

    if etag_matches(request_headers, &etag) {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        set_cache_headers(response.headers_mut(), &etag);
        return response;
    }

    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = StatusCode::OK;
    set_image_headers(response.headers_mut(), &etag, length);
    response
}

fn set_image_headers(headers: &mut HeaderMap, etag: &str, length: usize) {
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    set_cache_headers(headers, etag);
}

fn set_cache_headers(headers: &mut HeaderMap, etag: &str) {
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    if let Ok(value) = HeaderValue::from_str(etag) {
        headers.insert(header::ETAG, value);
    }
}

/// Weak comparison of `If-None-Match` against `etag`.
fn etag_matches(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate.trim_start_matches("W/") == etag)
}
