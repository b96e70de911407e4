//! Axum REST API handlers

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    extract::{ConnectInfo, DefaultBodyLimit, Multipart, State},
    extract::multipart::{MultipartError, MultipartRejection},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::Json,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::limiter::RateLimiter;
use crate::service::FaceService;

use super::client::resolve_client_identity;
use super::dto::*;

/// Multipart field carrying the image
pub const FILE_FIELD: &str = "file";

/// Room for boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Application state shared across handlers
pub struct AppState<L: RateLimiter> {
    pub service: Arc<FaceService>,
    pub limiter: Arc<L>,
    pub service_name: String,
    pub trusted_ip_header: Option<String>,
    pub max_upload_bytes: usize,
}

/// Create the REST API router
pub fn create_rest_router<L: RateLimiter>(state: Arc<AppState<L>>, cors_origins: &[String]) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        .route("/health", get(health_handler::<L>))
        .route("/detect-face", post(detect_face_handler::<L>))
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS for the configured origins; an empty list allows any origin
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {:?}", origin);
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(allowed))
}

fn reject(status: StatusCode, error: &str, code: &str) -> ApiError {
    (status, Json(ErrorResponse::new(error, code)))
}

/// Map a multipart failure, keeping the 413 axum raises past the body limit
fn multipart_error(e: MultipartError, code: &str) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return reject(StatusCode::PAYLOAD_TOO_LARGE, &e.body_text(), "PAYLOAD_TOO_LARGE");
    }
    reject(StatusCode::BAD_REQUEST, &e.body_text(), code)
}

/// Health check
async fn health_handler<L: RateLimiter>(
    State(state): State<Arc<AppState<L>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: state.service_name.clone(),
    })
}

/// Locate the largest face in an uploaded image
async fn detect_face_handler<L: RateLimiter>(
    State(state): State<Arc<AppState<L>>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<FaceResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let client_id = resolve_client_identity(
        &headers,
        state.trusted_ip_header.as_deref(),
        peer.map(|ConnectInfo(addr)| addr),
    );

    // Admission runs before anything in the body is looked at
    if !state.limiter.admit(&client_id, std::time::Instant::now()).await {
        return Err(reject(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded, try again later",
            "RATE_LIMITED",
        ));
    }

    let mut multipart = multipart.map_err(|e| {
        reject(StatusCode::BAD_REQUEST, &e.body_text(), "MULTIPART_ERROR")
    })?;

    let mut image_data: Option<Vec<u8>> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "MULTIPART_ERROR"))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let content_type = field.content_type().map(str::to_ascii_lowercase);
        if !content_type.as_deref().is_some_and(|ct| ct.starts_with("image/")) {
            return Err(reject(
                StatusCode::BAD_REQUEST,
                &format!(
                    "Invalid file type: {}. Expected image/*",
                    content_type.as_deref().unwrap_or("none")
                ),
                "INVALID_CONTENT_TYPE",
            ));
        }

        // Stop reading as soon as the upload passes the ceiling
        let mut data = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error(e, "READ_ERROR"))?
        {
            if data.len() + chunk.len() > state.max_upload_bytes {
                return Err(reject(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    &format!("File exceeds the {} byte limit", state.max_upload_bytes),
                    "PAYLOAD_TOO_LARGE",
                ));
            }
            data.extend_from_slice(&chunk);
        }

        image_data = Some(data);
        break;
    }

    let image_data = image_data.ok_or_else(|| {
        reject(StatusCode::BAD_REQUEST, "Missing file field", "MISSING_FILE")
    })?;

    let size = image_data.len();
    let located = state.service.locate(image_data).await;

    info!(
        %request_id,
        client = %client_id,
        bytes = size,
        success = located.is_success(),
        elapsed_ms = located.inference_time_ms,
        "detect-face"
    );

    Ok(Json(match located.result.face() {
        Some(face) => FaceResponse::found(face),
        None => FaceResponse::no_face(),
    }))
}
