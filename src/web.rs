//! HTTP API for the price tracker
//!
//! Read endpoints are public and served from the tracker's caches. Snapshot
//! upload is protected by HTTP basic auth and only enabled when credentials
//! are configured.

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::StoreError;
use crate::store::SqliteStore;
use crate::tracker::Tracker;

/// Largest accepted snapshot upload
pub const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Multipart field carrying the snapshot archive
const UPLOAD_FIELD: &str = "file";

/// Basic auth credentials for the upload endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

/// Server settings
#[derive(Debug, Clone, Default)]
pub struct WebConfig {
    /// Upload is disabled (503) without credentials
    pub credentials: Option<Credentials>,
    /// Origins allowed by CORS
    pub cors_origins: Vec<String>,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    tracker: Arc<Tracker<SqliteStore>>,
    credentials: Option<Arc<Credentials>>,
}

/// `{"error": ...}` response
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        log::error!("Database error: {}", err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
        });
        if self.status == StatusCode::UNAUTHORIZED {
            let challenge = [(header::WWW_AUTHENTICATE, "Basic realm=\"price_tracker\"")];
            return (self.status, challenge, body).into_response();
        }
        (self.status, body).into_response()
    }
}

/// Check an `Authorization: Basic ...` header against the credentials
fn is_authorized(headers: &HeaderMap, credentials: &Credentials) -> bool {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Some(decoded) = STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
    else {
        return false;
    };

    let Some((user, pass)) = decoded.split_once(':') else {
        return false;
    };
    // both fields are always compared
    let user_ok = constant_time_eq(user.as_bytes(), credentials.user.as_bytes());
    let pass_ok = constant_time_eq(pass.as_bytes(), credentials.pass.as_bytes());
    user_ok & pass_ok
}

/// Byte comparison whose running time depends only on the lengths
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// GET /api/products
async fn products_handler(State(state): State<AppState>) -> Result<Response, ApiError> {
    Ok(Json(state.tracker.list_products(None)?).into_response())
}

/// GET /api/category/{category}
async fn category_handler(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Response, ApiError> {
    Ok(Json(state.tracker.list_products(Some(&category))?).into_response())
}

/// GET /api/product/{id}
async fn product_handler(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Response, ApiError> {
    match state.tracker.product_detail(&product_id)? {
        Some(detail) => Ok(Json(&*detail).into_response()),
        None => Err(ApiError::new(StatusCode::NOT_FOUND, "Product not found")),
    }
}

/// GET /api/product/{id}/image
async fn image_handler(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Response, ApiError> {
    match state.tracker.product_image(&product_id)? {
        Some(bytes) => Ok((
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, "public, max-age=86400"),
            ],
            bytes,
        )
            .into_response()),
        None => Err(ApiError::new(StatusCode::NOT_FOUND, "Image not found")),
    }
}

/// Pull the snapshot archive out of the multipart form
async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
        let Some(field) = field else {
            return Err(ApiError::new(StatusCode::BAD_REQUEST, "No file uploaded"));
        };
        if field.name() == Some(UPLOAD_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
            return Ok(bytes.to_vec());
        }
    }
}

/// POST /api/products/ingest (basic auth, multipart field `file`)
async fn ingest_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let Some(credentials) = state.credentials.as_deref() else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Ingestion is not configured",
        ));
    };
    if !is_authorized(&headers, credentials) {
        log::warn!("Rejected ingestion with invalid credentials");
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "Unauthorized"));
    }

    let multipart =
        multipart.map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.body_text()))?;
    let bytes = read_upload(multipart).await?;
    log::info!("Received snapshot upload ({} bytes)", bytes.len());

    let tracker = Arc::clone(&state.tracker);
    let outcome = tokio::task::spawn_blocking(move || tracker.ingest_bytes(bytes))
        .await
        .map_err(|e| {
            log::error!("Ingestion task failed: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Ingestion failed")
        })?;

    match outcome {
        Ok(report) => Ok(Json(report).into_response()),
        Err(e) => Err(ApiError::new(StatusCode::BAD_REQUEST, e.to_string())),
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring invalid CORS origin {:?}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(86400))
}

/// Build the web server router
pub fn create_router(tracker: Arc<Tracker<SqliteStore>>, config: WebConfig) -> Router {
    let state = AppState {
        tracker,
        credentials: config.credentials.map(Arc::new),
    };

    let upload = post(ingest_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    Router::new()
        .route("/api/products", get(products_handler))
        .route("/api/category/{category}", get(category_handler))
        .route("/api/product/{id}", get(product_handler))
        .route("/api/product/{id}/image", get(image_handler))
        .route("/api/products/ingest", upload.clone())
        // path used by older scraper deployments
        .route("/api/products/injest", upload)
        .layer(cors_layer(&config.cors_origins))
        .with_state(state)
}

/// Start the web server (async)
///
/// Binds to 0.0.0.0 (all interfaces) to work with Docker port mapping.
pub async fn serve(
    tracker: Arc<Tracker<SqliteStore>>,
    config: WebConfig,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.credentials.is_none() {
        log::warn!("AUTH_USER/AUTH_PASS not set, snapshot upload disabled");
    }

    let app = create_router(tracker, config);
    let addr = format!("0.0.0.0:{}", port);

    log::info!("Price tracker API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Shutting down");
            }
        })
        .await?;

    Ok(())
}

#[cfg(test)]
#[path = "web_tests.rs"]
mod tests;
