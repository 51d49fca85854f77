//! Registry HTTP routes
//!
//! | Method | Path | Operation |
//! |---|---|---|
//! | POST | `/v1/schemas` | upload a schema |
//! | GET | `/v1/schemas` | list metadata |
//! | GET | `/v1/schemas/:version` | fetch one record |
//! | GET | `/v1/schemas/:version/exists` | existence check |
//! | GET | `/v1/latest-patch?major=&minor=` | latest patch for a line |
//! | GET | `/health` | liveness |

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use tracing::error;

use super::wire::{
    ErrorBody, ExistsResponse, LatestPatchQuery, ListResponse, RecordResponse, UploadRequest, UploadResponse,
};
use crate::error::{ErrorKind, SchemaError};
use crate::registry::SchemaRegistry;
use crate::schema::MAX_PAYLOAD_BYTES;

/// Largest accepted request body: a base64-encoded maximum payload plus room for the envelope
pub const MAX_REQUEST_BYTES: usize = (MAX_PAYLOAD_BYTES / 3 + 1) * 4 + 64 * 1024;

/// Router exposing a registry over HTTP
pub fn registry_routes(registry: SchemaRegistry) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/schemas", post(upload_handler).get(list_handler))
        .route("/v1/schemas/:version", get(get_by_version_handler))
        .route("/v1/schemas/:version/exists", get(exists_handler))
        .route("/v1/latest-patch", get(latest_patch_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

/// A registry error rendered as `{code, message}` with the matching status
pub struct ApiError(pub SchemaError);

impl From<SchemaError> for ApiError {
    fn from(err: SchemaError) -> Self {
        Self(err)
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        if kind == ErrorKind::Internal {
            error!(error = %self.0, "Registry request failed");
        }
        (status_for(kind), Json(ErrorBody::from(&self.0))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn health_handler() -> &'static str {
    "OK"
}

async fn upload_handler(
    State(registry): State<SchemaRegistry>,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UploadResponse>)> {
    let Json(request) = body.map_err(|e| SchemaError::InvalidArgument(e.body_text()))?;
    let payload = request.decode_payload()?;
    let metadata = registry.register(&request.version, payload).await?;
    Ok((StatusCode::CREATED, Json(UploadResponse { metadata })))
}

async fn list_handler(State(registry): State<SchemaRegistry>) -> ApiResult<Json<ListResponse>> {
    let schemas = registry.list().await?;
    Ok(Json(ListResponse { schemas }))
}

async fn get_by_version_handler(
    State(registry): State<SchemaRegistry>,
    Path(version): Path<String>,
) -> ApiResult<Json<RecordResponse>> {
    let record = registry.get_by_version(&version).await?;
    Ok(Json(record.into()))
}

async fn exists_handler(
    State(registry): State<SchemaRegistry>,
    Path(version): Path<String>,
) -> ApiResult<Json<ExistsResponse>> {
    let exists = registry.version_exists(&version).await?;
    Ok(Json(ExistsResponse { exists }))
}

async fn latest_patch_handler(
    State(registry): State<SchemaRegistry>,
    query: Result<Query<LatestPatchQuery>, QueryRejection>,
) -> ApiResult<Json<RecordResponse>> {
    let Query(query) = query.map_err(|e| SchemaError::InvalidArgument(e.body_text()))?;
    let record = registry.latest_patch(query.major, query.minor).await?;
    Ok(Json(record.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    async fn call(router: &Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };
        let response = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json<T: DeserializeOwned>(bytes: &[u8]) -> T {
        serde_json::from_slice(bytes).unwrap()
    }

    fn upload(version: &str, payload: &[u8]) -> serde_json::Value {
        serde_json::to_value(UploadRequest::new(version, payload)).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let router = registry_routes(SchemaRegistry::in_memory());
        let (status, body) = call(&router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }

    #[tokio::test]
    async fn test_upload_then_fetch() {
        let router = registry_routes(SchemaRegistry::in_memory());

        let (status, body) = call(&router, Method::POST, "/v1/schemas", Some(upload("1.0.0", b"v0"))).await;
        assert_eq!(status, StatusCode::CREATED);
        let created: UploadResponse = json(&body);
        assert_eq!(created.metadata.version.to_string(), "1.0.0");

        call(&router, Method::POST, "/v1/schemas", Some(upload("1.0.4", b"v4"))).await;

        let (status, body) = call(&router, Method::GET, "/v1/schemas/1.0.0", None).await;
        assert_eq!(status, StatusCode::OK);
        let record = json::<RecordResponse>(&body).into_record().unwrap();
        assert_eq!(record.payload, b"v0");
        assert_eq!(record.metadata, created.metadata);

        let (status, body) = call(&router, Method::GET, "/v1/latest-patch?major=1&minor=0", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json::<RecordResponse>(&body).metadata.version.to_string(), "1.0.4");

        let (_, body) = call(&router, Method::GET, "/v1/schemas/1.0.4/exists", None).await;
        assert!(json::<ExistsResponse>(&body).exists);

        let (_, body) = call(&router, Method::GET, "/v1/schemas", None).await;
        assert_eq!(json::<ListResponse>(&body).schemas.len(), 2);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let router = registry_routes(SchemaRegistry::in_memory());
        call(&router, Method::POST, "/v1/schemas", Some(upload("1.0.0", b"v0"))).await;

        let cases = [
            (Method::POST, "/v1/schemas", Some(upload("1.0.0", b"again")), StatusCode::CONFLICT, "already_exists"),
            (Method::POST, "/v1/schemas", Some(upload("v1.0.1", b"x")), StatusCode::BAD_REQUEST, "invalid_argument"),
            (Method::POST, "/v1/schemas", Some(upload("1.0.1", b"")), StatusCode::BAD_REQUEST, "invalid_argument"),
            (Method::GET, "/v1/schemas/2.0.0", None, StatusCode::NOT_FOUND, "not_found"),
            (Method::GET, "/v1/schemas/1.0", None, StatusCode::BAD_REQUEST, "invalid_argument"),
            (Method::GET, "/v1/latest-patch?major=3&minor=0", None, StatusCode::NOT_FOUND, "not_found"),
            (Method::GET, "/v1/latest-patch?major=-1&minor=0", None, StatusCode::BAD_REQUEST, "invalid_argument"),
            (Method::GET, "/v1/latest-patch?major=one&minor=0", None, StatusCode::BAD_REQUEST, "invalid_argument"),
        ];

        for (method, uri, body, expected_status, expected_code) in cases {
            let (status, bytes) = call(&router, method, uri, body).await;
            assert_eq!(status, expected_status, "{}", uri);
            assert_eq!(json::<ErrorBody>(&bytes).code, expected_code, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_malformed_upload_body() {
        let router = registry_routes(SchemaRegistry::in_memory());
        let (status, bytes) = call(
            &router,
            Method::POST,
            "/v1/schemas",
            Some(serde_json::json!({ "version": "1.0.0", "payload": "%%%" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json::<ErrorBody>(&bytes).code, "invalid_argument");

        let (status, _) = call(&router, Method::POST, "/v1/schemas", Some(serde_json::json!({ "version": 1 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::FailedPrecondition), StatusCode::PRECONDITION_FAILED);
        assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
