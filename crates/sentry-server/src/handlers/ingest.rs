use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;

use sentry_ingest::IngestRequest;

use crate::error::ApiError;
use crate::state::AppState;

#[utoipa::path(
    post,
    path = "/api/{project_id}/envelope",
    params(("project_id" = String, Path, description = "Project id from the DSN")),
    request_body(content = String, description = "Newline-delimited envelope", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Envelope accepted, body is `{\"id\": string | null}`"),
        (status = 400, description = "Parse or decompression failure"),
        (status = 401, description = "Missing or invalid auth"),
    ),
    tag = "ingestion"
)]
pub async fn ingest_envelope(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(query_params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request = build_request(project_id, query_params, &headers, body);
    let response = state.coordinator.ingest_envelope(request).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/{project_id}/store",
    params(("project_id" = String, Path, description = "Project id from the DSN")),
    request_body = serde_json::Value,
    responses(
        (status = 200, description = "Event accepted, body is `{\"id\": string | null}`"),
        (status = 400, description = "Parse failure"),
        (status = 401, description = "Missing or invalid auth"),
    ),
    tag = "ingestion"
)]
pub async fn ingest_store(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(query_params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request = build_request(project_id, query_params, &headers, body);
    let response = state.coordinator.ingest_legacy_event(request).await?;
    Ok(Json(response))
}

fn build_request(
    project_id: String,
    query_params: HashMap<String, String>,
    headers: &HeaderMap,
    body: Bytes,
) -> IngestRequest {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    IngestRequest {
        project_id,
        query_params,
        sentry_auth_header: header_str("x-sentry-auth"),
        authorization_header: header_str("authorization"),
        content_encoding: header_str("content-encoding"),
        body: body.to_vec(),
    }
}
