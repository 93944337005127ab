use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use sentry_core::{CoreError, IssueLevel, IssueStatus};
use sentry_ingest::{IssueFilter, IssueUpdate};

use crate::error::ApiError;
use crate::state::AppState;

fn user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError(CoreError::MissingAuth))
}

#[derive(Debug, Deserialize)]
pub struct ListIssuesQuery {
    status: Option<String>,
    level: Option<String>,
    environment: Option<String>,
    query: Option<String>,
    sort: Option<String>,
    cursor: Option<String>,
    limit: Option<u64>,
}

impl From<ListIssuesQuery> for IssueFilter {
    fn from(q: ListIssuesQuery) -> Self {
        IssueFilter {
            status: q.status.as_deref().and_then(IssueStatus::parse),
            level: q.level.as_deref().and_then(IssueLevel::parse),
            query: q.query,
            environment: q.environment,
            sort: q.sort,
            cursor: q.cursor,
            limit: q.limit,
        }
    }
}

pub async fn list_issues(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(query): Query<ListIssuesQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let page = state
        .query
        .list_issues(&slug, &user_id, query.into())
        .await?;
    Ok(Json(page))
}

pub async fn get_issue(
    State(state): State<Arc<AppState>>,
    Path((slug, issue_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let detail = state.query.get_issue(&slug, &user_id, &issue_id).await?;
    Ok(Json(detail))
}

#[derive(Debug, Deserialize)]
pub struct UpdateIssueBody {
    status: Option<String>,
}

pub async fn update_issue(
    State(state): State<Arc<AppState>>,
    Path((slug, issue_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<UpdateIssueBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let status = match body.status {
        Some(raw) => Some(
            IssueStatus::parse(&raw)
                .ok_or_else(|| ApiError(CoreError::MissingFields("status".to_string())))?,
        ),
        None => None,
    };
    let updated = state
        .query
        .update_issue(&slug, &user_id, &issue_id, IssueUpdate { status })
        .await?;
    Ok(Json(updated))
}

pub async fn delete_issue(
    State(state): State<Arc<AppState>>,
    Path((slug, issue_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    state.query.delete_issue(&slug, &user_id, &issue_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    cursor: Option<String>,
    limit: Option<u64>,
}

pub async fn get_issue_events(
    State(state): State<Arc<AppState>>,
    Path((slug, issue_id)): Path<(String, String)>,
    Query(page): Query<PageQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let events = state
        .query
        .get_issue_events(&slug, &user_id, &issue_id, page.cursor, page.limit)
        .await?;
    Ok(Json(events))
}

pub async fn get_event(
    State(state): State<Arc<AppState>>,
    Path((slug, event_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let event = state.query.get_event(&slug, &user_id, &event_id).await?;
    Ok(Json(event))
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    limit: Option<u64>,
}

pub async fn get_latest_events(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(query): Query<LatestQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let events = state
        .query
        .get_latest_events(&slug, &user_id, query.limit)
        .await?;
    Ok(Json(events))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    interval: Option<String>,
    start: Option<String>,
    end: Option<String>,
}

pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(query): Query<StatsQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let stats = state
        .query
        .get_stats(&slug, &user_id, query.interval, query.start, query.end)
        .await?;
    Ok(Json(stats))
}

#[derive(Debug, Deserialize)]
pub struct CreateProjectBody {
    name: String,
    platform: String,
}

pub async fn create_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateProjectBody>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let project = state
        .registry
        .create_project(&body.name, &body.platform, &user_id)
        .await
        .map_err(CoreError::from)?;
    Ok(Json(project))
}

pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user_id(&headers)?;
    let project = state
        .registry
        .get_project_by_slug(&slug, &user_id)
        .await
        .map_err(CoreError::from)?;
    state
        .registry
        .delete_project(&project.id, &user_id)
        .await
        .map_err(CoreError::from)?;

    // §3: project deletion cascades to its shard. The registry only owns
    // `projects`/`project_members`; destroying the per-project store is this
    // layer's job once the registry confirms no late writes can land there.
    state.shards.evict(&project.id).await;
    let shard_path = state.shards.database_url(&project.id);
    if let Some(path) = shard_path.strip_prefix("sqlite://").and_then(|p| p.split('?').next()) {
        if let Err(err) = tokio::fs::remove_file(path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(project_id = %project.id, error = %err, "failed to remove shard file after project deletion");
            }
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
