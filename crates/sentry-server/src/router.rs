use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{ingest, management};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(ingest::ingest_envelope, ingest::ingest_store),
    tags(
        (name = "ingestion", description = "Sentry SDK-compatible ingestion endpoints"),
        (name = "management", description = "Project and issue management endpoints"),
    )
)]
pub struct ApiDoc;

pub fn build_router(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    let api = Router::new()
        .route("/{project_id}/envelope", post(ingest::ingest_envelope))
        .route("/{project_id}/envelope/", post(ingest::ingest_envelope))
        .route("/{project_id}/store", post(ingest::ingest_store))
        .route("/{project_id}/store/", post(ingest::ingest_store))
        .route("/projects", post(management::create_project))
        .route("/projects/{slug}", axum::routing::delete(management::delete_project))
        .route("/projects/{slug}/issues", get(management::list_issues))
        .route(
            "/projects/{slug}/issues/{issue_id}",
            get(management::get_issue)
                .patch(management::update_issue)
                .put(management::update_issue)
                .delete(management::delete_issue),
        )
        .route(
            "/projects/{slug}/issues/{issue_id}/events",
            get(management::get_issue_events),
        )
        .route(
            "/projects/{slug}/events/latest",
            get(management::get_latest_events),
        )
        .route(
            "/projects/{slug}/events/{event_id}",
            get(management::get_event),
        )
        .route("/projects/{slug}/stats", get(management::get_stats));

    Router::new()
        .nest("/api", api)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use sentry_database::{create_registry_schema, open_sqlite, ShardPool};
    use sentry_registry::ProjectRegistry;

    async fn test_app() -> (TestServer, sentry_registry::Project, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry_db = open_sqlite("sqlite::memory:").await.unwrap();
        create_registry_schema(&registry_db).await.unwrap();
        let registry = Arc::new(ProjectRegistry::new(registry_db));
        let project = registry
            .create_project("Demo", "rust", "user-1")
            .await
            .unwrap();

        let shards = Arc::new(ShardPool::new(dir.path().to_path_buf(), 8));
        let state = Arc::new(AppState::new(registry, shards));
        let server = TestServer::new(build_router(state, 5 * 1024 * 1024)).unwrap();
        (server, project, dir)
    }

    #[tokio::test]
    async fn envelope_ingestion_end_to_end() {
        let (server, project, _dir) = test_app().await;
        let body = "{}\n{\"type\":\"event\"}\n{\"message\":\"hi from a test\",\"level\":\"error\"}\n";

        let response = server
            .post(&format!("/api/{}/envelope", project.id))
            .add_header("x-sentry-auth", format!("Sentry sentry_key={}", project.public_key))
            .bytes(body.as_bytes().to_vec().into())
            .await;

        response.assert_status_ok();
    }

    #[tokio::test]
    async fn missing_auth_is_unauthorized() {
        let (server, project, _dir) = test_app().await;
        let body = "{}\n{\"type\":\"event\"}\n{\"message\":\"hi\"}\n";

        let response = server
            .post(&format!("/api/{}/envelope", project.id))
            .bytes(body.as_bytes().to_vec().into())
            .await;

        assert_eq!(response.status_code(), http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn issue_lifecycle_through_management_api() {
        let (server, project, _dir) = test_app().await;
        let envelope = "{}\n{\"type\":\"event\"}\n{\"message\":\"boom\",\"level\":\"error\"}\n";
        server
            .post(&format!("/api/{}/envelope", project.id))
            .add_header("x-sentry-auth", format!("Sentry sentry_key={}", project.public_key))
            .bytes(envelope.as_bytes().to_vec().into())
            .await
            .assert_status_ok();

        let issues = server
            .get(&format!("/api/projects/{}/issues", project.slug))
            .add_header("x-user-id", "user-1")
            .await;
        issues.assert_status_ok();
        let body: serde_json::Value = issues.json();
        let issue_id = body["issues"][0]["id"].as_str().unwrap().to_string();

        let updated = server
            .patch(&format!("/api/projects/{}/issues/{}", project.slug, issue_id))
            .add_header("x-user-id", "user-1")
            .json(&serde_json::json!({"status": "resolved"}))
            .await;
        updated.assert_status_ok();
        let updated_body: serde_json::Value = updated.json();
        assert_eq!(updated_body["status"], "resolved");
    }

    #[tokio::test]
    async fn non_member_gets_404_not_403() {
        let (server, project, _dir) = test_app().await;
        let response = server
            .get(&format!("/api/projects/{}/issues", project.slug))
            .add_header("x-user-id", "a-stranger")
            .await;
        assert_eq!(response.status_code(), http::StatusCode::NOT_FOUND);
    }
}
