use std::collections::HashMap;
use std::sync::Arc;

use sentry_core::CoreError;
use sentry_database::ShardPool;
use sentry_registry::{ProjectRegistry, RegistryError};

use crate::auth::{gunzip, resolve_sentry_key};
use crate::envelope::{parse_envelope, parse_legacy_event};
use crate::shard::Shard;
use crate::types::IngestOutcome;

/// Raw transport-level inputs the coordinator needs from whatever HTTP
/// framework is fronting it, kept framework-agnostic so this crate has no
/// dependency on axum (§4.4).
pub struct IngestRequest {
    pub project_id: String,
    pub query_params: HashMap<String, String>,
    pub sentry_auth_header: Option<String>,
    pub authorization_header: Option<String>,
    pub content_encoding: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestResponse {
    pub id: Option<String>,
}

/// Entry point for both the envelope and legacy `/store/` endpoints (§4.4).
/// Resolves the sentry key from whichever source carried it, looks the owning
/// project up in the registry, and fans each event item out to that project's
/// shard. A failure on one item in a multi-item envelope does not fail its
/// siblings — each dispatch is independently caught and logged.
pub struct IngestionCoordinator {
    registry: Arc<ProjectRegistry>,
    shards: Arc<ShardPool>,
}

impl IngestionCoordinator {
    pub fn new(registry: Arc<ProjectRegistry>, shards: Arc<ShardPool>) -> Self {
        Self { registry, shards }
    }

    pub async fn ingest_envelope(&self, request: IngestRequest) -> Result<IngestResponse, CoreError> {
        let body = self.decompress(&request)?;
        let text = String::from_utf8(body)
            .map_err(|e| CoreError::ParseFailed(format!("body is not valid utf-8: {e}")))?;

        let envelope =
            parse_envelope(&text).map_err(|e| CoreError::ParseFailed(e.to_string()))?;

        let events: Vec<_> = envelope.event_items().cloned().collect();
        if events.is_empty() {
            return Ok(IngestResponse { id: None });
        }

        self.dispatch(&request, events).await
    }

    pub async fn ingest_legacy_event(&self, request: IngestRequest) -> Result<IngestResponse, CoreError> {
        let body = self.decompress(&request)?;
        let text = String::from_utf8(body)
            .map_err(|e| CoreError::ParseFailed(format!("body is not valid utf-8: {e}")))?;

        let event =
            parse_legacy_event(&text).map_err(|e| CoreError::ParseFailed(e.to_string()))?;

        self.dispatch(&request, vec![event]).await
    }

    fn decompress(&self, request: &IngestRequest) -> Result<Vec<u8>, CoreError> {
        let is_gzip = request
            .content_encoding
            .as_deref()
            .map(|enc| enc.eq_ignore_ascii_case("gzip"))
            .unwrap_or(false);

        if is_gzip {
            gunzip(&request.body)
                .map_err(|e| CoreError::DecompressionFailed(e.to_string()))
        } else {
            Ok(request.body.clone())
        }
    }

    async fn dispatch(
        &self,
        request: &IngestRequest,
        events: Vec<serde_json::Value>,
    ) -> Result<IngestResponse, CoreError> {
        let sentry_key = resolve_sentry_key(
            &request.query_params,
            request.sentry_auth_header.as_deref(),
            request.authorization_header.as_deref(),
        )
        .ok_or(CoreError::MissingAuth)?;

        // An unknown key is an auth failure here, not a 404: the Query Facade's
        // 404-not-403 contract (§4.5) doesn't apply to SDK ingestion (§4.4).
        let project = self
            .registry
            .get_project_by_key(&sentry_key)
            .await
            .map_err(|err| match err {
                RegistryError::NotFound => CoreError::InvalidAuth,
                other => CoreError::from(other),
            })?;

        if project.id != request.project_id {
            return Err(CoreError::ProjectMismatch);
        }

        let handle = self
            .shards
            .get(&project.id)
            .await
            .map_err(|e| CoreError::Internal(e.into()))?;
        let write_lock = self.shards.write_lock(&project.id).await;
        let shard = Shard::new(handle, write_lock);

        let mut first_outcome: Option<IngestOutcome> = None;
        let mut first_attempted_id: Option<String> = None;

        for event in events {
            let attempted_id = event
                .get("event_id")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string);
            if first_attempted_id.is_none() {
                first_attempted_id = attempted_id.clone();
            }

            match shard.ingest(event).await {
                Ok(outcome) => {
                    if first_outcome.is_none() {
                        first_outcome = Some(outcome);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        project_id = %project.id,
                        error = %err,
                        "failed to ingest one event in a multi-item envelope"
                    );
                }
            }
        }

        let id = first_outcome
            .map(|outcome| outcome.event_id)
            .or(first_attempted_id);

        Ok(IngestResponse { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentry_database::ShardPool;
    use sentry_registry::ProjectRegistry;
    use sentry_database::open_sqlite;
    use tempfile::tempdir;

    async fn test_setup() -> (IngestionCoordinator, sentry_registry::Project, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let registry_db = open_sqlite("sqlite::memory:").await.unwrap();
        sentry_database::create_registry_schema(&registry_db).await.unwrap();
        let registry = Arc::new(ProjectRegistry::new(registry_db));
        let project = registry
            .create_project("Test App", "javascript", "user-1")
            .await
            .unwrap();

        let shards = Arc::new(ShardPool::new(dir.path().to_path_buf(), 4));
        let coordinator = IngestionCoordinator::new(registry, shards);
        (coordinator, project, dir)
    }

    #[tokio::test]
    async fn ingests_a_single_item_envelope() {
        let (coordinator, project, _dir) = test_setup().await;
        let body = "{}\n{\"type\":\"event\"}\n{\"message\":\"hello\",\"level\":\"error\"}\n";

        let request = IngestRequest {
            project_id: project.id.clone(),
            query_params: HashMap::from([("sentry_key".to_string(), project.public_key.clone())]),
            sentry_auth_header: None,
            authorization_header: None,
            content_encoding: None,
            body: body.as_bytes().to_vec(),
        };

        let response = coordinator.ingest_envelope(request).await.unwrap();
        assert!(response.id.is_some());
    }

    #[tokio::test]
    async fn project_id_mismatch_is_rejected() {
        let (coordinator, project, _dir) = test_setup().await;
        let body = "{}\n{\"type\":\"event\"}\n{\"message\":\"hi\"}\n";

        let request = IngestRequest {
            project_id: "not-this-project".to_string(),
            query_params: HashMap::from([("sentry_key".to_string(), project.public_key.clone())]),
            sentry_auth_header: None,
            authorization_header: None,
            content_encoding: None,
            body: body.as_bytes().to_vec(),
        };

        let result = coordinator.ingest_envelope(request).await;
        assert!(matches!(result, Err(CoreError::ProjectMismatch)));
    }

    #[tokio::test]
    async fn missing_sentry_key_is_rejected() {
        let (coordinator, project, _dir) = test_setup().await;
        let body = "{}\n{\"type\":\"event\"}\n{\"message\":\"hi\"}\n";

        let request = IngestRequest {
            project_id: project.id.clone(),
            query_params: HashMap::new(),
            sentry_auth_header: None,
            authorization_header: None,
            content_encoding: None,
            body: body.as_bytes().to_vec(),
        };

        let result = coordinator.ingest_envelope(request).await;
        assert!(matches!(result, Err(CoreError::MissingAuth)));
    }

    #[tokio::test]
    async fn concurrent_first_events_for_the_same_fingerprint_fold_into_one_issue() {
        // Regression test for the shard write lock being shared across the
        // coordinator's per-request `Shard` instances (§5 single-writer-per-
        // shard, §8 count consistency). Before the fix, each `dispatch` call
        // built its own fresh `Mutex`, so two concurrent first-events for a
        // brand-new fingerprint could both observe "no existing issue" and
        // race the `issues.fingerprint` unique constraint.
        let dir = tempdir().unwrap();
        let registry_db = open_sqlite("sqlite::memory:").await.unwrap();
        sentry_database::create_registry_schema(&registry_db).await.unwrap();
        let registry = Arc::new(ProjectRegistry::new(registry_db));
        let project = registry
            .create_project("Race App", "javascript", "user-1")
            .await
            .unwrap();

        let shards = Arc::new(ShardPool::new(dir.path().to_path_buf(), 4));
        let coordinator = Arc::new(IngestionCoordinator::new(registry.clone(), shards.clone()));

        let body = "{}\n{\"type\":\"event\"}\n\
            {\"exception\":{\"values\":[{\"type\":\"RaceError\",\"value\":\"boom\"}]}}\n";

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coordinator = coordinator.clone();
            let request = IngestRequest {
                project_id: project.id.clone(),
                query_params: HashMap::from([(
                    "sentry_key".to_string(),
                    project.public_key.clone(),
                )]),
                sentry_auth_header: None,
                authorization_header: None,
                content_encoding: None,
                body: body.as_bytes().to_vec(),
            };
            handles.push(tokio::spawn(
                async move { coordinator.ingest_envelope(request).await },
            ));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let write_lock = shards.write_lock(&project.id).await;
        let shard = Shard::new(shards.get(&project.id).await.unwrap(), write_lock);
        let page = shard.get_issues(crate::types::IssueFilter::default()).await.unwrap();
        assert_eq!(page.issues.len(), 1, "all 8 events must fold into one issue");
        assert_eq!(page.issues[0].count, 8, "no event may be dropped to a constraint race");
    }

    #[tokio::test]
    async fn unknown_sentry_key_is_invalid_auth_not_not_found() {
        let (coordinator, project, _dir) = test_setup().await;
        let body = "{}\n{\"type\":\"event\"}\n{\"message\":\"hi\"}\n";

        let request = IngestRequest {
            project_id: project.id.clone(),
            query_params: HashMap::from([("sentry_key".to_string(), "bogus-key".to_string())]),
            sentry_auth_header: None,
            authorization_header: None,
            content_encoding: None,
            body: body.as_bytes().to_vec(),
        };

        let result = coordinator.ingest_envelope(request).await;
        assert!(matches!(result, Err(CoreError::InvalidAuth)));
    }

    #[tokio::test]
    async fn legacy_store_event_is_accepted() {
        let (coordinator, project, _dir) = test_setup().await;
        let body = "{\"message\":\"legacy\",\"level\":\"info\"}";

        let request = IngestRequest {
            project_id: project.id.clone(),
            query_params: HashMap::from([("sentry_key".to_string(), project.public_key.clone())]),
            sentry_auth_header: None,
            authorization_header: None,
            content_encoding: None,
            body: body.as_bytes().to_vec(),
        };

        let response = coordinator.ingest_legacy_event(request).await.unwrap();
        assert!(response.id.is_some());
    }
}
