use std::sync::Arc;

use sentry_core::CoreError;
use sentry_database::ShardPool;
use sentry_registry::ProjectRegistry;

use crate::shard::Shard;
use crate::types::{
    EventView, EventsPage, IssueDetail, IssueFilter, IssueUpdate, IssueView, IssuesPage,
    StatsResult,
};

/// Resolves a project slug through the registry (hiding non-members behind a
/// 404, never a 403, per §4.5) and dispatches the eight management operations
/// to the owning shard.
pub struct QueryFacade {
    registry: Arc<ProjectRegistry>,
    shards: Arc<ShardPool>,
}

impl QueryFacade {
    pub fn new(registry: Arc<ProjectRegistry>, shards: Arc<ShardPool>) -> Self {
        Self { registry, shards }
    }

    async fn shard_for(&self, slug: &str, user_id: &str) -> Result<Shard, CoreError> {
        let project = self
            .registry
            .get_project_by_slug(slug, user_id)
            .await
            .map_err(CoreError::from)?;
        let handle = self
            .shards
            .get(&project.id)
            .await
            .map_err(|e| CoreError::Internal(e.into()))?;
        let write_lock = self.shards.write_lock(&project.id).await;
        Ok(Shard::new(handle, write_lock))
    }

    pub async fn list_issues(
        &self,
        slug: &str,
        user_id: &str,
        filter: IssueFilter,
    ) -> Result<IssuesPage, CoreError> {
        self.shard_for(slug, user_id).await?.get_issues(filter).await
    }

    pub async fn get_issue(
        &self,
        slug: &str,
        user_id: &str,
        issue_id: &str,
    ) -> Result<IssueDetail, CoreError> {
        self.shard_for(slug, user_id).await?.get_issue(issue_id).await
    }

    pub async fn update_issue(
        &self,
        slug: &str,
        user_id: &str,
        issue_id: &str,
        update: IssueUpdate,
    ) -> Result<IssueView, CoreError> {
        self.shard_for(slug, user_id)
            .await?
            .update_issue(issue_id, update)
            .await
    }

    pub async fn delete_issue(
        &self,
        slug: &str,
        user_id: &str,
        issue_id: &str,
    ) -> Result<(), CoreError> {
        self.shard_for(slug, user_id).await?.delete_issue(issue_id).await
    }

    pub async fn get_issue_events(
        &self,
        slug: &str,
        user_id: &str,
        issue_id: &str,
        cursor: Option<String>,
        limit: Option<u64>,
    ) -> Result<EventsPage, CoreError> {
        self.shard_for(slug, user_id)
            .await?
            .get_issue_events(issue_id, cursor, limit)
            .await
    }

    pub async fn get_event(
        &self,
        slug: &str,
        user_id: &str,
        event_id: &str,
    ) -> Result<EventView, CoreError> {
        self.shard_for(slug, user_id).await?.get_event(event_id).await
    }

    pub async fn get_latest_events(
        &self,
        slug: &str,
        user_id: &str,
        limit: Option<u64>,
    ) -> Result<Vec<EventView>, CoreError> {
        self.shard_for(slug, user_id).await?.get_latest_events(limit).await
    }

    pub async fn get_stats(
        &self,
        slug: &str,
        user_id: &str,
        interval: Option<String>,
        start: Option<String>,
        end: Option<String>,
    ) -> Result<StatsResult, CoreError> {
        self.shard_for(slug, user_id)
            .await?
            .get_stats(interval, start, end)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentry_database::open_sqlite;
    use serde_json::json;
    use tempfile::tempdir;

    async fn test_facade() -> (QueryFacade, sentry_registry::Project, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let registry_db = open_sqlite("sqlite::memory:").await.unwrap();
        sentry_database::create_registry_schema(&registry_db).await.unwrap();
        let registry = Arc::new(ProjectRegistry::new(registry_db));
        let project = registry
            .create_project("Test App", "python", "user-1")
            .await
            .unwrap();

        let shards = Arc::new(ShardPool::new(dir.path().to_path_buf(), 4));
        let facade = QueryFacade::new(registry, shards);
        (facade, project, dir)
    }

    #[tokio::test]
    async fn non_member_sees_not_found_not_forbidden() {
        let (facade, project, _dir) = test_facade().await;
        let result = facade
            .list_issues(&project.slug, "a-stranger", IssueFilter::default())
            .await;
        assert!(matches!(result, Err(CoreError::ProjectNotFound)));
    }

    #[tokio::test]
    async fn member_can_list_and_update_issues() {
        let (facade, project, _dir) = test_facade().await;
        let shard = facade.shard_for(&project.slug, "user-1").await.unwrap();
        shard
            .ingest(json!({"message": "disk full", "level": "error"}))
            .await
            .unwrap();

        let page = facade
            .list_issues(&project.slug, "user-1", IssueFilter::default())
            .await
            .unwrap();
        assert_eq!(page.issues.len(), 1);

        let updated = facade
            .update_issue(
                &project.slug,
                "user-1",
                &page.issues[0].id,
                IssueUpdate {
                    status: Some(sentry_core::IssueStatus::Ignored),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, "ignored");
    }
}
