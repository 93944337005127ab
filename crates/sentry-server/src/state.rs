use std::sync::Arc;

use sentry_database::ShardPool;
use sentry_ingest::{IngestionCoordinator, QueryFacade};
use sentry_registry::ProjectRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProjectRegistry>,
    pub shards: Arc<ShardPool>,
    pub coordinator: Arc<IngestionCoordinator>,
    pub query: Arc<QueryFacade>,
}

impl AppState {
    pub fn new(registry: Arc<ProjectRegistry>, shards: Arc<ShardPool>) -> Self {
        let coordinator = Arc::new(IngestionCoordinator::new(registry.clone(), shards.clone()));
        let query = Arc::new(QueryFacade::new(registry.clone(), shards.clone()));
        Self {
            registry,
            shards,
            coordinator,
            query,
        }
    }
}
