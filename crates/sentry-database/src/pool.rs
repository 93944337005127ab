use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use sea_orm::{DatabaseConnection, DbErr};
use tokio::sync::Mutex;

use crate::connection::open_sqlite;
use crate::schema::create_shard_schema;

struct PoolState {
    handles: HashMap<String, Arc<DatabaseConnection>>,
    /// Most-recently-used project id at the back.
    recency: Vec<String>,
    /// One write-serialization lock per project id, held for the life of the
    /// process regardless of connection-handle eviction (see `write_lock`).
    write_locks: HashMap<String, Arc<Mutex<()>>>,
}

/// Bounded, LRU-evicted cache of open per-project shard handles (§5 "shared
/// resources"). One logical writer per project is enforced one layer up, by the
/// `Shard` that wraps a pooled handle with the write mutex handed out by
/// `write_lock`; this pool owns connection lifetime and the write-lock registry
/// so that two callers resolving the same project id always serialize against
/// the same lock, independent of the connection cache's own eviction.
pub struct ShardPool {
    shard_dir: PathBuf,
    max_size: usize,
    state: Mutex<PoolState>,
}

impl ShardPool {
    pub fn new(shard_dir: PathBuf, max_size: usize) -> Self {
        Self {
            shard_dir,
            max_size: max_size.max(1),
            state: Mutex::new(PoolState {
                handles: HashMap::new(),
                recency: Vec::new(),
                write_locks: HashMap::new(),
            }),
        }
    }

    /// Returns the pooled handle for `project_id`, opening (and lazily creating
    /// the schema for) a fresh one on a cache miss. Reopening an evicted shard is
    /// safe because schema creation is idempotent.
    pub async fn get(&self, project_id: &str) -> Result<Arc<DatabaseConnection>, DbErr> {
        {
            let mut state = self.state.lock().await;
            if let Some(handle) = state.handles.get(project_id).cloned() {
                touch(&mut state.recency, project_id);
                return Ok(handle);
            }
        }

        // Open outside the lock: connecting/migrating a sqlite file is I/O-bound
        // and must not block other shards' cache hits.
        let url = self.database_url(project_id);
        let conn = open_sqlite(&url).await?;
        create_shard_schema(&conn).await?;
        let handle = Arc::new(conn);

        let mut state = self.state.lock().await;
        // Another task may have raced us to open the same shard; prefer the
        // already-cached handle so we don't fragment connections.
        let handle = state
            .handles
            .entry(project_id.to_string())
            .or_insert(handle)
            .clone();
        touch(&mut state.recency, project_id);

        if state.handles.len() > self.max_size {
            if let Some(victim) = state.recency.first().cloned() {
                if victim != project_id {
                    state.handles.remove(&victim);
                    state.recency.retain(|id| id != &victim);
                    tracing::debug!(project_id = %victim, "evicted shard handle from pool");
                }
            }
        }

        Ok(handle)
    }

    /// Returns the persistent write-serialization lock for `project_id`,
    /// creating one on first use. Never LRU-evicted: unlike the connection
    /// cache, handing out a second lock instance for the same project would
    /// let two concurrent writers race each other's step-sequences, so this
    /// map only grows (one zero-sized `Mutex` per project ever seen) and is
    /// cleared only by `evict`, after the project itself is gone for good.
    pub async fn write_lock(&self, project_id: &str) -> Arc<Mutex<()>> {
        let mut state = self.state.lock().await;
        state
            .write_locks
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops a cached handle and write lock so a subsequent `get` reopens from
    /// disk. Callers use this after destroying a shard's backing file, so a
    /// stale pooled connection to a now-deleted database is never handed out
    /// again.
    pub async fn evict(&self, project_id: &str) {
        let mut state = self.state.lock().await;
        state.handles.remove(project_id);
        state.recency.retain(|id| id != project_id);
        state.write_locks.remove(project_id);
    }

    pub fn database_url(&self, project_id: &str) -> String {
        format!(
            "sqlite://{}?mode=rwc",
            self.shard_dir.join(format!("{project_id}.db")).display()
        )
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.state.lock().await.handles.len()
    }
}

fn touch(recency: &mut Vec<String>, project_id: &str) {
    recency.retain(|id| id != project_id);
    recency.push(project_id.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reuses_cached_handle() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ShardPool::new(dir.path().to_path_buf(), 10);
        let a = pool.get("proj-1").await.unwrap();
        let b = pool.get("proj-1").await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn write_lock_is_shared_across_callers_for_the_same_project() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ShardPool::new(dir.path().to_path_buf(), 10);
        let a = pool.write_lock("proj-1").await;
        let b = pool.write_lock("proj-1").await;
        assert!(Arc::ptr_eq(&a, &b));

        let c = pool.write_lock("proj-2").await;
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn evict_drops_the_write_lock_too() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ShardPool::new(dir.path().to_path_buf(), 10);
        let a = pool.write_lock("proj-1").await;
        pool.evict("proj-1").await;
        let b = pool.write_lock("proj-1").await;
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn evicts_least_recently_used_over_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let pool = ShardPool::new(dir.path().to_path_buf(), 2);
        pool.get("proj-1").await.unwrap();
        pool.get("proj-2").await.unwrap();
        pool.get("proj-3").await.unwrap();
        assert_eq!(pool.len().await, 2);
        // proj-1 was least recently used and should have been evicted; reopening
        // it must still succeed because schema creation is idempotent.
        let reopened = pool.get("proj-1").await;
        assert!(reopened.is_ok());
    }
}
