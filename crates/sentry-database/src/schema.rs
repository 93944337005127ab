use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, DbErr, Statement};

/// Idempotent DDL for one project shard. Safe to run every time a shard handle is
/// (re)opened, including after eviction from the shard pool.
pub async fn create_shard_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    run_batch(
        db,
        &[
            "PRAGMA foreign_keys = ON",
            r#"CREATE TABLE IF NOT EXISTS issues (
                id TEXT PRIMARY KEY,
                fingerprint TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                culprit TEXT,
                level TEXT NOT NULL,
                platform TEXT NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                count INTEGER NOT NULL,
                user_count INTEGER NOT NULL,
                status TEXT NOT NULL,
                metadata TEXT
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_issues_last_seen ON issues(last_seen DESC)",
            "CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status)",
            r#"CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                issue_id TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
                timestamp TEXT NOT NULL,
                received_at TEXT NOT NULL,
                level TEXT NOT NULL,
                platform TEXT,
                environment TEXT,
                release TEXT,
                transaction_name TEXT,
                user_id TEXT,
                user_email TEXT,
                user_ip TEXT,
                tags TEXT,
                data TEXT NOT NULL
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_events_issue_id ON events(issue_id)",
            "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp DESC)",
            "CREATE INDEX IF NOT EXISTS idx_events_environment ON events(environment)",
            "CREATE INDEX IF NOT EXISTS idx_events_release ON events(release)",
            r#"CREATE TABLE IF NOT EXISTS issue_stats (
                issue_id TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
                bucket_start TEXT NOT NULL,
                count INTEGER NOT NULL,
                PRIMARY KEY (issue_id, bucket_start)
            )"#,
            r#"CREATE TABLE IF NOT EXISTS issue_users (
                issue_id TEXT NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
                user_hash TEXT NOT NULL,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                PRIMARY KEY (issue_id, user_hash)
            )"#,
        ],
    )
    .await
}

/// Idempotent DDL for the Registry store.
pub async fn create_registry_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    run_batch(
        db,
        &[
            "PRAGMA foreign_keys = ON",
            r#"CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                public_key TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                platform TEXT NOT NULL,
                owner_user_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS project_members (
                project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                PRIMARY KEY (project_id, user_id)
            )"#,
        ],
    )
    .await
}

async fn run_batch(db: &DatabaseConnection, statements: &[&str]) -> Result<(), DbErr> {
    for sql in statements {
        db.execute(Statement::from_string(DbBackend::Sqlite, sql.to_string()))
            .await?;
    }
    Ok(())
}
