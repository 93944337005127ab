use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Opens (creating if absent, per `?mode=rwc` in the URL) a single-file sqlite
/// database. Pool size is kept small and serialized per shard per the spec's
/// single-writer-per-shard concurrency model (§5) rather than the wide connection
/// pool the teacher configures for its shared Postgres database.
pub async fn open_sqlite(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options
        .max_connections(5)
        .min_connections(1)
        .connect_timeout(CONNECTION_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .sqlx_logging(false);

    Database::connect(options).await
}
