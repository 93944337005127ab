mod connection;
mod pool;
mod schema;

pub use connection::open_sqlite;
pub use pool::ShardPool;
pub use schema::{create_registry_schema, create_shard_schema};
