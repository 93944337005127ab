mod error;
mod handlers;
mod router;
mod state;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Layer;

use sentry_config::ServerConfig;
use sentry_database::{create_registry_schema, open_sqlite, ShardPool};
use sentry_registry::ProjectRegistry;

use state::AppState;

#[derive(Parser)]
#[command(author, version, about = "Self-hosted Sentry-compatible error tracking server")]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "HEARTH_LOG_LEVEL")]
    log_level: String,

    /// Log format: compact, full, json
    #[arg(long, default_value = "compact", env = "HEARTH_LOG_FORMAT")]
    log_format: String,
}

fn init_tracing(log_level: &str, log_format: &str) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .expect("invalid RUST_LOG environment variable")
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "sentry_server={level},\
             sentry_ingest={level},\
             sentry_registry={level},\
             sentry_database={level},\
             sentry_config={level},\
             sentry_core={level},\
             sqlx=warn,\
             sea_orm=warn,\
             tower=warn,\
             hyper=warn",
            level = log_level
        ))
    };

    let fmt_layer = match log_format {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed(),
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to set global default subscriber");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, &cli.log_format);

    let config = ServerConfig::from_env()?;
    tracing::info!(bind_address = %config.bind_address, data_dir = ?config.data_dir, "starting server");

    let registry_db = open_sqlite(&config.registry_database_url()).await?;
    create_registry_schema(&registry_db).await?;
    let registry = Arc::new(ProjectRegistry::new(registry_db));

    let shards = Arc::new(ShardPool::new(config.shard_dir(), config.shard_pool_size));

    let state = Arc::new(AppState::new(registry, shards));
    let app = router::build_router(state, config.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!(address = %config.bind_address, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
