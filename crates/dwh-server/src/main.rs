//! DWH Server - Main entry point

use anyhow::{Context, Result};
use dwh_common::logging::{init_logging, LogConfig};
use tracing::info;

use dwh_server::{api, config::Config, db};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("dwh-server")
        .filter_directives("dwh_server=debug,tower_http=debug,sqlx=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    info!("Starting DWH Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );
    info!(
        csv_file_path = %config.etl.csv_file_path.display(),
        staging_policy = %config.etl.staging_policy,
        batch_size = config.etl.batch_size,
        "ETL configuration"
    );

    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to the warehouse database")?;

    db::run_migrations(&pool).await?;

    api::serve(config, pool).await
}
