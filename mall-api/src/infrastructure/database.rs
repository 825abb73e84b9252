use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;

use crate::config::DatabaseConfig;
use crate::error::AppError;

pub async fn init_mysql(config: &DatabaseConfig) -> Result<MySqlPool, AppError> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    tracing::info!("mysql connected");
    Ok(pool)
}
