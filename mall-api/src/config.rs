use serde::Deserialize;
use std::env;
use std::path::Path;

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// 存储后端选择："mysql" 或 "memory"
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiry_hours: u64,
    pub reset_token_expiry_minutes: i64,
    pub reset_link_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

/// 邮件事件投递到 AMQP 队列；url 缺省时只在日志里输出
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub url: Option<String>,
    pub queue: String,
    pub from: String,
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());

        let builder = config::Config::builder()
            .add_source(config::File::from(Path::new(&config_path).join("default")))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let config = builder.build()?;
        let config: Config = config.try_deserialize()?;

        Ok(config)
    }
}
