use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties};
use serde::Serialize;
use std::sync::Arc;

use crate::config::MailConfig;
use crate::error::AppError;

/// 找回密码邮件经 AMQP 队列交给邮件服务。
/// 没配置 broker 或连不上时退化为日志输出，令牌直接打在日志里方便联调。
#[derive(Clone)]
pub struct MailManager {
    queue: String,
    from: String,
    conn: Option<Arc<Connection>>,
}

#[derive(Debug, Serialize)]
struct MailEvent<'a> {
    to: &'a str,
    from: &'a str,
    subject: &'a str,
    template: &'static str,
    name: &'a str,
    token: &'a str,
    link: &'a str,
}

impl MailManager {
    pub fn disabled(config: &MailConfig) -> Self {
        Self {
            queue: config.queue.clone(),
            from: config.from.clone(),
            conn: None,
        }
    }

    pub async fn connect(config: &MailConfig) -> Self {
        let Some(url) = &config.url else {
            tracing::info!("mail transport not configured, reset tokens will be logged");
            return Self::disabled(config);
        };

        match Connection::connect(url, ConnectionProperties::default()).await {
            Ok(conn) => {
                tracing::info!(queue = config.queue, "rabbitmq connected");
                Self {
                    queue: config.queue.clone(),
                    from: config.from.clone(),
                    conn: Some(Arc::new(conn)),
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "rabbitmq unavailable, falling back to log-only mail");
                Self::disabled(config)
            }
        }
    }

    pub async fn send_password_reset(
        &self,
        to: &str,
        name: &str,
        token: &str,
        link: &str,
    ) -> Result<(), AppError> {
        let Some(conn) = &self.conn else {
            tracing::info!(to, token, link, "password reset token issued (mail transport disabled)");
            return Ok(());
        };

        let channel = conn.create_channel().await?;
        channel
            .queue_declare(
                &self.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let event = MailEvent {
            to,
            from: &self.from,
            subject: "Password recovery",
            template: "password_reset",
            name,
            token,
            link,
        };
        let payload = serde_json::to_string(&event)?;

        channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                payload.as_bytes(),
                BasicProperties::default(),
            )
            .await?;

        tracing::debug!(to, "password reset mail queued");
        Ok(())
    }
}
