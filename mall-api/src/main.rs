use mall_api::config::Config;
use mall_api::error::AppError;
use mall_api::infrastructure::database::init_mysql;
use mall_api::infrastructure::mail::MailManager;
use mall_api::logging::init_logging;
use mall_api::repository::Stores;
use mall_api::server::{AppState, create_app};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 加载环境变量与配置
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    // 初始化日志
    init_logging(&config)?;

    tracing::info!("starting mall-api");

    // 按配置选择存储后端
    let stores = match config.storage.backend.as_str() {
        "memory" => {
            tracing::warn!("using in-memory storage, data will not survive a restart");
            Stores::memory()
        }
        _ => Stores::mysql(init_mysql(&config.database).await?),
    };

    // 邮件通道：未配置 broker 时退化为日志输出
    let mail = MailManager::connect(&config.mail).await;

    // 创建并启动服务器
    let state = AppState::new(config.clone(), stores, mail);
    let app = create_app(state).await?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on {}", &addr);

    axum::serve(listener, app).await?;
    Ok(())
}
