use crate::config::{self, DatabaseConfig};
use crate::storage::error::StoreError;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::ConnectOptions;
use tokio::sync::OnceCell;
use tracing::info;

/// 全局資料庫連接池
static DB_POOL: OnceCell<PgPool> = OnceCell::const_new();

/// 初始化資料庫連接池
pub async fn init_pool(config: &DatabaseConfig) -> Result<PgPool, StoreError> {
    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.database);

    options = options.disable_statement_logging();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .max_lifetime(config.max_lifetime())
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .connect_with(options)
        .await?;

    // 測試連接
    sqlx::query("SELECT 1").execute(&pool).await?;
    info!(
        host = %config.host,
        database = %config.database,
        max_connections = config.max_connections,
        "資料庫連接池已建立"
    );

    Ok(pool)
}

/// 獲取全局資料庫連接池，首次呼叫時依全局配置初始化
pub async fn get_pool() -> Result<&'static PgPool, StoreError> {
    DB_POOL
        .get_or_try_init(|| async {
            let app_config = config::get_config();
            init_pool(&app_config.database).await
        })
        .await
}
