use anyhow::Result;
use sqlx::{migrate::Migrator, PgPool};
use tracing::info;

// 靜態嵌入遷移目錄（此目錄應放在專案根目錄）
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// 執行數據庫遷移
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("開始執行數據庫遷移...");

    // 使用 sqlx::migrate!() 自動執行所有嵌入的 SQL 檔案
    MIGRATOR.run(pool).await?;
    info!("SQLx 遷移完成");
    Ok(())
}

/// 遷移狀態
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub version: i64,
    pub description: String,
    pub applied: bool,
}

/// 列出內嵌遷移與其套用狀態
pub async fn migration_status(pool: &PgPool) -> Result<Vec<MigrationStatus>> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_name = '_sqlx_migrations')",
    )
    .fetch_one(pool)
    .await?;

    let applied: Vec<i64> = if table_exists {
        sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success = TRUE")
            .fetch_all(pool)
            .await?
    } else {
        Vec::new()
    };

    Ok(MIGRATOR
        .iter()
        .map(|m| MigrationStatus {
            version: m.version,
            description: m.description.to_string(),
            applied: applied.contains(&m.version),
        })
        .collect())
}
