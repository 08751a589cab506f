use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use market_sync::{config, storage};
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "migrate", about = "market-sync 數據庫遷移工具")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 運行所有未應用的遷移
    Run,

    /// 檢查遷移狀態
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日誌系統
    tracing_subscriber::fmt()
        .with_env_filter("market_sync=info,migrate=info")
        .with_span_events(FmtSpan::CLOSE)
        .init();

    // 解析命令行參數
    let cli = Cli::parse();

    config::init_config().context("載入配置失敗")?;
    let pool = storage::database::get_pool()
        .await
        .context("無法初始化資料庫連接池")?;

    // 執行命令
    match cli.command {
        Commands::Run => {
            info!("開始運行資料庫遷移...");
            storage::run_migrations(pool)
                .await
                .context("資料庫遷移執行失敗")?;
            info!("資料庫遷移完成！");
        }
        Commands::Status => {
            info!("檢查資料庫遷移狀態...");
            let statuses = storage::migration_status(pool)
                .await
                .context("讀取遷移狀態失敗")?;
            for status in statuses {
                info!(
                    version = status.version,
                    description = %status.description,
                    applied = status.applied,
                    "遷移"
                );
            }
        }
    }

    Ok(())
}
