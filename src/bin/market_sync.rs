use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use market_sync::calendar::TradingCalendar;
use market_sync::config::{self, ApplicationConfig};
use market_sync::data_provider::{CsvVendorClient, FetcherSettings, RateLimitedFetcher};
use market_sync::domain_types::SyncStream;
use market_sync::monitor;
use market_sync::storage::{self, PgObservationStore, PgSyncLogRepository};
use market_sync::sync::{
    BatchOrchestrator, BatchRun, JsonFileReportSink, PgReportSink, ReportFormatter, SyncError,
};
use market_sync::utils::parse_date;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "market_sync", about = "日線與估值因子增量同步")]
struct Cli {
    /// 基準日，預設為今天
    #[arg(long, value_parser = parse_as_of)]
    as_of: Option<NaiveDate>,

    /// 同步資料流：price 或 factor，預設使用配置
    #[arg(long)]
    stream: Option<SyncStream>,

    /// 略過資料庫遷移
    #[arg(long)]
    skip_migrations: bool,

    /// 標的代碼，未指定時使用配置中的清單
    #[arg(value_name = "SYMBOL")]
    instruments: Vec<String>,
}

fn parse_as_of(raw: &str) -> Result<NaiveDate, String> {
    parse_date(raw).ok_or_else(|| format!("無法解析日期: {}", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    config::init_config().context("載入配置失敗")?;
    let app_config = config::get_config();

    // guard 必須存活到 main 結束
    let _log_guard = monitor::init_logging(&app_config.log).context("初始化日誌系統失敗")?;

    let instruments = if cli.instruments.is_empty() {
        app_config.sync.instruments.clone()
    } else {
        cli.instruments.clone()
    };
    if instruments.is_empty() {
        return Err(anyhow!("沒有要同步的標的，請在命令列或 sync.instruments 指定"));
    }
    let stream = cli.stream.unwrap_or(app_config.sync.stream);
    let as_of = cli.as_of.unwrap_or_else(|| Local::now().date_naive());

    let pool = storage::database::get_pool()
        .await
        .context("無法初始化資料庫連接池")?;
    if !cli.skip_migrations {
        storage::run_migrations(pool)
            .await
            .context("資料庫遷移執行失敗")?;
    }

    let orchestrator = build_orchestrator(app_config, pool, stream)?;

    let cancel = orchestrator.cancel_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中斷訊號，處理完目前標的後停止");
            cancel.cancel();
        }
    });

    match orchestrator.run_raw(&instruments, as_of).await {
        Ok(run) => {
            print_summary(&run);
            if run.counts.failed > 0 {
                warn!(failed = ?run.failed_symbols(), "部分標的同步失敗");
            }
            Ok(())
        }
        Err(SyncError::BatchAborted { reason, report }) => {
            print_summary(&report);
            error!(%reason, "批次中止");
            Err(anyhow!("批次中止: {}", reason))
        }
        Err(err) => Err(err.into()),
    }
}

fn build_orchestrator(
    app_config: &ApplicationConfig,
    pool: &sqlx::PgPool,
    stream: SyncStream,
) -> Result<BatchOrchestrator> {
    let calendar = Arc::new(TradingCalendar::from_config(&app_config.calendar));
    let vendor = CsvVendorClient::new(&app_config.vendor.data_dir);
    let fetcher = RateLimitedFetcher::new(vendor, FetcherSettings::from_config(&app_config.vendor));
    let store = PgObservationStore::from_config(pool.clone(), &app_config.sync)
        .context("資料表設定無效")?;

    let mut orchestrator = BatchOrchestrator::new(
        calendar,
        Arc::new(fetcher),
        Arc::new(store),
        stream,
        app_config.sync.earliest_date,
    );
    if let Some(dir) = &app_config.report.directory {
        orchestrator = orchestrator.with_sink(Arc::new(JsonFileReportSink::new(dir)));
    }
    if app_config.report.write_database {
        orchestrator = orchestrator
            .with_sink(Arc::new(PgReportSink::new(PgSyncLogRepository::new(pool.clone()))));
    }

    info!(
        stream = %stream,
        table = %app_config.sync.table_name,
        vendor_dir = %app_config.vendor.data_dir,
        "同步引擎已就緒"
    );
    Ok(orchestrator)
}

fn print_summary(run: &BatchRun) {
    println!("{}", ReportFormatter::format_text(run));
}
