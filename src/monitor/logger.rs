// monitor/logger.rs - 日誌初始化
//
// 終端輸出依配置選擇 pretty 或 json；設定目錄時另外寫一份每日輪替的 json 檔。

use crate::config::LogConfig;
use crate::monitor::{MonitorError, MonitorResult};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 建立日誌過濾器
///
/// `RUST_LOG` 存在時優先，否則使用配置的級別。
pub fn build_filter(level: &str) -> MonitorResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level.to_lowercase()).map_err(|e| MonitorError::InvalidFilter {
        directive: level.to_string(),
        reason: e.to_string(),
    })
}

/// 初始化全域日誌
///
/// 回傳的 guard 必須存活到程式結束，否則檔案寫入執行緒會提早停止。
pub fn init_logging(config: &LogConfig) -> MonitorResult<Option<WorkerGuard>> {
    let filter = build_filter(&config.level)?;

    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);
    if config.format.eq_ignore_ascii_case("json") {
        layers.push(fmt::layer().json().with_current_span(true).boxed());
    } else {
        layers.push(fmt::layer().with_target(true).boxed());
    }

    let guard = match config.directory.as_deref() {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                MonitorError::InitializationError(format!("無法建立日誌目錄 {}: {}", dir, e))
            })?;
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| MonitorError::InitializationError(format!("設置日誌系統失敗: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_build_filter_from_level() {
        std::env::remove_var("RUST_LOG");
        assert!(build_filter("debug").is_ok());
        assert!(build_filter("INFO").is_ok());
    }

    #[test]
    #[serial]
    fn test_build_filter_rejects_garbage() {
        std::env::remove_var("RUST_LOG");
        let err = build_filter("market_sync=[").unwrap_err();
        assert_matches!(err, MonitorError::InvalidFilter { .. });
    }
}
