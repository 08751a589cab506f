use crate::config::validation::{ValidationError, ValidationUtils, Validator};
use crate::utils::serde_helpers::{date_list, empty_string_as_none};
use crate::domain_types::{InstrumentId, SyncStream};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 應用程序配置結構
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub vendor: VendorConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl Validator for ApplicationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // 驗證各個部分的配置
        self.database.validate()?;
        self.log.validate()?;
        self.vendor.validate()?;
        self.sync.validate()?;
        self.calendar.validate()?;
        self.report.validate()?;

        Ok(())
    }
}

/// 數據庫配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime_secs: u64,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: String::new(),
            database: "market_data".to_string(),
            max_connections: 5,
            min_connections: 1,
            max_lifetime_secs: 1800,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

impl Validator for DatabaseConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // 驗證數據庫配置
        ValidationUtils::not_empty(&self.host, "database.host")?;
        ValidationUtils::not_empty(&self.username, "database.username")?;
        ValidationUtils::not_empty(&self.database, "database.database")?;
        ValidationUtils::in_range(self.port, 1, 65535, "database.port")?;
        ValidationUtils::in_range(
            self.max_connections,
            self.min_connections.max(1),
            1000,
            "database.max_connections",
        )?;

        Ok(())
    }
}

impl DatabaseConfig {
    /// 獲取最大生命週期持續時間
    pub fn max_lifetime(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.max_lifetime_secs)
    }

    /// 獲取獲取連接超時持續時間
    pub fn acquire_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.acquire_timeout_secs)
    }

    /// 獲取閒置超時持續時間
    pub fn idle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.idle_timeout_secs)
    }
}

/// 日誌配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
    /// 設定時額外寫入每日輪替的日誌檔
    #[serde(deserialize_with = "empty_string_as_none")]
    pub directory: Option<String>,
    pub file_prefix: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directory: None,
            file_prefix: "market_sync".to_string(),
        }
    }
}

impl Validator for LogConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        // 驗證日誌級別
        ValidationUtils::one_of(
            &self.level.to_lowercase().as_str(),
            &["trace", "debug", "info", "warn", "error"],
            "log.level",
        )?;

        // 驗證日誌格式
        ValidationUtils::one_of(
            &self.format.to_lowercase().as_str(),
            &["pretty", "json"],
            "log.format",
        )?;

        ValidationUtils::check_dependency(
            self.directory.is_some(),
            !self.file_prefix.trim().is_empty(),
            "log.directory",
            "log.file_prefix",
        )?;

        Ok(())
    }
}

/// 供應商配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VendorConfig {
    /// CSV 供應商的資料目錄
    pub data_dir: String,
    /// 相鄰兩次呼叫的最小間隔（毫秒）
    pub min_interval_ms: u64,
    /// 每個分段的總嘗試次數
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub jitter_ms: u64,
    /// 單次呼叫涵蓋的最大日曆天數，0 表示不切分
    pub max_window_days: u32,
    /// 估值因子超出 (0, 1e6) 時視為缺值
    pub clean_factors: bool,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            data_dir: "data/vendor".to_string(),
            min_interval_ms: 1500,
            max_retries: 3,
            retry_base_ms: 3000,
            jitter_ms: 1000,
            max_window_days: 3650,
            clean_factors: true,
        }
    }
}

impl Validator for VendorConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::not_empty(&self.data_dir, "vendor.data_dir")?;
        ValidationUtils::in_range(self.min_interval_ms, 0, 60_000, "vendor.min_interval_ms")?;
        ValidationUtils::in_range(self.max_retries, 1, 10, "vendor.max_retries")?;
        ValidationUtils::in_range(self.retry_base_ms, 0, 120_000, "vendor.retry_base_ms")?;
        ValidationUtils::in_range(self.jitter_ms, 0, 60_000, "vendor.jitter_ms")?;

        Ok(())
    }
}

/// 同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub table_name: String,
    /// 沒有任何歷史資料時的起始日
    pub earliest_date: NaiveDate,
    pub stream: SyncStream,
    pub batch_insert_size: usize,
    /// 原始代碼，任何可解析的格式皆可
    pub instruments: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            table_name: "stock_daily_data".to_string(),
            earliest_date: NaiveDate::from_ymd_opt(2005, 1, 1).unwrap_or_default(),
            stream: SyncStream::Price,
            batch_insert_size: 500,
            instruments: Vec::new(),
        }
    }
}

impl Validator for SyncConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::not_empty(&self.table_name, "sync.table_name")?;
        ValidationUtils::in_range(self.batch_insert_size, 1, 5000, "sync.batch_insert_size")?;
        ValidationUtils::all_parse::<InstrumentId>(&self.instruments, "sync.instruments")?;

        Ok(())
    }
}

/// 交易日曆配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// 是否載入內建的滬深休市表
    pub use_builtin_holidays: bool,
    #[serde(deserialize_with = "date_list")]
    pub extra_holidays: Vec<NaiveDate>,
    /// 調休開市的週末
    #[serde(deserialize_with = "date_list")]
    pub extra_trading_days: Vec<NaiveDate>,
    pub max_scan_days: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            use_builtin_holidays: true,
            extra_holidays: Vec::new(),
            extra_trading_days: Vec::new(),
            max_scan_days: crate::calendar::DEFAULT_MAX_SCAN_DAYS,
        }
    }
}

impl Validator for CalendarConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::in_range(self.max_scan_days, 1, 366, "calendar.max_scan_days")?;

        if let Some(day) = self
            .extra_holidays
            .iter()
            .find(|d| self.extra_trading_days.contains(d))
        {
            return Err(ValidationError::InvalidValue(format!(
                "{} 同時出現在 calendar.extra_holidays 與 calendar.extra_trading_days",
                day
            )));
        }

        Ok(())
    }
}

/// 批次報告配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// JSON 與文字摘要的輸出目錄；空字串表示不輸出檔案
    #[serde(deserialize_with = "empty_string_as_none")]
    pub directory: Option<String>,
    /// 是否寫入 sync_update_log / sync_batch_report
    pub write_database: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            directory: Some("reports".to_string()),
            write_database: true,
        }
    }
}

impl Validator for ReportConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}
