use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// 單一標的同步紀錄
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SyncLogEntry {
    pub log_id: i64,
    pub run_id: Uuid,
    pub symbol: String,
    pub stream: String,
    pub status: String,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub records_fetched: i64,
    pub rows_affected: i64,
    pub logged_at: DateTime<Utc>,
}

/// 同步紀錄插入模型
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLogInsert {
    pub run_id: Uuid,
    pub symbol: String,
    pub stream: String,
    pub status: String,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    pub records_fetched: i64,
    pub rows_affected: i64,
}

/// 批次報告
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BatchReportRecord {
    pub run_id: Uuid,
    pub stream: String,
    pub as_of: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total: i32,
    pub stored: i32,
    pub no_work: i32,
    pub no_data: i32,
    pub failed: i32,
    pub skipped: i32,
    pub rows_affected: i64,
    pub report: Json<serde_json::Value>,
}
