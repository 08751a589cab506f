use crate::domain_types::{FetchWindow, SyncStream};
use crate::storage::models::{BatchReportRecord, SyncLogInsert};
use crate::storage::SyncLogRepository;
use crate::sync::error::{ReportError, SyncError};
use crate::sync::state::SyncPhase;
use crate::utils::{elapsed_ms, format_compact_date};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// 標的在報告中的終態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Stored,
    NoWork,
    NoData,
    Failed,
    Skipped,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Stored => "stored",
            OutcomeStatus::NoWork => "no_work",
            OutcomeStatus::NoData => "no_data",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::Skipped => "skipped",
        }
    }

    /// 由終態階段取得；非終態視為失敗
    pub fn from_phase(phase: SyncPhase) -> Self {
        match phase {
            SyncPhase::Stored => OutcomeStatus::Stored,
            SyncPhase::NoWorkNeeded => OutcomeStatus::NoWork,
            SyncPhase::NoData => OutcomeStatus::NoData,
            SyncPhase::Skipped => OutcomeStatus::Skipped,
            SyncPhase::Failed
            | SyncPhase::Pending
            | SyncPhase::Resolving
            | SyncPhase::Fetching => OutcomeStatus::Failed,
        }
    }
}

/// 單一標的的同步結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentOutcome {
    /// 正規化後的代碼；無法解析時保留原始輸入
    pub symbol: String,
    pub status: OutcomeStatus,
    pub last_persisted: Option<NaiveDate>,
    pub window: Option<FetchWindow>,
    pub records_fetched: u64,
    pub rows_affected: u64,
    pub skipped_duplicates: u64,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: u64,
}

impl InstrumentOutcome {
    pub fn new(symbol: impl Into<String>, status: OutcomeStatus) -> Self {
        Self {
            symbol: symbol.into(),
            status,
            last_persisted: None,
            window: None,
            records_fetched: 0,
            rows_affected: 0,
            skipped_duplicates: 0,
            error_kind: None,
            error_message: None,
            duration_ms: 0,
        }
    }

    pub fn failed(symbol: impl Into<String>, error: &SyncError) -> Self {
        Self::new(symbol, OutcomeStatus::Failed).with_error(error.kind(), error.to_string())
    }

    /// 批次中止或取消時未處理的標的
    pub fn skipped(symbol: impl Into<String>, reason: &str, detail: impl Into<String>) -> Self {
        Self::new(symbol, OutcomeStatus::Skipped).with_error(reason, detail)
    }

    pub fn with_error(mut self, kind: &str, message: impl Into<String>) -> Self {
        self.error_kind = Some(kind.to_string());
        self.error_message = Some(message.into());
        self
    }

    fn to_log_insert(&self, run_id: Uuid, stream: SyncStream) -> SyncLogInsert {
        SyncLogInsert {
            run_id,
            symbol: self.symbol.clone(),
            stream: stream.to_string(),
            status: self.status.as_str().to_string(),
            error_kind: self.error_kind.clone(),
            error_message: self.error_message.clone(),
            window_start: self.window.map(|w| w.start()),
            window_end: self.window.map(|w| w.end()),
            records_fetched: self.records_fetched as i64,
            rows_affected: self.rows_affected as i64,
        }
    }
}

/// 各終態的標的數
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounts {
    pub total: usize,
    pub stored: usize,
    pub no_work: usize,
    pub no_data: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchCounts {
    fn add(&mut self, status: OutcomeStatus) {
        self.total += 1;
        match status {
            OutcomeStatus::Stored => self.stored += 1,
            OutcomeStatus::NoWork => self.no_work += 1,
            OutcomeStatus::NoData => self.no_data += 1,
            OutcomeStatus::Failed => self.failed += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
        }
    }
}

/// 一次批次同步的彙總
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRun {
    pub run_id: Uuid,
    pub stream: SyncStream,
    pub as_of: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub counts: BatchCounts,
    pub records_fetched: u64,
    pub rows_affected: u64,
    /// 錯誤分類 -> 次數
    pub error_summary: BTreeMap<String, usize>,
    /// 中止或取消的原因
    pub interrupted: Option<String>,
    pub outcomes: Vec<InstrumentOutcome>,
}

impl BatchRun {
    pub fn new(stream: SyncStream, as_of: NaiveDate) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            stream,
            as_of,
            started_at: Utc::now(),
            finished_at: None,
            counts: BatchCounts::default(),
            records_fetched: 0,
            rows_affected: 0,
            error_summary: BTreeMap::new(),
            interrupted: None,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: InstrumentOutcome) {
        self.counts.add(outcome.status);
        self.records_fetched += outcome.records_fetched;
        self.rows_affected += outcome.rows_affected;
        if outcome.status == OutcomeStatus::Failed {
            if let Some(kind) = &outcome.error_kind {
                *self.error_summary.entry(kind.clone()).or_insert(0) += 1;
            }
        }
        self.outcomes.push(outcome);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn outcome(&self, symbol: &str) -> Option<&InstrumentOutcome> {
        self.outcomes.iter().find(|o| o.symbol == symbol)
    }

    pub fn failed_symbols(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
            .map(|o| o.symbol.as_str())
            .collect()
    }

    /// 處理時間（秒）
    pub fn processing_time(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        elapsed_ms(&self.started_at, &end) as f64 / 1000.0
    }

    /// 非失敗的比例；空批次為 1
    pub fn success_rate(&self) -> f64 {
        let settled = self.counts.total - self.counts.skipped;
        if settled == 0 {
            1.0
        } else {
            (settled - self.counts.failed) as f64 / settled as f64
        }
    }

    pub fn log_entries(&self) -> Vec<SyncLogInsert> {
        self.outcomes
            .iter()
            .map(|o| o.to_log_insert(self.run_id, self.stream))
            .collect()
    }

    pub fn to_record(&self) -> Result<BatchReportRecord, ReportError> {
        Ok(BatchReportRecord {
            run_id: self.run_id,
            stream: self.stream.to_string(),
            as_of: self.as_of,
            started_at: self.started_at,
            finished_at: self.finished_at,
            total: self.counts.total as i32,
            stored: self.counts.stored as i32,
            no_work: self.counts.no_work as i32,
            no_data: self.counts.no_data as i32,
            failed: self.counts.failed as i32,
            skipped: self.counts.skipped as i32,
            rows_affected: self.rows_affected as i64,
            report: Json(serde_json::to_value(self)?),
        })
    }
}

/// 報告格式化器
pub struct ReportFormatter;

impl ReportFormatter {
    /// 格式化為人類可讀的文字
    pub fn format_text(run: &BatchRun) -> String {
        let mut output = String::new();

        output.push_str(&format!("=== 同步報告: {} ({}) ===\n", run.stream, run.run_id));
        output.push_str(&format!("基準日: {}\n", run.as_of));
        output.push_str(&format!(
            "開始時間: {}\n",
            run.started_at.format("%Y-%m-%d %H:%M:%S")
        ));
        if let Some(finished) = run.finished_at {
            output.push_str(&format!(
                "結束時間: {}\n",
                finished.format("%Y-%m-%d %H:%M:%S")
            ));
        }
        output.push_str(&format!("處理時間: {:.2} 秒\n", run.processing_time()));
        if let Some(reason) = &run.interrupted {
            output.push_str(&format!("中斷原因: {}\n", reason));
        }
        output.push('\n');

        output.push_str("統計摘要:\n");
        output.push_str(&format!("  標的總數: {}\n", run.counts.total));
        output.push_str(&format!("  已寫入: {}\n", run.counts.stored));
        output.push_str(&format!("  無需更新: {}\n", run.counts.no_work));
        output.push_str(&format!("  無資料: {}\n", run.counts.no_data));
        output.push_str(&format!("  失敗: {}\n", run.counts.failed));
        output.push_str(&format!("  略過: {}\n", run.counts.skipped));
        output.push_str(&format!("  抓取筆數: {}\n", run.records_fetched));
        output.push_str(&format!("  影響列數: {}\n", run.rows_affected));
        output.push('\n');

        if !run.error_summary.is_empty() {
            output.push_str("錯誤分類:\n");
            for (kind, count) in &run.error_summary {
                output.push_str(&format!("  {}: {} 次\n", kind, count));
            }
            output.push('\n');
        }

        let failed: Vec<&InstrumentOutcome> = run
            .outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Failed)
            .collect();
        if !failed.is_empty() {
            output.push_str("失敗標的:\n");
            for outcome in failed {
                output.push_str(&format!(
                    "  {} [{}] {}\n",
                    outcome.symbol,
                    outcome.error_kind.as_deref().unwrap_or("unknown"),
                    outcome.error_message.as_deref().unwrap_or("")
                ));
            }
        }

        output
    }

    /// 格式化為JSON
    pub fn format_json(run: &BatchRun) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(run)
    }
}

/// 批次報告輸出端
#[async_trait]
pub trait ReportSink: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, run: &BatchRun) -> Result<(), ReportError>;
}

/// 將報告寫成 JSON 與文字摘要檔
pub struct JsonFileReportSink {
    directory: PathBuf,
}

impl JsonFileReportSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// 檔名不含副檔名，例如 `sync_price_20240301_1a2b3c4d`
    pub fn file_stem(run: &BatchRun) -> String {
        let run_id = run.run_id.simple().to_string();
        format!(
            "sync_{}_{}_{}",
            run.stream,
            format_compact_date(run.as_of),
            &run_id[..8]
        )
    }
}

#[async_trait]
impl ReportSink for JsonFileReportSink {
    fn name(&self) -> &str {
        "json_file"
    }

    async fn publish(&self, run: &BatchRun) -> Result<(), ReportError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let stem = Self::file_stem(run);
        let json_path = self.directory.join(format!("{}.json", stem));
        let text_path = self.directory.join(format!("{}.txt", stem));

        tokio::fs::write(&json_path, ReportFormatter::format_json(run)?).await?;
        tokio::fs::write(&text_path, ReportFormatter::format_text(run)).await?;
        info!(path = %json_path.display(), "批次報告已寫入");
        Ok(())
    }
}

/// 寫入 `sync_update_log` 與 `sync_batch_report`
pub struct PgReportSink<R> {
    repository: R,
}

impl<R: SyncLogRepository> PgReportSink<R> {
    pub fn new(repository: R) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl<R: SyncLogRepository> ReportSink for PgReportSink<R> {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn publish(&self, run: &BatchRun) -> Result<(), ReportError> {
        let entries = run.log_entries();
        let inserted = self.repository.insert_entries(&entries).await?;
        if inserted as usize != entries.len() {
            warn!(expected = entries.len(), inserted, "同步紀錄寫入筆數不符");
        }
        self.repository.upsert_batch_report(&run.to_record()?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_provider::FetchError;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample_run() -> BatchRun {
        let mut run = BatchRun::new(SyncStream::Price, d(2024, 3, 1));

        let mut stored = InstrumentOutcome::new("sh600519", OutcomeStatus::Stored);
        stored.window = Some(FetchWindow::new(d(2024, 1, 2), d(2024, 3, 1)).unwrap());
        stored.records_fetched = 40;
        stored.rows_affected = 40;
        run.record(stored);

        run.record(InstrumentOutcome::new("sz000001", OutcomeStatus::NoWork));
        run.record(InstrumentOutcome::failed(
            "sz000002",
            &SyncError::from(FetchError::SessionClosed),
        ));
        run.record(InstrumentOutcome::skipped("sh601318", "cancelled", "收到取消訊號"));
        run.finish();
        run
    }

    #[test]
    fn test_counts_and_totals() {
        let run = sample_run();
        assert_eq!(run.counts.total, 4);
        assert_eq!(run.counts.stored, 1);
        assert_eq!(run.counts.no_work, 1);
        assert_eq!(run.counts.failed, 1);
        assert_eq!(run.counts.skipped, 1);
        assert_eq!(run.rows_affected, 40);
        assert_eq!(run.error_summary.get("session_closed"), Some(&1));
        assert_eq!(run.failed_symbols(), vec!["sz000002"]);
        // 略過的標的不計入成功率分母
        assert!((run.success_rate() - 2.0 / 3.0).abs() < 1e-9);
        assert!(run.is_finished());
    }

    #[test]
    fn test_status_serializes_as_snake_case() {
        let json = serde_json::to_value(sample_run()).unwrap();
        assert_eq!(json["outcomes"][0]["status"], "stored");
        assert_eq!(json["outcomes"][1]["status"], "no_work");
        assert_eq!(json["outcomes"][2]["error_kind"], "session_closed");
        assert_eq!(json["stream"], "price");
    }

    #[test]
    fn test_log_entries_carry_window() {
        let run = sample_run();
        let entries = run.log_entries();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].window_start, Some(d(2024, 1, 2)));
        assert_eq!(entries[0].rows_affected, 40);
        assert_eq!(entries[3].status, "skipped");
        assert!(entries.iter().all(|e| e.run_id == run.run_id));

        let record = run.to_record().unwrap();
        assert_eq!(record.total, 4);
        assert_eq!(record.failed, 1);
        assert_eq!(record.report.0["counts"]["stored"], 1);
    }

    #[test]
    fn test_text_summary_lists_failures() {
        let text = ReportFormatter::format_text(&sample_run());
        assert!(text.contains("=== 同步報告: price"));
        assert!(text.contains("已寫入: 1"));
        assert!(text.contains("sz000002 [session_closed]"));
    }

    #[tokio::test]
    async fn test_json_file_sink_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileReportSink::new(dir.path().join("reports"));
        let run = sample_run();
        sink.publish(&run).await.unwrap();

        let stem = JsonFileReportSink::file_stem(&run);
        assert!(stem.starts_with("sync_price_20240301_"));
        let json = std::fs::read_to_string(sink.directory().join(format!("{}.json", stem))).unwrap();
        let parsed: BatchRun = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, run);
        assert!(sink.directory().join(format!("{}.txt", stem)).exists());
    }

    #[test]
    fn test_status_from_phase() {
        assert_eq!(OutcomeStatus::from_phase(SyncPhase::NoWorkNeeded), OutcomeStatus::NoWork);
        assert_eq!(OutcomeStatus::from_phase(SyncPhase::Fetching), OutcomeStatus::Failed);
    }
}
