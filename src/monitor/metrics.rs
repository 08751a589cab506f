// monitor/metrics.rs - 同步引擎監控指標
//
// 只透過 `metrics` facade 記錄，是否匯出由宿主程式決定。

use metrics::{counter, histogram};
use std::time::Duration;

/// 監控指標命名空間
pub const METRIC_NAMESPACE: &str = "market_sync";

/// 同步引擎指標記錄器
pub struct SyncMetrics;

impl SyncMetrics {
    /// 記錄一次供應商呼叫
    pub fn record_vendor_call(vendor: &str, ok: bool, latency: Duration) {
        counter!(
            format!("{}.vendor_calls", METRIC_NAMESPACE),
            "vendor" => vendor.to_string(),
            "result" => if ok { "ok" } else { "error" }
        )
        .increment(1);
        histogram!(
            format!("{}.vendor_latency_ms", METRIC_NAMESPACE),
            "vendor" => vendor.to_string()
        )
        .record(latency.as_secs_f64() * 1000.0);
    }

    /// 記錄一次重試
    pub fn record_retry(vendor: &str, fault: &'static str) {
        counter!(
            format!("{}.fetch_retries", METRIC_NAMESPACE),
            "vendor" => vendor.to_string(),
            "fault" => fault
        )
        .increment(1);
    }

    /// 記錄重試耗盡
    pub fn record_fetch_failure(vendor: &str) {
        counter!(
            format!("{}.fetch_failures", METRIC_NAMESPACE),
            "vendor" => vendor.to_string()
        )
        .increment(1);
    }

    /// 記錄寫入結果
    pub fn record_upsert(affected: u64, skipped_duplicates: u64, latency: Duration) {
        counter!(format!("{}.rows_upserted", METRIC_NAMESPACE)).increment(affected);
        if skipped_duplicates > 0 {
            counter!(format!("{}.rows_skipped_duplicate", METRIC_NAMESPACE))
                .increment(skipped_duplicates);
        }
        histogram!(format!("{}.upsert_latency_ms", METRIC_NAMESPACE))
            .record(latency.as_secs_f64() * 1000.0);
    }

    /// 記錄單一標的的終態
    pub fn record_outcome(stream: &'static str, status: &'static str) {
        counter!(
            format!("{}.instrument_outcomes", METRIC_NAMESPACE),
            "stream" => stream,
            "status" => status
        )
        .increment(1);
    }

    /// 記錄批次耗時
    pub fn record_batch(stream: &'static str, duration: Duration) {
        histogram!(
            format!("{}.batch_duration_secs", METRIC_NAMESPACE),
            "stream" => stream
        )
        .record(duration.as_secs_f64());
    }
}
