//! 批次同步協調器
//!
//! 依序處理每個標的：推算區間、抓取、寫入。單一標的失敗只記錄在報告中，
//! 只有交易日曆或儲存連線層級的錯誤會中止整個批次。

use crate::calendar::TradingCalendar;
use crate::data_provider::{FetchError, ObservationSource};
use crate::domain_types::{DomainError, InstrumentId, SyncStream};
use crate::monitor::SyncMetrics;
use crate::storage::ObservationStore;
use crate::sync::error::SyncError;
use crate::sync::report::{BatchRun, InstrumentOutcome, OutcomeStatus, ReportSink};
use crate::sync::resolver::{IncrementalRangeResolver, Resolution};
use crate::sync::state::{InstrumentProgress, SyncPhase};
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// 取消訊號，只在標的之間檢查
///
/// 一次取消只作用於進行中（或下一次開始）的批次，批次結束時清除。
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    flag: Arc<AtomicBool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// 批次輸入：已解析的標的或無法解析的原始代碼
enum BatchEntry {
    Valid(InstrumentId),
    Invalid { raw: String, error: DomainError },
}

impl BatchEntry {
    fn label(&self) -> String {
        match self {
            BatchEntry::Valid(id) => id.to_string(),
            BatchEntry::Invalid { raw, .. } => raw.clone(),
        }
    }
}

pub struct BatchOrchestrator {
    resolver: IncrementalRangeResolver,
    source: Arc<dyn ObservationSource>,
    store: Arc<dyn ObservationStore>,
    sinks: Vec<Arc<dyn ReportSink>>,
    cancel: CancelSignal,
}

impl BatchOrchestrator {
    pub fn new(
        calendar: Arc<TradingCalendar>,
        source: Arc<dyn ObservationSource>,
        store: Arc<dyn ObservationStore>,
        stream: SyncStream,
        earliest_date: NaiveDate,
    ) -> Self {
        let resolver = IncrementalRangeResolver::new(calendar, store.clone(), stream, earliest_date);
        Self {
            resolver,
            source,
            store,
            sinks: Vec::new(),
            cancel: CancelSignal::new(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn stream(&self) -> SyncStream {
        self.resolver.stream()
    }

    pub fn resolver(&self) -> &IncrementalRangeResolver {
        &self.resolver
    }

    /// 可跨任務傳遞的取消訊號
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub async fn run(
        &self,
        instruments: &[InstrumentId],
        as_of: NaiveDate,
    ) -> Result<BatchRun, SyncError> {
        let entries: Vec<BatchEntry> = instruments.iter().cloned().map(BatchEntry::Valid).collect();
        self.run_entries(entries, as_of).await
    }

    /// 先解析原始代碼；無法解析的代碼記為失敗而不中止批次
    pub async fn run_raw<S: AsRef<str>>(
        &self,
        raw_codes: &[S],
        as_of: NaiveDate,
    ) -> Result<BatchRun, SyncError> {
        let entries = raw_codes
            .iter()
            .map(|raw| {
                let raw = raw.as_ref();
                match InstrumentId::parse(raw) {
                    Ok(id) => BatchEntry::Valid(id),
                    Err(error) => BatchEntry::Invalid {
                        raw: raw.trim().to_string(),
                        error,
                    },
                }
            })
            .collect();
        self.run_entries(entries, as_of).await
    }

    async fn run_entries(
        &self,
        entries: Vec<BatchEntry>,
        as_of: NaiveDate,
    ) -> Result<BatchRun, SyncError> {
        let started = Instant::now();
        let stream = self.stream();
        let mut run = BatchRun::new(stream, as_of);
        info!(
            run_id = %run.run_id,
            stream = %stream,
            %as_of,
            instruments = entries.len(),
            "開始批次同步"
        );

        // 登入失敗不中止，抓取時會重新登入
        if let Err(err) = self.source.open().await {
            warn!(error = %err, "開啟供應商會話失敗");
        }

        let mut abort_reason: Option<String> = None;
        for (index, entry) in entries.iter().enumerate() {
            if let Some(reason) = &abort_reason {
                self.record(&mut run, InstrumentOutcome::skipped(entry.label(), "aborted", reason.clone()));
                continue;
            }
            if self.cancel.is_cancelled() {
                if run.interrupted.is_none() {
                    warn!(remaining = entries.len() - index, "收到取消訊號，停止處理");
                    run.interrupted = Some("cancelled".to_string());
                }
                self.record(&mut run, InstrumentOutcome::skipped(entry.label(), "cancelled", "收到取消訊號"));
                continue;
            }

            let instrument = match entry {
                BatchEntry::Valid(id) => id,
                BatchEntry::Invalid { raw, error } => {
                    warn!(raw = %raw, error = %error, "無法解析標的代碼");
                    let err = SyncError::from(error.clone());
                    self.record(&mut run, InstrumentOutcome::failed(raw.clone(), &err));
                    continue;
                }
            };

            let span = info_span!("sync_instrument", symbol = %instrument, index);
            let (outcome, fatal) = self.sync_instrument(instrument, as_of).instrument(span).await;
            self.record(&mut run, outcome);
            if let Some(err) = fatal {
                error!(symbol = %instrument, error = %err, "批次中止");
                abort_reason = Some(err.to_string());
                run.interrupted = Some(format!("aborted: {}", err));
            }
        }

        self.source.close().await;
        self.cancel.reset();
        run.finish();
        SyncMetrics::record_batch(stream.as_str(), started.elapsed());
        info!(
            run_id = %run.run_id,
            total = run.counts.total,
            stored = run.counts.stored,
            no_work = run.counts.no_work,
            no_data = run.counts.no_data,
            failed = run.counts.failed,
            skipped = run.counts.skipped,
            rows_affected = run.rows_affected,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "批次同步結束"
        );

        self.publish(&run).await;

        match abort_reason {
            Some(reason) => Err(SyncError::BatchAborted {
                reason,
                report: Box::new(run),
            }),
            None => Ok(run),
        }
    }

    fn record(&self, run: &mut BatchRun, outcome: InstrumentOutcome) {
        SyncMetrics::record_outcome(self.stream().as_str(), outcome.status.as_str());
        run.record(outcome);
    }

    async fn publish(&self, run: &BatchRun) {
        for sink in &self.sinks {
            if let Err(err) = sink.publish(run).await {
                warn!(sink = sink.name(), error = %err, "批次報告輸出失敗");
            }
        }
    }

    /// 處理單一標的；第二個值為需要中止批次的錯誤
    async fn sync_instrument(
        &self,
        instrument: &InstrumentId,
        as_of: NaiveDate,
    ) -> (InstrumentOutcome, Option<SyncError>) {
        let started = Instant::now();
        let mut progress = InstrumentProgress::new();
        let mut outcome = InstrumentOutcome::new(instrument.to_string(), OutcomeStatus::Failed);

        let fatal = match self.drive(instrument, as_of, &mut progress, &mut outcome).await {
            Ok(()) => None,
            Err(err) => {
                progress.fail();
                outcome = outcome.with_error(err.kind(), err.to_string());
                if err.is_batch_fatal() {
                    Some(err)
                } else {
                    warn!(error = %err, kind = err.kind(), "標的同步失敗");
                    None
                }
            }
        };

        outcome.status = OutcomeStatus::from_phase(progress.phase());
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            status = outcome.status.as_str(),
            records = outcome.records_fetched,
            rows_affected = outcome.rows_affected,
            "標的同步完成"
        );
        (outcome, fatal)
    }

    async fn drive(
        &self,
        instrument: &InstrumentId,
        as_of: NaiveDate,
        progress: &mut InstrumentProgress,
        outcome: &mut InstrumentOutcome,
    ) -> Result<(), SyncError> {
        progress.advance(SyncPhase::Resolving)?;
        let resolution = self.resolver.resolve(instrument, as_of).await?;
        outcome.last_persisted = resolution.last_persisted();

        let window = match resolution {
            Resolution::NoWork { .. } => {
                progress.advance(SyncPhase::NoWorkNeeded)?;
                return Ok(());
            }
            Resolution::Fetch { window, .. } => window,
        };
        outcome.window = Some(window);

        progress.advance(SyncPhase::Fetching)?;
        let records = match self.source.fetch(instrument, window).await {
            Ok(records) if records.is_empty() => {
                progress.advance(SyncPhase::NoData)?;
                return Ok(());
            }
            Ok(records) => records,
            Err(FetchError::NoData) => {
                info!(%window, "區間內無資料");
                progress.advance(SyncPhase::NoData)?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        outcome.records_fetched = records.len() as u64;

        let written = self.store.upsert(&records).await?;
        self.store.invalidate_cache(instrument);
        outcome.rows_affected = written.affected_rows;
        outcome.skipped_duplicates = written.report.skipped_duplicates;
        progress.advance(SyncPhase::Stored)?;
        Ok(())
    }
}
