//! 記憶體內的觀測資料儲存
//!
//! 與 [`PgObservationStore`](super::PgObservationStore) 相同的寫入語義，
//! 用於本機演練與測試。可注入寫入失敗或連線中斷。

use crate::domain_types::{InstrumentId, ObservationField, ObservationRecord, SyncStream};
use crate::storage::error::StoreError;
use crate::storage::models::UpsertOutcome;
use crate::storage::repository::{prepare_batch, ObservationStore};
use crate::storage::schema::{FieldMapping, TableSchema};
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredRow {
    /// 資料表欄位 -> 值
    values: BTreeMap<String, Decimal>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

pub struct MemoryObservationStore {
    schema: TableSchema,
    mapping: RwLock<Option<Arc<FieldMapping>>>,
    rows: RwLock<BTreeMap<(InstrumentId, NaiveDate), StoredRow>>,
    last_dates: DashMap<(InstrumentId, SyncStream), Option<NaiveDate>>,
    /// 實際計算最後日期（未命中快取）的次數
    date_queries: AtomicU64,
    failing_symbols: DashSet<InstrumentId>,
    unavailable: AtomicBool,
}

impl Default for MemoryObservationStore {
    fn default() -> Self {
        Self::new(TableSchema::standard("stock_daily_data"))
    }
}

impl MemoryObservationStore {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            mapping: RwLock::new(None),
            rows: RwLock::new(BTreeMap::new()),
            last_dates: DashMap::new(),
            date_queries: AtomicU64::new(0),
            failing_symbols: DashSet::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// 之後寫入包含該標的的批次都會失敗
    pub fn fail_writes_for(&self, instrument: &InstrumentId) {
        self.failing_symbols.insert(instrument.clone());
    }

    /// 模擬資料庫無法連線
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
        if unavailable {
            self.invalidate_schema();
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    pub fn row_count_for(&self, instrument: &InstrumentId) -> usize {
        self.rows
            .read()
            .keys()
            .filter(|(id, _)| id == instrument)
            .count()
    }

    pub fn date_queries(&self) -> u64 {
        self.date_queries.load(Ordering::SeqCst)
    }

    /// 讀回一列，欄位名稱還原為記錄欄位名稱
    pub fn get(&self, instrument: &InstrumentId, date: NaiveDate) -> Option<ObservationRecord> {
        let mapping = self.mapping.read().clone()?;
        let rows = self.rows.read();
        let stored = rows.get(&(instrument.clone(), date))?;
        let mut record = ObservationRecord::new(instrument.clone(), date);
        for (column, value) in &stored.values {
            let name = ObservationField::ALL
                .iter()
                .find(|f| mapping.column_for(f.name()) == Some(column.as_str()))
                .map_or(column.as_str(), |f| f.name());
            record.set_named(name, Some(*value));
        }
        Some(record)
    }

    /// 該列最後更新時間
    pub fn updated_at(&self, instrument: &InstrumentId, date: NaiveDate) -> Option<DateTime<Utc>> {
        self.rows
            .read()
            .get(&(instrument.clone(), date))
            .map(|r| r.updated_at)
    }

    pub fn created_at(&self, instrument: &InstrumentId, date: NaiveDate) -> Option<DateTime<Utc>> {
        self.rows
            .read()
            .get(&(instrument.clone(), date))
            .map(|r| r.created_at)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::SchemaIntrospection(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ObservationStore for MemoryObservationStore {
    async fn ensure_schema(&self) -> Result<Arc<FieldMapping>, StoreError> {
        self.check_available()?;
        if let Some(mapping) = self.mapping.read().clone() {
            return Ok(mapping);
        }
        let mapping = Arc::new(FieldMapping::build(&self.schema)?);
        *self.mapping.write() = Some(mapping.clone());
        Ok(mapping)
    }

    async fn upsert(&self, records: &[ObservationRecord]) -> Result<UpsertOutcome, StoreError> {
        let mapping = self.ensure_schema().await?;
        let batch = prepare_batch(records, &mapping)?;

        if let Some(row) = batch
            .rows
            .iter()
            .find(|r| self.failing_symbols.contains(&r.symbol))
        {
            return Err(StoreError::Database(sqlx::Error::Protocol(format!(
                "寫入 {} 失敗",
                row.symbol
            ))));
        }

        let mut outcome = UpsertOutcome::empty(mapping.version());
        outcome.report.received = records.len() as u64;
        outcome.report.submitted = batch.rows.len() as u64;
        outcome.report.skipped_duplicates = batch.skipped_duplicates;
        outcome.report.dropped_fields = batch.dropped_fields;

        let now = Utc::now();
        let mut rows = self.rows.write();
        for prepared in batch.rows {
            let key = (prepared.symbol, prepared.trade_date);
            match rows.get_mut(&key) {
                None => {
                    rows.insert(
                        key,
                        StoredRow {
                            values: prepared.values,
                            created_at: now,
                            updated_at: now,
                        },
                    );
                    outcome.affected_rows += 1;
                }
                Some(existing) => {
                    let mut changed = false;
                    for (column, value) in prepared.values {
                        if existing.values.get(&column) != Some(&value) {
                            existing.values.insert(column, value);
                            changed = true;
                        }
                    }
                    if changed {
                        existing.updated_at = now;
                        outcome.affected_rows += 1;
                    }
                }
            }
        }
        Ok(outcome)
    }

    async fn last_persisted_date(
        &self,
        instrument: &InstrumentId,
        stream: SyncStream,
    ) -> Result<Option<NaiveDate>, StoreError> {
        let key = (instrument.clone(), stream);
        if let Some(hit) = self.last_dates.get(&key) {
            return Ok(*hit);
        }

        let mapping = self.ensure_schema().await?;
        self.date_queries.fetch_add(1, Ordering::SeqCst);
        let required = mapping.stream_columns(stream)?;
        let date = self
            .rows
            .read()
            .iter()
            .filter(|((id, _), _)| id == instrument)
            .filter(|(_, row)| {
                required.is_empty() || required.iter().any(|c| row.values.contains_key(*c))
            })
            .map(|((_, date), _)| *date)
            .max();
        self.last_dates.insert(key, date);
        Ok(date)
    }

    fn invalidate_cache(&self, instrument: &InstrumentId) {
        self.last_dates.retain(|(id, _), _| id != instrument);
    }

    fn invalidate_schema(&self) {
        *self.mapping.write() = None;
    }
}
