use crate::domain_types::{InstrumentId, ObservationRecord, SyncStream};
use crate::storage::error::{KeyComponent, StoreError};
use crate::storage::models::UpsertOutcome;
use crate::storage::schema::FieldMapping;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

// 重新導出子模塊
pub mod memory;
pub mod observation;
pub mod sync_log;

// 重新導出常用類型
pub use memory::MemoryObservationStore;
pub use observation::PgObservationStore;
pub use sync_log::{PgSyncLogRepository, SyncLogRepository};

/// 通用的數據庫操作特性
pub trait DbExecutor {
    fn get_pool(&self) -> &PgPool;
}

/// 觀測資料儲存
///
/// 寫入語義：以 (標的, 交易日) 為鍵插入；鍵衝突時只覆蓋本次有提供的欄位，
/// 未提供的欄位維持原值。
#[async_trait::async_trait]
pub trait ObservationStore: Send + Sync {
    /// 讀取（或回傳已快取的）欄位映射
    async fn ensure_schema(&self) -> Result<Arc<FieldMapping>, StoreError>;

    async fn upsert(&self, records: &[ObservationRecord]) -> Result<UpsertOutcome, StoreError>;

    /// 該標的在指定資料流上最後一筆已持久化的交易日
    async fn last_persisted_date(
        &self,
        instrument: &InstrumentId,
        stream: SyncStream,
    ) -> Result<Option<NaiveDate>, StoreError>;

    /// 清除該標的的最後日期快取；寫入成功後呼叫
    fn invalidate_cache(&self, instrument: &InstrumentId);

    /// 清除欄位映射快取，下次寫入前重新讀取結構
    fn invalidate_schema(&self);
}

/// 通過鍵檢查與去重、並已換成資料表欄位名稱的一列
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PreparedRow {
    pub symbol: InstrumentId,
    pub trade_date: NaiveDate,
    /// 資料表欄位 -> 值
    pub values: BTreeMap<String, Decimal>,
}

#[derive(Debug, Default)]
pub(crate) struct PreparedBatch {
    pub rows: Vec<PreparedRow>,
    pub skipped_duplicates: u64,
    pub dropped_fields: BTreeSet<String>,
}

impl PreparedBatch {
    /// 本批次出現過的所有資料表欄位
    pub fn columns(rows: &[PreparedRow]) -> BTreeSet<&str> {
        rows.iter()
            .flat_map(|r| r.values.keys().map(String::as_str))
            .collect()
    }
}

/// 寫入前的共同處理
///
/// 任一記錄缺少鍵欄位時整批拒絕；同批次重複鍵保留第一筆。
pub(crate) fn prepare_batch(
    records: &[ObservationRecord],
    mapping: &FieldMapping,
) -> Result<PreparedBatch, StoreError> {
    for (index, record) in records.iter().enumerate() {
        if record.symbol.is_none() {
            return Err(StoreError::MissingKey {
                index,
                component: KeyComponent::Symbol,
            });
        }
        if record.trade_date.is_none() {
            return Err(StoreError::MissingKey {
                index,
                component: KeyComponent::TradeDate,
            });
        }
    }

    let mut batch = PreparedBatch::default();
    let mut seen: HashSet<(&InstrumentId, NaiveDate)> = HashSet::with_capacity(records.len());
    for record in records {
        let Some((symbol, trade_date)) = record.key() else {
            continue;
        };
        if !seen.insert((symbol, trade_date)) {
            batch.skipped_duplicates += 1;
            continue;
        }

        let mut values = BTreeMap::new();
        for (field, value) in record.values() {
            match mapping.column_for(field) {
                Some(column) => {
                    values.insert(column.to_string(), value);
                }
                None => {
                    batch.dropped_fields.insert(field.to_string());
                }
            }
        }
        batch.rows.push(PreparedRow {
            symbol: symbol.clone(),
            trade_date,
            values,
        });
    }
    Ok(batch)
}
