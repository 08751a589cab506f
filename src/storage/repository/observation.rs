use crate::config::SyncConfig;
use crate::domain_types::{InstrumentId, ObservationRecord, SyncStream};
use crate::monitor::SyncMetrics;
use crate::storage::error::StoreError;
use crate::storage::models::{StorageReport, UpsertOutcome};
use crate::storage::repository::{
    prepare_batch, DbExecutor, ObservationStore, PreparedBatch, PreparedRow,
};
use crate::storage::schema::{quote_ident, quote_table, validate_table_name, FieldMapping, TableSchema};
use chrono::NaiveDate;
use dashmap::DashMap;
use parking_lot::RwLock;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// PostgreSQL 觀測資料儲存
pub struct PgObservationStore {
    pool: PgPool,
    table: String,
    batch_size: usize,
    mapping: RwLock<Option<Arc<FieldMapping>>>,
    last_dates: DashMap<(InstrumentId, SyncStream), Option<NaiveDate>>,
}

impl PgObservationStore {
    pub fn new(pool: PgPool, table: &str, batch_size: usize) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
            batch_size: batch_size.max(1),
            mapping: RwLock::new(None),
            last_dates: DashMap::new(),
        })
    }

    pub fn from_config(pool: PgPool, config: &SyncConfig) -> Result<Self, StoreError> {
        Self::new(pool, &config.table_name, config.batch_insert_size)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn cached_mapping(&self) -> Option<Arc<FieldMapping>> {
        self.mapping.read().clone()
    }
}

impl DbExecutor for PgObservationStore {
    fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

/// PostgreSQL 單一語句的綁定參數上限
const PG_MAX_BINDS: usize = u16::MAX as usize;

/// 單一語句可容納的列數；每列綁定鍵欄位與 `columns` 個值欄位
fn rows_per_statement(batch_size: usize, columns: usize) -> usize {
    let per_row = 2 + columns;
    batch_size.min(PG_MAX_BINDS / per_row).max(1)
}

/// 組出單一分段的 upsert 語句
///
/// 鍵衝突時每個欄位取 `COALESCE(新值, 舊值)`，並且只在至少一個欄位真的改變
/// 時才更新，因此重寫相同資料不會計入受影響列數。
fn build_upsert<'a>(mapping: &FieldMapping, rows: &'a [PreparedRow]) -> QueryBuilder<'a, Postgres> {
    let columns: Vec<&str> = PreparedBatch::columns(rows).into_iter().collect();
    let symbol_col = quote_ident(mapping.symbol_column());
    let date_col = quote_ident(mapping.date_column());

    let mut insert_cols = vec![symbol_col.clone(), date_col.clone()];
    insert_cols.extend(columns.iter().map(|c| quote_ident(c)));
    if mapping.has_created_at() {
        insert_cols.push(quote_ident("created_at"));
    }
    if mapping.has_updated_at() {
        insert_cols.push(quote_ident("updated_at"));
    }

    let mut qb: QueryBuilder<'a, Postgres> = QueryBuilder::new(format!(
        "INSERT INTO {} AS t ({}) ",
        quote_table(mapping.table()),
        insert_cols.join(", ")
    ));

    qb.push_values(rows, |mut b, row| {
        b.push_bind(row.symbol.to_string());
        b.push_bind(row.trade_date);
        for col in &columns {
            b.push_bind(row.values.get(*col).copied());
        }
        if mapping.has_created_at() {
            b.push("now()");
        }
        if mapping.has_updated_at() {
            b.push("now()");
        }
    });

    qb.push(format!(" ON CONFLICT ({}, {}) ", symbol_col, date_col));
    if columns.is_empty() {
        qb.push("DO NOTHING");
        return qb;
    }

    let mut assignments: Vec<String> = columns
        .iter()
        .map(|c| {
            let col = quote_ident(c);
            format!("{col} = COALESCE(EXCLUDED.{col}, t.{col})")
        })
        .collect();
    if mapping.has_updated_at() {
        assignments.push(format!("{} = now()", quote_ident("updated_at")));
    }
    let changed: Vec<String> = columns
        .iter()
        .map(|c| {
            let col = quote_ident(c);
            format!("(EXCLUDED.{col} IS NOT NULL AND EXCLUDED.{col} IS DISTINCT FROM t.{col})")
        })
        .collect();

    qb.push("DO UPDATE SET ");
    qb.push(assignments.join(", "));
    qb.push(" WHERE ");
    qb.push(changed.join(" OR "));
    qb
}

#[async_trait::async_trait]
impl ObservationStore for PgObservationStore {
    async fn ensure_schema(&self) -> Result<Arc<FieldMapping>, StoreError> {
        if let Some(mapping) = self.cached_mapping() {
            return Ok(mapping);
        }

        let schema = TableSchema::introspect(&self.pool, &self.table).await?;
        let mapping = Arc::new(FieldMapping::build(&schema)?);
        info!(
            table = %self.table,
            version = mapping.version(),
            symbol_column = mapping.symbol_column(),
            date_column = mapping.date_column(),
            "建立欄位映射"
        );
        *self.mapping.write() = Some(mapping.clone());
        Ok(mapping)
    }

    async fn upsert(&self, records: &[ObservationRecord]) -> Result<UpsertOutcome, StoreError> {
        let mapping = self.ensure_schema().await?;
        let batch = prepare_batch(records, &mapping)?;
        let mut outcome = UpsertOutcome::empty(mapping.version());
        outcome.report.received = records.len() as u64;
        outcome.report.skipped_duplicates = batch.skipped_duplicates;
        outcome.report.dropped_fields = batch.dropped_fields.clone();
        if batch.rows.is_empty() {
            return Ok(outcome);
        }

        if !batch.dropped_fields.is_empty() {
            debug!(table = %self.table, fields = ?batch.dropped_fields, "資料表沒有對應欄位，略過");
        }

        let chunk_size =
            rows_per_statement(self.batch_size, PreparedBatch::columns(&batch.rows).len());
        let started = Instant::now();
        let mut tx = self.pool.begin().await?;
        let mut affected = 0u64;
        for chunk in batch.rows.chunks(chunk_size) {
            let mut query = build_upsert(&mapping, chunk);
            let result = query.build().execute(&mut *tx).await?;
            affected += result.rows_affected();
        }
        tx.commit().await?;

        let elapsed = started.elapsed();
        SyncMetrics::record_upsert(affected, batch.skipped_duplicates, elapsed);
        outcome.affected_rows = affected;
        outcome.report = StorageReport {
            submitted: batch.rows.len() as u64,
            duration_ms: elapsed.as_millis() as u64,
            ..outcome.report
        };
        debug!(
            table = %self.table,
            submitted = outcome.report.submitted,
            affected,
            "寫入完成"
        );
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
        let required = mapping.stream_columns(stream)?;
        let mut sql = format!(
            "SELECT MAX({}) FROM {} WHERE {} = $1",
            quote_ident(mapping.date_column()),
            quote_table(mapping.table()),
            quote_ident(mapping.symbol_column()),
        );
        if !required.is_empty() {
            let any_present: Vec<String> = required
                .iter()
                .map(|c| format!("{} IS NOT NULL", quote_ident(c)))
                .collect();
            sql.push_str(&format!(" AND ({})", any_present.join(" OR ")));
        }

        let date: Option<NaiveDate> = sqlx::query_scalar(&sql)
            .bind(instrument.to_string())
            .fetch_one(&self.pool)
            .await?;
        self.last_dates.insert(key, date);
        Ok(date)
    }

    fn invalidate_cache(&self, instrument: &InstrumentId) {
        self.last_dates
            .retain(|(id, _), _| id != instrument);
    }

    fn invalidate_schema(&self) {
        *self.mapping.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::ObservationField;
    use rust_decimal_macros::dec;

    fn rows() -> Vec<PreparedRow> {
        let mapping = FieldMapping::build(&TableSchema::standard("stock_daily_data")).unwrap();
        let records = vec![ObservationRecord::new(
            InstrumentId::parse("sh600519").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        )
        .with(ObservationField::Close, dec!(1712.5))
        .with(ObservationField::PeTtm, dec!(28.1))];
        prepare_batch(&records, &mapping).unwrap().rows
    }

    #[test]
    fn test_upsert_sql_preserves_absent_columns() {
        let mapping = FieldMapping::build(&TableSchema::standard("stock_daily_data")).unwrap();
        let rows = rows();
        let qb = build_upsert(&mapping, &rows);
        let sql = qb.sql().to_string();

        assert!(sql.starts_with("INSERT INTO \"stock_daily_data\" AS t"));
        assert!(sql.contains("ON CONFLICT (\"symbol\", \"trade_date\") DO UPDATE SET"));
        assert!(sql.contains("\"close_price\" = COALESCE(EXCLUDED.\"close_price\", t.\"close_price\")"));
        assert!(sql.contains("\"pe_ttm\" = COALESCE(EXCLUDED.\"pe_ttm\", t.\"pe_ttm\")"));
        assert!(sql.contains("\"updated_at\" = now()"));
        assert!(sql.contains("IS DISTINCT FROM"));
        // 未提供的欄位不出現在語句中
        assert!(!sql.contains("\"open_price\""));
    }

    #[test]
    fn test_statement_stays_within_bind_limit() {
        let config = SyncConfig {
            batch_insert_size: 5000,
            ..Default::default()
        };
        assert!(crate::config::Validator::validate(&config).is_ok());

        let mapping = FieldMapping::build(&TableSchema::standard("stock_daily_data")).unwrap();
        let start = NaiveDate::from_ymd_opt(2005, 1, 4).unwrap();
        let records: Vec<ObservationRecord> = (0..config.batch_insert_size as u64)
            .map(|offset| {
                let day = start + chrono::Days::new(offset);
                ObservationField::ALL.iter().fold(
                    ObservationRecord::new(InstrumentId::parse("sh600519").unwrap(), day),
                    |record, field| record.with(*field, dec!(1.5)),
                )
            })
            .collect();
        let batch = prepare_batch(&records, &mapping).unwrap();
        let columns = PreparedBatch::columns(&batch.rows).len();
        let chunk = rows_per_statement(config.batch_insert_size, columns);
        assert!(chunk < config.batch_insert_size);

        let qb = build_upsert(&mapping, &batch.rows[..chunk]);
        let binds = qb.sql().matches('$').count();
        assert_eq!(binds, chunk * (2 + columns));
        assert!(binds <= PG_MAX_BINDS);
    }

    #[test]
    fn test_rows_per_statement_keeps_small_batches() {
        assert_eq!(rows_per_statement(500, 14), 500);
        assert_eq!(rows_per_statement(0, 14), 1);
        assert_eq!(rows_per_statement(5000, 14), 65535 / 16);
    }

    #[test]
    fn test_key_only_rows_do_nothing_on_conflict() {
        let mapping =
            FieldMapping::build(&TableSchema::new("t", ["symbol", "trade_date"])).unwrap();
        let rows = vec![PreparedRow {
            symbol: InstrumentId::parse("sh600519").unwrap(),
            trade_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            values: Default::default(),
        }];
        let qb = build_upsert(&mapping, &rows);
        let sql = qb.sql().to_string();
        assert!(sql.ends_with("DO NOTHING"));
    }
}
