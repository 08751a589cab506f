use crate::storage::error::StoreError;
use crate::storage::models::{BatchReportRecord, SyncLogEntry, SyncLogInsert};
use crate::storage::repository::DbExecutor;
use sqlx::{PgPool, QueryBuilder};

/// 同步紀錄存取接口
#[async_trait::async_trait]
pub trait SyncLogRepository: Send + Sync + DbExecutor {
    /// 批次寫入單一標的紀錄，回傳寫入筆數
    async fn insert_entries(&self, entries: &[SyncLogInsert]) -> Result<u64, StoreError>;

    /// 寫入或更新批次報告
    async fn upsert_batch_report(&self, record: &BatchReportRecord) -> Result<(), StoreError>;

    async fn recent_entries(&self, symbol: &str, limit: i64)
        -> Result<Vec<SyncLogEntry>, StoreError>;

    async fn latest_batch_report(&self, stream: &str)
        -> Result<Option<BatchReportRecord>, StoreError>;
}

/// PostgreSQL 同步紀錄存取實現
pub struct PgSyncLogRepository {
    pool: PgPool,
}

impl PgSyncLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DbExecutor for PgSyncLogRepository {
    fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl SyncLogRepository for PgSyncLogRepository {
    async fn insert_entries(&self, entries: &[SyncLogInsert]) -> Result<u64, StoreError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut tx = self.get_pool().begin().await?;
        let mut inserted = 0u64;
        // 每列 10 個參數，遠低於 65535 的上限
        for chunk in entries.chunks(1000) {
            let mut qb = QueryBuilder::new(
                "INSERT INTO sync_update_log (run_id, symbol, stream, status, error_kind, \
                 error_message, window_start, window_end, records_fetched, rows_affected) ",
            );
            qb.push_values(chunk, |mut b, e| {
                b.push_bind(e.run_id)
                    .push_bind(e.symbol.clone())
                    .push_bind(e.stream.clone())
                    .push_bind(e.status.clone())
                    .push_bind(e.error_kind.clone())
                    .push_bind(e.error_message.clone())
                    .push_bind(e.window_start)
                    .push_bind(e.window_end)
                    .push_bind(e.records_fetched)
                    .push_bind(e.rows_affected);
            });
            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    async fn upsert_batch_report(&self, record: &BatchReportRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sync_batch_report (
                run_id, stream, as_of, started_at, finished_at,
                total, stored, no_work, no_data, failed, skipped, rows_affected, report
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (run_id) DO UPDATE SET
                finished_at = EXCLUDED.finished_at,
                total = EXCLUDED.total,
                stored = EXCLUDED.stored,
                no_work = EXCLUDED.no_work,
                no_data = EXCLUDED.no_data,
                failed = EXCLUDED.failed,
                skipped = EXCLUDED.skipped,
                rows_affected = EXCLUDED.rows_affected,
                report = EXCLUDED.report
            "#,
        )
        .bind(record.run_id)
        .bind(&record.stream)
        .bind(record.as_of)
        .bind(record.started_at)
        .bind(record.finished_at)
        .bind(record.total)
        .bind(record.stored)
        .bind(record.no_work)
        .bind(record.no_data)
        .bind(record.failed)
        .bind(record.skipped)
        .bind(record.rows_affected)
        .bind(&record.report)
        .execute(self.get_pool())
        .await?;
        Ok(())
    }

    async fn recent_entries(
        &self,
        symbol: &str,
        limit: i64,
    ) -> Result<Vec<SyncLogEntry>, StoreError> {
        let entries = sqlx::query_as::<_, SyncLogEntry>(
            r#"
            SELECT log_id, run_id, symbol, stream, status, error_kind, error_message,
                   window_start, window_end, records_fetched, rows_affected, logged_at
            FROM sync_update_log
            WHERE symbol = $1
            ORDER BY logged_at DESC, log_id DESC
            LIMIT $2
            "#,
        )
        .bind(symbol)
        .bind(limit)
        .fetch_all(self.get_pool())
        .await?;
        Ok(entries)
    }

    async fn latest_batch_report(
        &self,
        stream: &str,
    ) -> Result<Option<BatchReportRecord>, StoreError> {
        let record = sqlx::query_as::<_, BatchReportRecord>(
            r#"
            SELECT run_id, stream, as_of, started_at, finished_at,
                   total, stored, no_work, no_data, failed, skipped, rows_affected, report
            FROM sync_batch_report
            WHERE stream = $1
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
        .bind(stream)
        .fetch_optional(self.get_pool())
        .await?;
        Ok(record)
    }
}
