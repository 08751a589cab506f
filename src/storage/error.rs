use std::fmt;
use thiserror::Error;

/// 自然鍵的組成部分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyComponent {
    Symbol,
    TradeDate,
}

impl fmt::Display for KeyComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyComponent::Symbol => f.write_str("symbol"),
            KeyComponent::TradeDate => f.write_str("trade_date"),
        }
    }
}

/// 儲存層錯誤
#[derive(Error, Debug)]
pub enum StoreError {
    /// 批次中有記錄缺少鍵欄位，整批不寫入
    #[error("第 {index} 筆記錄缺少鍵欄位 {component}")]
    MissingKey { index: usize, component: KeyComponent },

    #[error("資料表 {table} 結構不符: {detail}")]
    SchemaMismatch { table: String, detail: String },

    #[error("無法讀取資料表結構: {0}")]
    SchemaIntrospection(#[source] sqlx::Error),

    #[error("無效的資料表名稱: {0}")]
    InvalidTableName(String),

    #[error("資料庫錯誤: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// 報告中使用的錯誤分類
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::MissingKey { .. } => "missing_key",
            StoreError::SchemaMismatch { .. } => "schema_mismatch",
            StoreError::SchemaIntrospection(_) => "schema_introspection",
            StoreError::InvalidTableName(_) => "invalid_table_name",
            StoreError::Database(_) => "storage",
        }
    }

    /// 是否為連線或結構層級的問題；這類錯誤會影響所有標的
    pub fn is_connectivity(&self) -> bool {
        match self {
            StoreError::SchemaMismatch { .. }
            | StoreError::SchemaIntrospection(_)
            | StoreError::InvalidTableName(_) => true,
            StoreError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Configuration(_)
                    | sqlx::Error::WorkerCrashed
            ),
            StoreError::MissingKey { .. } => false,
        }
    }
}
