//! 資料表結構與欄位映射
//!
//! 結構只在第一次寫入前讀取一次，之後所有寫入都查詢同一份 [`FieldMapping`]，
//! 不再逐次探測欄位是否存在。

use super::error::StoreError;
use crate::domain_types::{ObservationField, SyncStream};
use sqlx::PgPool;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

const SYMBOL_CANDIDATES: [&str; 2] = ["symbol", "ts_code"];
const DATE_CANDIDATES: [&str; 2] = ["trade_date", "trading_date"];
const RESERVED_COLUMNS: [&str; 3] = ["id", "created_at", "updated_at"];

/// 資料表名稱只接受 `[A-Za-z_][A-Za-z0-9_]*`，可帶一層 schema 前綴
pub fn validate_table_name(name: &str) -> Result<(), StoreError> {
    let valid_ident = |s: &str| {
        let mut chars = s.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    let ok = match name.split_once('.') {
        Some((schema, table)) => valid_ident(schema) && valid_ident(table),
        None => valid_ident(name),
    };
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidTableName(name.to_string()))
    }
}

/// 以雙引號包住識別字
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// 資料表名稱加上引號，保留 schema 前綴
pub fn quote_table(name: &str) -> String {
    match name.split_once('.') {
        Some((schema, table)) => format!("{}.{}", quote_ident(schema), quote_ident(table)),
        None => quote_ident(name),
    }
}

/// 資料表的欄位集合（小寫）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    table: String,
    columns: BTreeSet<String>,
}

impl TableSchema {
    pub fn new<I, S>(table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            table: table.to_string(),
            columns: columns
                .into_iter()
                .map(|c| c.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// 與內建遷移建立的資料表一致
    pub fn standard(table: &str) -> Self {
        let mut columns: Vec<&str> = vec!["id", "symbol", "trade_date", "created_at", "updated_at"];
        columns.extend(ObservationField::ALL.iter().map(|f| f.name()));
        Self::new(table, columns)
    }

    /// 從 information_schema 讀取
    pub async fn introspect(pool: &PgPool, table: &str) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        let (schema, name) = match table.split_once('.') {
            Some((schema, name)) => (Some(schema), name),
            None => (None, table),
        };

        let columns: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT column_name::text
            FROM information_schema.columns
            WHERE table_schema = COALESCE($1, current_schema())
              AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(schema)
        .bind(name)
        .fetch_all(pool)
        .await
        .map_err(StoreError::SchemaIntrospection)?;

        if columns.is_empty() {
            return Err(StoreError::SchemaMismatch {
                table: table.to_string(),
                detail: "資料表不存在或沒有欄位".to_string(),
            });
        }
        debug!(table, columns = columns.len(), "讀取資料表結構");
        Ok(Self::new(table, columns))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column.to_ascii_lowercase())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }
}

/// 欄位映射表
///
/// 每個規範欄位對應到候選清單中第一個存在的資料表欄位；不在規範欄位表中、
/// 但資料表剛好有同名欄位的擴充欄位也會寫入。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    version: u32,
    table: String,
    symbol_column: String,
    date_column: String,
    /// 規範欄位名稱 -> 資料表欄位
    canonical: BTreeMap<&'static str, String>,
    /// 可直接同名寫入的其他欄位
    passthrough: BTreeSet<String>,
    has_created_at: bool,
    has_updated_at: bool,
}

impl FieldMapping {
    /// 映射規則版本；規則變動時遞增
    pub const VERSION: u32 = 1;

    pub fn build(schema: &TableSchema) -> Result<Self, StoreError> {
        let pick = |candidates: &[&str]| {
            candidates
                .iter()
                .find(|c| schema.has_column(c))
                .map(|c| c.to_string())
        };
        let mismatch = |detail: &str| StoreError::SchemaMismatch {
            table: schema.table().to_string(),
            detail: detail.to_string(),
        };

        let symbol_column = pick(&SYMBOL_CANDIDATES).ok_or_else(|| mismatch("缺少代碼欄位"))?;
        let date_column = pick(&DATE_CANDIDATES).ok_or_else(|| mismatch("缺少日期欄位"))?;

        let canonical: BTreeMap<&'static str, String> = ObservationField::ALL
            .iter()
            .filter_map(|f| pick(f.column_candidates()).map(|col| (f.name(), col)))
            .collect();

        let used: BTreeSet<&str> = canonical
            .values()
            .map(String::as_str)
            .chain([symbol_column.as_str(), date_column.as_str()])
            .chain(RESERVED_COLUMNS)
            .collect();
        let passthrough = schema
            .columns()
            .filter(|c| !used.contains(c))
            .map(str::to_string)
            .collect();

        Ok(Self {
            version: Self::VERSION,
            table: schema.table().to_string(),
            symbol_column,
            date_column,
            canonical,
            passthrough,
            has_created_at: schema.has_column("created_at"),
            has_updated_at: schema.has_column("updated_at"),
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn symbol_column(&self) -> &str {
        &self.symbol_column
    }

    pub fn date_column(&self) -> &str {
        &self.date_column
    }

    pub fn has_created_at(&self) -> bool {
        self.has_created_at
    }

    pub fn has_updated_at(&self) -> bool {
        self.has_updated_at
    }

    /// 記錄欄位名稱對應的資料表欄位；無對應時回傳 `None`
    pub fn column_for(&self, field: &str) -> Option<&str> {
        if let Some(col) = self.canonical.get(field) {
            return Some(col.as_str());
        }
        let lower = field.to_ascii_lowercase();
        self.passthrough.get(&lower).map(String::as_str)
    }

    /// 已映射的估值因子欄位
    pub fn factor_columns(&self) -> Vec<&str> {
        ObservationField::FACTORS
            .iter()
            .filter_map(|f| self.canonical.get(f.name()).map(String::as_str))
            .collect()
    }

    /// 計算資料流最後日期時需要至少一個非空的欄位；價格流不限制
    pub fn stream_columns(&self, stream: SyncStream) -> Result<Vec<&str>, StoreError> {
        match stream {
            SyncStream::Price => Ok(Vec::new()),
            SyncStream::Factor => {
                let factors = self.factor_columns();
                if factors.is_empty() {
                    return Err(StoreError::SchemaMismatch {
                        table: self.table.clone(),
                        detail: "沒有任何估值因子欄位，無法同步因子資料流".to_string(),
                    });
                }
                Ok(factors)
            }
        }
    }
}
