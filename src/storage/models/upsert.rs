use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 寫入報告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageReport {
    /// 呼叫端傳入的記錄數
    pub received: u64,
    /// 去重後實際送出的記錄數
    pub submitted: u64,
    /// 同批次內重複鍵，保留第一筆，其餘略過
    pub skipped_duplicates: u64,
    /// 資料表沒有對應欄位而被丟棄的欄位名稱
    pub dropped_fields: BTreeSet<String>,
    /// 使用的欄位映射版本
    pub mapping_version: u32,
    pub duration_ms: u64,
}

/// 寫入結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    /// 新增或內容實際改變的列數；重寫相同資料不計入
    pub affected_rows: u64,
    pub report: StorageReport,
}

impl UpsertOutcome {
    pub fn empty(mapping_version: u32) -> Self {
        Self {
            affected_rows: 0,
            report: StorageReport {
                mapping_version,
                ..Default::default()
            },
        }
    }
}
