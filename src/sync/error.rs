use crate::calendar::CalendarError;
use crate::data_provider::FetchError;
use crate::domain_types::DomainError;
use crate::storage::StoreError;
use crate::sync::report::BatchRun;
use crate::sync::state::SyncPhase;
use thiserror::Error;

/// 同步層錯誤
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Calendar(#[from] CalendarError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("無效的狀態轉換: {from} -> {to}")]
    InvalidTransition { from: SyncPhase, to: SyncPhase },

    /// 批次因全域性錯誤中止，附上已完成部分的報告
    #[error("批次中止: {reason}")]
    BatchAborted {
        reason: String,
        report: Box<BatchRun>,
    },
}

impl SyncError {
    /// 報告中使用的錯誤分類
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Calendar(e) => e.kind(),
            SyncError::Fetch(e) => e.kind(),
            SyncError::Store(e) => e.kind(),
            SyncError::Domain(e) => e.kind(),
            SyncError::InvalidTransition { .. } => "invalid_transition",
            SyncError::BatchAborted { .. } => "batch_aborted",
        }
    }

    /// 會影響所有標的、必須中止整個批次的錯誤
    pub fn is_batch_fatal(&self) -> bool {
        match self {
            SyncError::Calendar(_) => true,
            SyncError::Store(e) => e.is_connectivity(),
            SyncError::BatchAborted { .. } => true,
            SyncError::Fetch(_) | SyncError::Domain(_) | SyncError::InvalidTransition { .. } => {
                false
            }
        }
    }

    /// 中止時取回部分報告
    pub fn into_partial_report(self) -> Option<BatchRun> {
        match self {
            SyncError::BatchAborted { report, .. } => Some(*report),
            _ => None,
        }
    }
}

/// 報告輸出錯誤
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("報告檔案寫入失敗: {0}")]
    Io(#[from] std::io::Error),

    #[error("報告序列化失敗: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("報告寫入資料庫失敗: {0}")]
    Store(#[from] StoreError),
}
