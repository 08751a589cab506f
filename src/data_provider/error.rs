use super::vendor::VendorError;
use thiserror::Error;

/// 抓取層錯誤
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// 區間內無資料，由呼叫端記錄為 `no_data` 而非失敗
    #[error("區間內無資料")]
    NoData,

    /// 重試耗盡
    #[error("抓取失敗（嘗試 {attempts} 次）: {last}")]
    FetchFailed { attempts: u32, last: VendorError },

    /// 會話尚未開啟或已關閉
    #[error("供應商會話未開啟")]
    SessionClosed,
}

impl FetchError {
    /// 報告中使用的錯誤分類
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::NoData => "no_data",
            FetchError::FetchFailed { .. } => "fetch_failed",
            FetchError::SessionClosed => "session_closed",
        }
    }
}
