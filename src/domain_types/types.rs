//! 基本領域錯誤定義

use thiserror::Error;

/// 領域層錯誤
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("無效的標的代碼: {input} ({reason})")]
    InvalidInstrument { input: String, reason: String },

    #[error("無效的市場代碼: {0}")]
    InvalidMarket(String),

    #[error("無效的日期區間: {start} > {end}")]
    InvalidWindow { start: String, end: String },

    #[error("無效的同步資料流: {0}")]
    InvalidStream(String),

    #[error("無效的日期格式: {0}")]
    InvalidDate(String),
}

impl DomainError {
    /// 報告中使用的錯誤分類
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::InvalidInstrument { .. } | DomainError::InvalidMarket(_) => {
                "invalid_instrument"
            }
            DomainError::InvalidWindow { .. } => "invalid_window",
            DomainError::InvalidStream(_) => "invalid_stream",
            DomainError::InvalidDate(_) => "invalid_date",
        }
    }

    pub(crate) fn invalid_instrument(input: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInstrument {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// 領域層結果類型
pub type Result<T> = std::result::Result<T, DomainError>;
