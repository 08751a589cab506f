//! 外部數據供應商介面
//!
//! 供應商需要顯式登入/登出，且一個會話不可併發使用。
//! 回傳的每一列都是鬆散型別的 `欄位名 -> 值` 映射，欄位缺失或格式錯誤都是可接受的。

use crate::domain_types::{FetchWindow, InstrumentId};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// 供應商原始資料列
pub type RawRow = HashMap<String, serde_json::Value>;

/// 供應商錯誤
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VendorError {
    /// 區間內沒有資料；不是失敗
    #[error("供應商回報無資料")]
    NoData,

    #[error("傳輸錯誤: {0}")]
    Transport(String),

    #[error("解碼錯誤: {0}")]
    Decode(String),

    #[error("供應商錯誤 [{code}]: {message}")]
    Vendor { code: String, message: String },

    #[error("會話錯誤: {0}")]
    Session(String),
}

impl VendorError {
    pub fn vendor(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Vendor {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// 供應商客戶端
#[async_trait]
pub trait VendorClient: Send + Sync {
    /// 供應商名稱，用於日誌與指標標籤
    fn name(&self) -> &str;

    async fn login(&self) -> Result<(), VendorError>;

    async fn logout(&self) -> Result<(), VendorError>;

    /// 查詢日線資料；區間內無資料時可回傳空列表或 [`VendorError::NoData`]
    async fn query_daily(
        &self,
        instrument: &InstrumentId,
        window: FetchWindow,
    ) -> Result<Vec<RawRow>, VendorError>;
}
