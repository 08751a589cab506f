//! 以 CSV 檔案模擬的供應商
//!
//! 每個標的一個檔案 `<data_dir>/<sh600519>.csv`，標頭列即供應商欄位名稱。
//! 無需供應商 SDK 即可執行完整的同步流程。

use super::vendor::{RawRow, VendorClient, VendorError};
use crate::domain_types::{FetchWindow, InstrumentId};
use crate::utils::parse_date;
use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

const DATE_COLUMNS: [&str; 3] = ["date", "trade_date", "trading_date"];

#[derive(Debug)]
pub struct CsvVendorClient {
    data_dir: PathBuf,
    logged_in: AtomicBool,
}

impl CsvVendorClient {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            logged_in: AtomicBool::new(false),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn file_for(&self, instrument: &InstrumentId) -> PathBuf {
        self.data_dir.join(format!("{}.csv", instrument))
    }
}

/// 解析 CSV 內容並篩選區間內的資料列
fn parse_rows(content: &str, window: FetchWindow) -> Result<Vec<RawRow>, VendorError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| VendorError::Decode(format!("讀取標頭失敗: {}", e)))?
        .clone();
    let date_idx = headers
        .iter()
        .position(|h| DATE_COLUMNS.contains(&h))
        .ok_or_else(|| VendorError::Decode("缺少日期欄位".to_string()))?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| VendorError::Decode(format!("讀取資料列失敗: {}", e)))?;
        // 日期無法解析的列保留給正規化器處理
        let in_window = record
            .get(date_idx)
            .and_then(parse_date)
            .map_or(true, |d| window.contains(d));
        if !in_window {
            continue;
        }
        let row: RawRow = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

#[async_trait]
impl VendorClient for CsvVendorClient {
    fn name(&self) -> &str {
        "csv"
    }

    async fn login(&self) -> Result<(), VendorError> {
        match tokio::fs::metadata(&self.data_dir).await {
            Ok(meta) if meta.is_dir() => {
                self.logged_in.store(true, Ordering::SeqCst);
                Ok(())
            }
            Ok(_) => Err(VendorError::Session(format!(
                "{} 不是目錄",
                self.data_dir.display()
            ))),
            Err(e) => Err(VendorError::Session(format!(
                "無法存取 {}: {}",
                self.data_dir.display(),
                e
            ))),
        }
    }

    async fn logout(&self) -> Result<(), VendorError> {
        self.logged_in.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn query_daily(
        &self,
        instrument: &InstrumentId,
        window: FetchWindow,
    ) -> Result<Vec<RawRow>, VendorError> {
        if !self.logged_in.load(Ordering::SeqCst) {
            return Err(VendorError::Session("尚未登入".to_string()));
        }

        let path = self.file_for(instrument);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(symbol = %instrument, path = %path.display(), "找不到資料檔");
                return Err(VendorError::NoData);
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(VendorError::Decode(format!("{}: {}", path.display(), e)));
            }
            Err(e) => return Err(VendorError::Transport(format!("{}: {}", path.display(), e))),
        };

        let rows = parse_rows(&content, window)?;
        if rows.is_empty() {
            return Err(VendorError::NoData);
        }
        Ok(rows)
    }
}
