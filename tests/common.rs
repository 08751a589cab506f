#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use market_sync::calendar::TradingCalendar;
use market_sync::data_provider::{FetcherSettings, RawRow, RetryPolicy, VendorClient, VendorError};
use market_sync::domain_types::{FetchWindow, InstrumentId};
use parking_lot::Mutex;
use serde_json::json;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

pub const MIN_INTERVAL: Duration = Duration::from_millis(1500);

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn id(raw: &str) -> InstrumentId {
    InstrumentId::parse(raw).unwrap()
}

/// 測試用抓取設定：短退避、無抖動
pub fn fast_settings() -> FetcherSettings {
    FetcherSettings {
        min_interval: MIN_INTERVAL,
        retry: RetryPolicy::new(3, Duration::from_millis(10), Duration::ZERO),
        max_window_days: 3650,
        clean_factors: true,
    }
}

/// 依交易日曆產生資料的腳本化供應商
pub struct ScriptedVendor {
    calendar: TradingCalendar,
    /// 每次查詢都回傳傳輸錯誤
    failing: Mutex<HashSet<InstrumentId>>,
    /// 收盤價欄位無法解析
    garbled_close: Mutex<HashSet<InstrumentId>>,
    /// 不回傳估值因子
    without_factors: Mutex<HashSet<InstrumentId>>,
    /// 收盤價覆寫
    close_override: Mutex<HashMap<InstrumentId, String>>,
    calls: Mutex<Vec<(InstrumentId, FetchWindow, Instant)>>,
    logins: Mutex<u32>,
}

impl Default for ScriptedVendor {
    fn default() -> Self {
        Self {
            calendar: TradingCalendar::cn_exchange(),
            failing: Mutex::new(HashSet::new()),
            garbled_close: Mutex::new(HashSet::new()),
            without_factors: Mutex::new(HashSet::new()),
            close_override: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            logins: Mutex::new(0),
        }
    }
}

impl ScriptedVendor {
    pub fn fail(&self, instrument: &InstrumentId) {
        self.failing.lock().insert(instrument.clone());
    }

    pub fn garble_close(&self, instrument: &InstrumentId) {
        self.garbled_close.lock().insert(instrument.clone());
    }

    pub fn drop_factors(&self, instrument: &InstrumentId) {
        self.without_factors.lock().insert(instrument.clone());
    }

    pub fn restore_factors(&self, instrument: &InstrumentId) {
        self.without_factors.lock().remove(instrument);
    }

    pub fn override_close(&self, instrument: &InstrumentId, close: &str) {
        self.close_override
            .lock()
            .insert(instrument.clone(), close.to_string());
    }

    pub fn calls(&self) -> Vec<(InstrumentId, FetchWindow, Instant)> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, instrument: &InstrumentId) -> Vec<FetchWindow> {
        self.calls
            .lock()
            .iter()
            .filter(|(id, _, _)| id == instrument)
            .map(|(_, w, _)| *w)
            .collect()
    }

    pub fn logins(&self) -> u32 {
        *self.logins.lock()
    }

    fn row(&self, instrument: &InstrumentId, day: NaiveDate) -> RawRow {
        let close = if self.garbled_close.lock().contains(instrument) {
            json!("n/a")
        } else if let Some(close) = self.close_override.lock().get(instrument) {
            json!(close)
        } else {
            json!(format!("{}.50", 100 + day.ordinal()))
        };

        let mut row: RawRow = HashMap::new();
        row.insert("date".to_string(), json!(day.format("%Y-%m-%d").to_string()));
        row.insert("code".to_string(), json!(instrument.dotted()));
        row.insert("open".to_string(), json!("100.00"));
        row.insert("high".to_string(), json!("101.00"));
        row.insert("low".to_string(), json!("99.00"));
        row.insert("close".to_string(), close);
        row.insert("volume".to_string(), json!("1200300"));
        row.insert("adjustflag".to_string(), json!("3"));
        if !self.without_factors.lock().contains(instrument) {
            row.insert("peTTM".to_string(), json!("28.41"));
            row.insert("pbMRQ".to_string(), json!("9.87"));
        }
        row
    }
}

#[async_trait]
impl VendorClient for ScriptedVendor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn login(&self) -> Result<(), VendorError> {
        *self.logins.lock() += 1;
        Ok(())
    }

    async fn logout(&self) -> Result<(), VendorError> {
        Ok(())
    }

    async fn query_daily(
        &self,
        instrument: &InstrumentId,
        window: FetchWindow,
    ) -> Result<Vec<RawRow>, VendorError> {
        self.calls
            .lock()
            .push((instrument.clone(), window, Instant::now()));
        if self.failing.lock().contains(instrument) {
            return Err(VendorError::Transport("connection reset by peer".to_string()));
        }
        let rows: Vec<RawRow> = self
            .calendar
            .trading_days_between(window.start(), window.end())
            .into_iter()
            .map(|day| self.row(instrument, day))
            .collect();
        if rows.is_empty() {
            return Err(VendorError::NoData);
        }
        Ok(rows)
    }
}

/// 需要實際 PostgreSQL 的測試使用
pub async fn setup_test_db() -> Option<PgPool> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    PgPool::connect(&database_url).await.ok()
}
