//! 交易日曆
//!
//! 純函數式的交易日判斷：週末與休市日不開市，調休的週末交易日可經由
//! `extra_trading_days` 加入。所有方法都不需要外部狀態或預先初始化。

pub mod error;
pub mod holidays;

pub use error::CalendarError;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// 預設掃描上限（日曆天）
pub const DEFAULT_MAX_SCAN_DAYS: u32 = 30;

/// 調整方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustDirection {
    /// 往前找最近的交易日（含當日）
    Backward,
    /// 往後找最近的交易日（含當日）
    Forward,
    /// 距離最近者，等距時取往後
    Nearest,
}

impl fmt::Display for AdjustDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdjustDirection::Backward => "往前",
            AdjustDirection::Forward => "往後",
            AdjustDirection::Nearest => "前後",
        };
        f.write_str(s)
    }
}

/// 日期類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayKind {
    Trading,
    Weekend,
    Holiday,
}

#[derive(Debug, Clone)]
pub struct TradingCalendar {
    holidays: BTreeSet<NaiveDate>,
    extra_trading_days: BTreeSet<NaiveDate>,
    max_scan_days: u32,
}

impl Default for TradingCalendar {
    fn default() -> Self {
        Self::cn_exchange()
    }
}

impl TradingCalendar {
    /// 不含任何休市日，只依週末判斷
    pub fn weekdays_only() -> Self {
        Self {
            holidays: BTreeSet::new(),
            extra_trading_days: BTreeSet::new(),
            max_scan_days: DEFAULT_MAX_SCAN_DAYS,
        }
    }

    /// 滬深交易所日曆（內建休市表）
    pub fn cn_exchange() -> Self {
        Self::weekdays_only().with_holidays(holidays::cn_exchange_closures())
    }

    /// 以配置建立：內建休市表加上額外休市日與調休交易日
    pub fn from_config(config: &crate::config::CalendarConfig) -> Self {
        let base = if config.use_builtin_holidays {
            Self::cn_exchange()
        } else {
            Self::weekdays_only()
        };
        base.with_holidays(config.extra_holidays.iter().copied())
            .with_trading_days(config.extra_trading_days.iter().copied())
            .with_max_scan_days(config.max_scan_days)
    }

    pub fn with_holidays(mut self, days: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(days);
        self
    }

    /// 加入調休交易日（原本是週末但需開市）
    pub fn with_trading_days(mut self, days: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.extra_trading_days.extend(days);
        self
    }

    pub fn with_max_scan_days(mut self, max_scan_days: u32) -> Self {
        self.max_scan_days = max_scan_days;
        self
    }

    pub fn max_scan_days(&self) -> u32 {
        self.max_scan_days
    }

    pub fn day_kind(&self, date: NaiveDate) -> DayKind {
        if self.extra_trading_days.contains(&date) {
            return DayKind::Trading;
        }
        if self.holidays.contains(&date) {
            return DayKind::Holiday;
        }
        match date.weekday() {
            Weekday::Sat | Weekday::Sun => DayKind::Weekend,
            _ => DayKind::Trading,
        }
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        self.day_kind(date) == DayKind::Trading
    }

    /// 將日期調整至交易日；本身是交易日時原樣返回
    pub fn adjust_to_trading_day(
        &self,
        date: NaiveDate,
        direction: AdjustDirection,
    ) -> Result<NaiveDate, CalendarError> {
        let found = match direction {
            AdjustDirection::Backward => self.scan(date, false).map(|(d, _)| d),
            AdjustDirection::Forward => self.scan(date, true).map(|(d, _)| d),
            AdjustDirection::Nearest => {
                match (self.scan(date, true), self.scan(date, false)) {
                    (Some((fwd, fwd_dist)), Some((back, back_dist))) => {
                        Some(if fwd_dist <= back_dist { fwd } else { back })
                    }
                    (Some((fwd, _)), None) => Some(fwd),
                    (None, Some((back, _))) => Some(back),
                    (None, None) => None,
                }
            }
        };
        found.ok_or(CalendarError::NoTradingDayFound {
            date,
            direction,
            max_scan_days: self.max_scan_days,
        })
    }

    /// 不晚於 `date` 的最後一個交易日
    pub fn last_trading_day_on_or_before(&self, date: NaiveDate) -> Result<NaiveDate, CalendarError> {
        self.adjust_to_trading_day(date, AdjustDirection::Backward)
    }

    /// 嚴格早於 `date` 的前一個交易日
    pub fn previous_trading_day(&self, date: NaiveDate) -> Result<NaiveDate, CalendarError> {
        let start = date.pred_opt().ok_or(CalendarError::NoTradingDayFound {
            date,
            direction: AdjustDirection::Backward,
            max_scan_days: self.max_scan_days,
        })?;
        self.adjust_to_trading_day(start, AdjustDirection::Backward)
    }

    /// 嚴格晚於 `date` 的下一個交易日
    pub fn next_trading_day(&self, date: NaiveDate) -> Result<NaiveDate, CalendarError> {
        let start = date.succ_opt().ok_or(CalendarError::NoTradingDayFound {
            date,
            direction: AdjustDirection::Forward,
            max_scan_days: self.max_scan_days,
        })?;
        self.adjust_to_trading_day(start, AdjustDirection::Forward)
    }

    /// 從 `end`（先往前調整至交易日）再往前數 `n` 個交易日
    pub fn trading_days_back(&self, end: NaiveDate, n: u32) -> Result<NaiveDate, CalendarError> {
        let mut current = self.last_trading_day_on_or_before(end)?;
        for _ in 0..n {
            current = self.previous_trading_day(current)?;
        }
        Ok(current)
    }

    /// 列舉閉區間內所有交易日；`start > end` 時為空
    pub fn trading_days_between(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        if start > end {
            return Vec::new();
        }
        start
            .iter_days()
            .take_while(|d| *d <= end)
            .filter(|d| self.is_trading_day(*d))
            .collect()
    }

    /// 單向掃描，回傳找到的交易日與距離
    fn scan(&self, date: NaiveDate, forward: bool) -> Option<(NaiveDate, u32)> {
        (0..=self.max_scan_days).find_map(|offset| {
            let days = Days::new(u64::from(offset));
            let candidate = if forward {
                date.checked_add_days(days)
            } else {
                date.checked_sub_days(days)
            }?;
            self.is_trading_day(candidate).then_some((candidate, offset))
        })
    }
}
