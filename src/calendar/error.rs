use super::AdjustDirection;
use chrono::NaiveDate;
use thiserror::Error;

/// 交易日曆錯誤
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("在 {date} {direction} {max_scan_days} 天內找不到交易日")]
    NoTradingDayFound {
        date: NaiveDate,
        direction: AdjustDirection,
        max_scan_days: u32,
    },
}

impl CalendarError {
    pub fn kind(&self) -> &'static str {
        match self {
            CalendarError::NoTradingDayFound { .. } => "no_trading_day_found",
        }
    }
}
