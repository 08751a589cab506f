//! 抓取區間與同步資料流

use super::types::{DomainError, Result};
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 閉區間 `[start, end]`，建立時保證 `start <= end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl FetchWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(DomainError::InvalidWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// 區間涵蓋的日曆天數（含首尾）
    pub fn calendar_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// 依最大日曆天數切分為連續不重疊的子區間
    ///
    /// `max_days` 為 0 時視為不切分。
    pub fn split(&self, max_days: u32) -> Vec<FetchWindow> {
        if max_days == 0 || self.calendar_days() <= i64::from(max_days) {
            return vec![*self];
        }

        let mut chunks = Vec::new();
        let mut cursor = self.start;
        loop {
            let chunk_end = cursor
                .checked_add_days(Days::new(u64::from(max_days) - 1))
                .map_or(self.end, |d| d.min(self.end));
            chunks.push(FetchWindow {
                start: cursor,
                end: chunk_end,
            });
            match chunk_end.succ_opt() {
                Some(next) if chunk_end < self.end => cursor = next,
                _ => break,
            }
        }
        chunks
    }
}

impl fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// 同步資料流
///
/// 價格與估值因子共用同一實體列，但各自計算最後持久化日期。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStream {
    #[default]
    Price,
    Factor,
}

impl SyncStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStream::Price => "price",
            SyncStream::Factor => "factor",
        }
    }
}

impl fmt::Display for SyncStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStream {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "price" | "daily" => Ok(SyncStream::Price),
            "factor" | "valuation" => Ok(SyncStream::Factor),
            other => Err(DomainError::InvalidStream(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_rejects_inverted_window() {
        let err = FetchWindow::new(d(2024, 3, 2), d(2024, 3, 1)).unwrap_err();
        assert_matches!(err, DomainError::InvalidWindow { .. });
    }

    #[test]
    fn test_single_day_window() {
        let w = FetchWindow::new(d(2024, 3, 1), d(2024, 3, 1)).unwrap();
        assert_eq!(w.calendar_days(), 1);
        assert_eq!(w.split(10), vec![w]);
    }

    #[test]
    fn test_split_covers_window_without_overlap() {
        let w = FetchWindow::new(d(2024, 1, 1), d(2024, 1, 25)).unwrap();
        let chunks = w.split(10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].start(), d(2024, 1, 1));
        assert_eq!(chunks[0].end(), d(2024, 1, 10));
        assert_eq!(chunks[1].start(), d(2024, 1, 11));
        assert_eq!(chunks[2].end(), d(2024, 1, 25));
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end().succ_opt().unwrap(), pair[1].start());
        }
    }

    #[test]
    fn test_split_zero_means_no_split() {
        let w = FetchWindow::new(d(2005, 1, 4), d(2024, 3, 1)).unwrap();
        assert_eq!(w.split(0).len(), 1);
    }

    #[test]
    fn test_stream_from_str() {
        assert_eq!("PRICE".parse::<SyncStream>().unwrap(), SyncStream::Price);
        assert_eq!("factor".parse::<SyncStream>().unwrap(), SyncStream::Factor);
        assert!("minute".parse::<SyncStream>().is_err());
    }
}
