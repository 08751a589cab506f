//! 增量抓取區間推算

use crate::calendar::{AdjustDirection, TradingCalendar};
use crate::domain_types::{FetchWindow, InstrumentId, SyncStream};
use crate::storage::ObservationStore;
use crate::sync::error::SyncError;
use chrono::{Days, NaiveDate};
use std::sync::Arc;
use tracing::debug;

/// 推算結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// 需要抓取的區間
    Fetch {
        window: FetchWindow,
        last: Option<NaiveDate>,
    },
    /// 資料已是最新
    NoWork {
        last: Option<NaiveDate>,
        target: NaiveDate,
    },
}

impl Resolution {
    pub fn has_work(&self) -> bool {
        matches!(self, Resolution::Fetch { .. })
    }

    pub fn window(&self) -> Option<FetchWindow> {
        match self {
            Resolution::Fetch { window, .. } => Some(*window),
            Resolution::NoWork { .. } => None,
        }
    }

    /// 推算時讀到的最後持久化日期
    pub fn last_persisted(&self) -> Option<NaiveDate> {
        match self {
            Resolution::Fetch { last, .. } | Resolution::NoWork { last, .. } => *last,
        }
    }
}

/// 依最後持久化日期與交易日曆推算最小抓取區間
///
/// 不寫入任何資料；兩次呼叫之間沒有寫入時結果相同。
pub struct IncrementalRangeResolver {
    calendar: Arc<TradingCalendar>,
    store: Arc<dyn ObservationStore>,
    stream: SyncStream,
    earliest_date: NaiveDate,
}

impl IncrementalRangeResolver {
    pub fn new(
        calendar: Arc<TradingCalendar>,
        store: Arc<dyn ObservationStore>,
        stream: SyncStream,
        earliest_date: NaiveDate,
    ) -> Self {
        Self {
            calendar,
            store,
            stream,
            earliest_date,
        }
    }

    pub fn stream(&self) -> SyncStream {
        self.stream
    }

    pub fn earliest_date(&self) -> NaiveDate {
        self.earliest_date
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub async fn resolve(
        &self,
        instrument: &InstrumentId,
        as_of: NaiveDate,
    ) -> Result<Resolution, SyncError> {
        let target = self
            .calendar
            .adjust_to_trading_day(as_of, AdjustDirection::Backward)?;
        let last = self.store.last_persisted_date(instrument, self.stream).await?;

        let candidate = match last {
            Some(last) if last >= target => {
                debug!(symbol = %instrument, %last, %target, "資料已是最新");
                return Ok(Resolution::NoWork {
                    last: Some(last),
                    target,
                });
            }
            Some(last) => match last.checked_add_days(Days::new(1)) {
                Some(next) => next,
                None => return Ok(Resolution::NoWork { last: Some(last), target }),
            },
            None => self.earliest_date,
        };

        // 起點晚於目標時不必再往後找交易日
        if candidate > target {
            return Ok(Resolution::NoWork { last, target });
        }

        let start = self
            .calendar
            .adjust_to_trading_day(candidate, AdjustDirection::Forward)?;
        if start > target {
            debug!(symbol = %instrument, %start, %target, "調整後起點晚於終點");
            return Ok(Resolution::NoWork { last, target });
        }

        let window = FetchWindow::new(start, target)?;
        debug!(
            symbol = %instrument,
            stream = %self.stream,
            last = ?last,
            %window,
            "推算抓取區間"
        );
        Ok(Resolution::Fetch { window, last })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::{ObservationField, ObservationRecord};
    use crate::storage::MemoryObservationStore;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn moutai() -> InstrumentId {
        InstrumentId::parse("sh600519").unwrap()
    }

    fn resolver(store: Arc<MemoryObservationStore>, stream: SyncStream) -> IncrementalRangeResolver {
        IncrementalRangeResolver::new(
            Arc::new(TradingCalendar::cn_exchange()),
            store,
            stream,
            d(2024, 1, 1),
        )
    }

    async fn seed(store: &MemoryObservationStore, date: NaiveDate, with_factor: bool) {
        let mut record =
            ObservationRecord::new(moutai(), date).with(ObservationField::Close, dec!(1700));
        if with_factor {
            record = record.with(ObservationField::PeTtm, dec!(28.5));
        }
        store.upsert(&[record]).await.unwrap();
        store.invalidate_cache(&moutai());
    }

    #[tokio::test]
    async fn test_empty_store_fetches_full_history() {
        let store = Arc::new(MemoryObservationStore::default());
        let resolution = resolver(store, SyncStream::Price)
            .resolve(&moutai(), d(2024, 3, 1))
            .await
            .unwrap();
        // 2024-01-01 元旦休市，起點順延到 1 月 2 日
        assert_eq!(
            resolution.window(),
            Some(FetchWindow::new(d(2024, 1, 2), d(2024, 3, 1)).unwrap())
        );
        assert_eq!(resolution.last_persisted(), None);
    }

    #[rstest]
    // 週六收盤後：目標退回週五
    #[case(d(2024, 3, 1), d(2024, 3, 2))]
    // 週五當天
    #[case(d(2024, 3, 1), d(2024, 3, 1))]
    // 春節整段休市
    #[case(d(2024, 2, 8), d(2024, 2, 16))]
    #[tokio::test]
    async fn test_current_data_needs_no_work(#[case] last: NaiveDate, #[case] as_of: NaiveDate) {
        let store = Arc::new(MemoryObservationStore::default());
        seed(&store, last, false).await;
        let resolution = resolver(store, SyncStream::Price)
            .resolve(&moutai(), as_of)
            .await
            .unwrap();
        assert_matches!(resolution, Resolution::NoWork { last: Some(l), .. } if l == last);
    }

    #[tokio::test]
    async fn test_gap_starts_after_last_trading_day() {
        let store = Arc::new(MemoryObservationStore::default());
        seed(&store, d(2024, 2, 8), false).await;
        let resolution = resolver(store, SyncStream::Price)
            .resolve(&moutai(), d(2024, 2, 25))
            .await
            .unwrap();
        // 2/9 至 2/17 休市，2/19 開市；2/25 為週日
        let window = resolution.window().unwrap();
        assert_eq!(window.start(), d(2024, 2, 19));
        assert_eq!(window.end(), d(2024, 2, 23));
        assert!(window.start() > d(2024, 2, 8));
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let store = Arc::new(MemoryObservationStore::default());
        seed(&store, d(2024, 2, 1), false).await;
        let resolver = resolver(store, SyncStream::Price);
        let first = resolver.resolve(&moutai(), d(2024, 3, 1)).await.unwrap();
        let second = resolver.resolve(&moutai(), d(2024, 3, 1)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_factor_stream_tracks_its_own_gap() {
        let store = Arc::new(MemoryObservationStore::default());
        seed(&store, d(2024, 2, 1), true).await;
        seed(&store, d(2024, 3, 1), false).await;

        let price = resolver(store.clone(), SyncStream::Price)
            .resolve(&moutai(), d(2024, 3, 1))
            .await
            .unwrap();
        assert!(!price.has_work());

        let factor = resolver(store, SyncStream::Factor)
            .resolve(&moutai(), d(2024, 3, 1))
            .await
            .unwrap();
        assert_eq!(factor.window().unwrap().start(), d(2024, 2, 2));
    }

    #[tokio::test]
    async fn test_earliest_date_after_target_is_no_work() {
        let store = Arc::new(MemoryObservationStore::default());
        let resolution = resolver(store, SyncStream::Price)
            .resolve(&moutai(), d(2023, 12, 29))
            .await
            .unwrap();
        assert_matches!(resolution, Resolution::NoWork { last: None, .. });
    }

    #[tokio::test]
    async fn test_unreachable_trading_day_is_calendar_error() {
        let store = Arc::new(MemoryObservationStore::default());
        let calendar = TradingCalendar::weekdays_only()
            .with_holidays((0..60).filter_map(|i| d(2024, 1, 1).checked_add_days(Days::new(i))))
            .with_max_scan_days(10);
        let resolver =
            IncrementalRangeResolver::new(Arc::new(calendar), store, SyncStream::Price, d(2020, 1, 1));
        let err = resolver.resolve(&moutai(), d(2024, 2, 15)).await.unwrap_err();
        assert_matches!(err, SyncError::Calendar(_));
        assert!(err.is_batch_fatal());
    }
}
