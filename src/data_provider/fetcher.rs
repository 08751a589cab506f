//! 限速、重試與正規化的供應商抓取器

use super::error::FetchError;
use super::normalizer::RowNormalizer;
use super::rate_limiter::RateLimiter;
use super::retry::{FaultClass, RetryPolicy};
use super::vendor::{RawRow, VendorClient, VendorError};
use crate::config::VendorConfig;
use crate::domain_types::{FetchWindow, InstrumentId, ObservationRecord};
use crate::monitor::SyncMetrics;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 觀測資料來源
///
/// 批次協調器只依賴這個介面，方便以腳本化的來源替換真實供應商。
#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// 開啟會話
    async fn open(&self) -> Result<(), FetchError> {
        Ok(())
    }

    /// 關閉會話
    async fn close(&self) {}

    async fn fetch(
        &self,
        instrument: &InstrumentId,
        window: FetchWindow,
    ) -> Result<Vec<ObservationRecord>, FetchError>;
}

/// 抓取器設定
#[derive(Debug, Clone)]
pub struct FetcherSettings {
    pub min_interval: Duration,
    pub retry: RetryPolicy,
    /// 單次供應商呼叫涵蓋的最大日曆天數，0 表示不切分
    pub max_window_days: u32,
    pub clean_factors: bool,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(1500),
            retry: RetryPolicy::default(),
            max_window_days: 3650,
            clean_factors: true,
        }
    }
}

impl FetcherSettings {
    pub fn from_config(config: &VendorConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(config.min_interval_ms),
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.retry_base_ms),
                Duration::from_millis(config.jitter_ms),
            ),
            max_window_days: config.max_window_days,
            clean_factors: config.clean_factors,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Closed,
    Open,
    /// 發生過故障，下一次呼叫前需重新登入
    Stale,
}

pub struct RateLimitedFetcher<V> {
    client: V,
    limiter: RateLimiter,
    policy: RetryPolicy,
    normalizer: RowNormalizer,
    max_window_days: u32,
    session: Mutex<SessionState>,
}

impl<V: VendorClient> RateLimitedFetcher<V> {
    pub fn new(client: V, settings: FetcherSettings) -> Self {
        Self {
            client,
            limiter: RateLimiter::new(settings.min_interval),
            policy: settings.retry,
            normalizer: RowNormalizer::new(settings.clean_factors),
            max_window_days: settings.max_window_days,
            session: Mutex::new(SessionState::Closed),
        }
    }

    pub fn client(&self) -> &V {
        &self.client
    }

    pub fn is_open(&self) -> bool {
        *self.session.lock() != SessionState::Closed
    }

    /// 登入供應商
    ///
    /// 登入失敗時會話標記為待重新登入，後續抓取會在每次嘗試前再登入。
    pub async fn open(&self) -> Result<(), FetchError> {
        match self.login().await {
            Ok(()) => {
                info!(vendor = self.client.name(), "供應商會話已開啟");
                Ok(())
            }
            Err(err) => {
                *self.session.lock() = SessionState::Stale;
                warn!(vendor = self.client.name(), error = %err, "供應商登入失敗");
                Err(FetchError::FetchFailed {
                    attempts: 1,
                    last: err,
                })
            }
        }
    }

    /// 登出並關閉會話；登出失敗只記錄警告
    pub async fn close(&self) {
        let previous = std::mem::replace(&mut *self.session.lock(), SessionState::Closed);
        if previous == SessionState::Closed {
            return;
        }
        let _permit = self.limiter.acquire().await;
        match self.client.logout().await {
            Ok(()) => info!(vendor = self.client.name(), "供應商會話已關閉"),
            Err(err) => warn!(vendor = self.client.name(), error = %err, "供應商登出失敗"),
        }
    }

    /// 抓取並正規化區間內的觀測資料
    ///
    /// 過長的區間會切成多段，每段各自限速與重試；全部分段都沒有資料時回傳
    /// [`FetchError::NoData`]。
    pub async fn fetch(
        &self,
        instrument: &InstrumentId,
        window: FetchWindow,
    ) -> Result<Vec<ObservationRecord>, FetchError> {
        if !self.is_open() {
            return Err(FetchError::SessionClosed);
        }

        let mut rows = Vec::new();
        for chunk in window.split(self.max_window_days) {
            match self.fetch_chunk(instrument, chunk).await {
                Ok(chunk_rows) => rows.extend(chunk_rows),
                Err(FetchError::NoData) => {
                    debug!(symbol = %instrument, window = %chunk, "分段無資料");
                }
                Err(err) => return Err(err),
            }
        }
        if rows.is_empty() {
            return Err(FetchError::NoData);
        }

        let (records, stats) = self.normalizer.normalize(instrument, &rows);
        if records.is_empty() {
            warn!(
                symbol = %instrument,
                rows = stats.rows_in,
                "供應商回傳的資料列全部無效"
            );
            return Err(FetchError::NoData);
        }
        debug!(
            symbol = %instrument,
            window = %window,
            rows = stats.rows_in,
            records = records.len(),
            "抓取完成"
        );
        Ok(records)
    }

    async fn fetch_chunk(
        &self,
        instrument: &InstrumentId,
        chunk: FetchWindow,
    ) -> Result<Vec<RawRow>, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            match self.attempt_once(instrument, chunk).await {
                Ok(rows) if rows.is_empty() => return Err(FetchError::NoData),
                Ok(rows) => return Ok(rows),
                Err(VendorError::NoData) => return Err(FetchError::NoData),
                Err(err) => {
                    let class = FaultClass::classify(&err);
                    if matches!(class, FaultClass::Transport | FaultClass::Session) {
                        *self.session.lock() = SessionState::Stale;
                    }

                    if !self.policy.should_retry(attempt, class) {
                        SyncMetrics::record_fetch_failure(self.client.name());
                        warn!(
                            symbol = %instrument,
                            window = %chunk,
                            attempts = attempt + 1,
                            error = %err,
                            "重試耗盡"
                        );
                        return Err(FetchError::FetchFailed {
                            attempts: attempt + 1,
                            last: err,
                        });
                    }

                    let wait = self.policy.backoff(attempt, class);
                    SyncMetrics::record_retry(self.client.name(), class.as_str());
                    warn!(
                        symbol = %instrument,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts(),
                        fault = class.as_str(),
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "抓取失敗，等待後重試"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    /// 單次嘗試：必要時先重新登入，再查詢
    async fn attempt_once(
        &self,
        instrument: &InstrumentId,
        chunk: FetchWindow,
    ) -> Result<Vec<RawRow>, VendorError> {
        if *self.session.lock() == SessionState::Stale {
            debug!(vendor = self.client.name(), "重新登入供應商");
            self.login().await?;
        }

        let _permit = self.limiter.acquire().await;
        let started = Instant::now();
        let result = self.client.query_daily(instrument, chunk).await;
        SyncMetrics::record_vendor_call(
            self.client.name(),
            result.is_ok(),
            started.elapsed(),
        );
        result
    }

    async fn login(&self) -> Result<(), VendorError> {
        let result = {
            let _permit = self.limiter.acquire().await;
            self.client.login().await
        };
        if result.is_ok() {
            *self.session.lock() = SessionState::Open;
        }
        result
    }
}

#[async_trait]
impl<V: VendorClient> ObservationSource for RateLimitedFetcher<V> {
    async fn open(&self) -> Result<(), FetchError> {
        RateLimitedFetcher::open(self).await
    }

    async fn close(&self) {
        RateLimitedFetcher::close(self).await
    }

    async fn fetch(
        &self,
        instrument: &InstrumentId,
        window: FetchWindow,
    ) -> Result<Vec<ObservationRecord>, FetchError> {
        RateLimitedFetcher::fetch(self, instrument, window).await
    }
}
