//! 呼叫間隔限制
//!
//! 保證任意兩次相鄰的供應商呼叫之間，前一次返回到後一次開始至少間隔
//! `min_interval`。時間戳的讀取與更新都在同一把鎖內完成。

use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// 等待至允許呼叫為止並取得許可
    ///
    /// 許可在被丟棄時記錄當下時間作為上一次呼叫的結束時間，
    /// 因此應在供應商呼叫返回後才丟棄。
    pub async fn acquire(&self) -> RatePermit<'_> {
        let guard = self.last_call.lock().await;
        let mut waited = Duration::ZERO;
        if let Some(last) = *guard {
            let ready_at = last + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                waited = ready_at - now;
                trace!(wait_ms = waited.as_millis() as u64, "等待呼叫間隔");
                tokio::time::sleep_until(ready_at).await;
            }
        }
        RatePermit { guard, waited }
    }

    /// 上一次呼叫結束的時間
    pub async fn last_call(&self) -> Option<Instant> {
        *self.last_call.lock().await
    }
}

/// 呼叫許可，持有期間其他呼叫者必須等待
#[derive(Debug)]
pub struct RatePermit<'a> {
    guard: MutexGuard<'a, Option<Instant>>,
    waited: Duration,
}

impl RatePermit<'_> {
    /// 取得許可前等待的時間
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

impl Drop for RatePermit<'_> {
    fn drop(&mut self) {
        *self.guard = Some(Instant::now());
    }
}
