//! 統一重試策略
//!
//! 所有供應商整合共用同一套依錯誤分類決定的重試與退避規則。

use super::vendor::VendorError;
use rand::Rng;
use std::time::Duration;

/// 錯誤訊息中出現這些關鍵字時視為傳輸或解碼問題
const TRANSPORT_KEYWORDS: [&str; 7] = [
    "utf",
    "codec",
    "decompress",
    "invalid",
    "timeout",
    "timed out",
    "connection",
];

/// 錯誤分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// 供應商回報無資料，不重試
    NoData,
    /// 傳輸或解碼問題，退避時間加倍
    Transport,
    /// 會話失效，重試前需重新登入
    Session,
    /// 其他供應商回報的錯誤
    Vendor,
}

impl FaultClass {
    pub fn classify(err: &VendorError) -> Self {
        match err {
            VendorError::NoData => FaultClass::NoData,
            VendorError::Transport(_) | VendorError::Decode(_) => FaultClass::Transport,
            VendorError::Session(_) => FaultClass::Session,
            VendorError::Vendor { message, .. } => {
                let lower = message.to_lowercase();
                if TRANSPORT_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
                    FaultClass::Transport
                } else {
                    FaultClass::Vendor
                }
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, FaultClass::NoData)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FaultClass::NoData => "no_data",
            FaultClass::Transport => "transport",
            FaultClass::Session => "session",
            FaultClass::Vendor => "vendor",
        }
    }
}

/// 重試策略
///
/// 第 `attempt` 次（從 0 起算）失敗後的等待時間為
/// `base * (attempt + 1) + jitter`，傳輸類錯誤再乘以 2。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(3), Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// `max_attempts` 為總嘗試次數，至少為 1
    pub fn new(max_attempts: u32, base: Duration, max_jitter: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max_jitter,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 第 `attempt` 次失敗後是否還能再試
    pub fn should_retry(&self, attempt: u32, class: FaultClass) -> bool {
        class.is_retryable() && attempt + 1 < self.max_attempts
    }

    /// 不含隨機抖動的等待時間
    pub fn base_delay(&self, attempt: u32, class: FaultClass) -> Duration {
        let wait = self.base.saturating_mul(attempt.saturating_add(1));
        match class {
            FaultClass::Transport => wait.saturating_mul(2),
            _ => wait,
        }
    }

    pub fn backoff(&self, attempt: u32, class: FaultClass) -> Duration {
        self.base_delay(attempt, class) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(VendorError::NoData, FaultClass::NoData)]
    #[case(VendorError::Transport("reset".into()), FaultClass::Transport)]
    #[case(VendorError::Decode("bad frame".into()), FaultClass::Transport)]
    #[case(VendorError::Session("not logged in".into()), FaultClass::Session)]
    #[case(VendorError::vendor("10002007", "'utf-8' codec can't decode"), FaultClass::Transport)]
    #[case(VendorError::vendor("10001001", "Error -3 while decompressing"), FaultClass::Transport)]
    #[case(VendorError::vendor("10004011", "Request Timeout"), FaultClass::Transport)]
    #[case(VendorError::vendor("10002001", "user quota exceeded"), FaultClass::Vendor)]
    fn test_classify(#[case] err: VendorError, #[case] expected: FaultClass) {
        assert_eq!(FaultClass::classify(&err), expected);
    }

    #[test]
    fn test_no_data_is_never_retried() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(0, FaultClass::NoData));
        assert!(policy.should_retry(0, FaultClass::Vendor));
        assert!(policy.should_retry(1, FaultClass::Vendor));
        assert!(!policy.should_retry(2, FaultClass::Vendor));
    }

    #[test]
    fn test_backoff_grows_and_doubles_for_transport() {
        let policy = RetryPolicy::new(3, Duration::from_secs(3), Duration::ZERO);
        assert_eq!(policy.backoff(0, FaultClass::Vendor), Duration::from_secs(3));
        assert_eq!(policy.backoff(1, FaultClass::Vendor), Duration::from_secs(6));
        assert_eq!(policy.backoff(1, FaultClass::Transport), Duration::from_secs(12));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_millis(50));
        for _ in 0..100 {
            let wait = policy.backoff(0, FaultClass::Vendor);
            assert!(wait >= Duration::from_millis(100));
            assert!(wait <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts(), 1);
    }
}
