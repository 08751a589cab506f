// data_provider.rs - 供應商資料抓取
//
// 供應商客戶端介面、限速與重試、資料列正規化。

pub mod csv_vendor;
pub mod error;
pub mod fetcher;
pub mod normalizer;
pub mod rate_limiter;
pub mod retry;
pub mod vendor;

pub use csv_vendor::CsvVendorClient;
pub use error::FetchError;
pub use fetcher::{FetcherSettings, ObservationSource, RateLimitedFetcher};
pub use normalizer::{NormalizeStats, RowNormalizer};
pub use rate_limiter::{RateLimiter, RatePermit};
pub use retry::{FaultClass, RetryPolicy};
pub use vendor::{RawRow, VendorClient, VendorError};
