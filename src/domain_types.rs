//! 領域類型定義
//!
//! 同步引擎內部流轉的核心資料結構：標的代碼、觀測記錄、抓取區間。

pub mod instrument;
pub mod observation;
pub mod types;
pub mod window;

pub use instrument::{InstrumentId, Market};
pub use observation::{ObservationField, ObservationRecord};
pub use types::{DomainError, Result};
pub use window::{FetchWindow, SyncStream};
