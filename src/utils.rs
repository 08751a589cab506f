// utils.rs - 公共工具模組
//
// 日期解析與序列化輔助函數，供正規化器、配置與報告共用。

pub mod serde_helpers;
pub mod time_utils;

// 重新導出時間工具函數，使其可以通過 utils::function_name 直接訪問
pub use time_utils::{elapsed_ms, format_compact_date, parse_date, parse_date_value};
