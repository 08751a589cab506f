// time_utils.rs
//
// 日期相關的工具函數。
// 供應商回傳的日期格式不一，這裡統一轉為 NaiveDate。

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

/// 可接受的日期格式
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d", "%Y%m%d"];

/// 解析日期字串，支援 `2024-03-01`、`2024/03/01`、`2024.03.01`、`20240301`
///
/// 帶時間部分的字串（如 `2024-03-01 00:00:00`）只取日期部分。
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed
        .split(|c: char| c == ' ' || c == 'T')
        .next()
        .unwrap_or(trimmed);
    if date_part.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// 從鬆散型別的 JSON 值解析日期
///
/// 整數形式僅接受 `YYYYMMDD`。
pub fn parse_date_value(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date(s),
        Value::Number(n) => n.as_u64().and_then(|v| parse_date(&v.to_string())),
        _ => None,
    }
}

/// 緊湊日期格式 `YYYYMMDD`，用於檔名
pub fn format_compact_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// 兩個時間點之間的毫秒數，結束早於開始時回傳 0
pub fn elapsed_ms(start: &DateTime<Utc>, end: &DateTime<Utc>) -> u64 {
    u64::try_from((*end - *start).num_milliseconds()).unwrap_or(0)
}
