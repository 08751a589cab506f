// utils/serde_helpers.rs - 序列化與反序列化輔助函數
use super::time_utils::parse_date;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

/// 將空字符串反序列化為None
///
/// 在配置文件中，經常需要將空字符串解析為None以表示不存在的值，
/// 例如 `log.directory = ""` 表示不寫入日誌檔。
pub fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = Option::<String>::deserialize(deserializer)?;
    Ok(s.filter(|v| !v.trim().is_empty()))
}

/// 將日期字串列表反序列化為 `Vec<NaiveDate>`
///
/// 接受 [`parse_date`] 支援的所有格式，任一項無法解析即報錯。
pub fn date_list<'de, D>(deserializer: D) -> Result<Vec<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    raw.iter()
        .map(|s| {
            parse_date(s).ok_or_else(|| serde::de::Error::custom(format!("無效的日期: {}", s)))
        })
        .collect()
}
