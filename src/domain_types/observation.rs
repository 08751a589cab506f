//! 日線觀測記錄
//!
//! 一筆記錄以 (標的, 交易日) 為自然鍵，其餘欄位皆為可缺省的數值。
//! 缺省與零值是不同的語義：缺省欄位在寫入時不會覆蓋資料庫既有值。

use super::instrument::InstrumentId;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 規範化欄位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationField {
    Open,
    High,
    Low,
    Close,
    PreClose,
    Volume,
    Amount,
    ChangePercent,
    TurnoverRate,
    TradeStatus,
    PeTtm,
    Pb,
    PsTtm,
    PcfTtm,
}

impl ObservationField {
    pub const ALL: [ObservationField; 14] = [
        ObservationField::Open,
        ObservationField::High,
        ObservationField::Low,
        ObservationField::Close,
        ObservationField::PreClose,
        ObservationField::Volume,
        ObservationField::Amount,
        ObservationField::ChangePercent,
        ObservationField::TurnoverRate,
        ObservationField::TradeStatus,
        ObservationField::PeTtm,
        ObservationField::Pb,
        ObservationField::PsTtm,
        ObservationField::PcfTtm,
    ];

    /// 估值因子欄位
    pub const FACTORS: [ObservationField; 4] = [
        ObservationField::PeTtm,
        ObservationField::Pb,
        ObservationField::PsTtm,
        ObservationField::PcfTtm,
    ];

    /// 規範化名稱（記錄內部使用的鍵）
    pub fn name(&self) -> &'static str {
        match self {
            ObservationField::Open => "open_price",
            ObservationField::High => "high_price",
            ObservationField::Low => "low_price",
            ObservationField::Close => "close_price",
            ObservationField::PreClose => "pre_close_price",
            ObservationField::Volume => "volume",
            ObservationField::Amount => "amount",
            ObservationField::ChangePercent => "change_percent",
            ObservationField::TurnoverRate => "turnover_rate_f",
            ObservationField::TradeStatus => "trade_status",
            ObservationField::PeTtm => "pe_ttm",
            ObservationField::Pb => "pb",
            ObservationField::PsTtm => "ps_ttm",
            ObservationField::PcfTtm => "pcf_ttm",
        }
    }

    /// 可能的資料表欄位名稱，依優先順序排列
    pub fn column_candidates(&self) -> &'static [&'static str] {
        match self {
            ObservationField::Open => &["open_price", "open"],
            ObservationField::High => &["high_price", "high"],
            ObservationField::Low => &["low_price", "low"],
            ObservationField::Close => &["close_price", "close"],
            ObservationField::PreClose => &["pre_close_price", "pre_close"],
            ObservationField::Volume => &["volume"],
            ObservationField::Amount => &["amount"],
            ObservationField::ChangePercent => &["change_percent", "pct_change"],
            ObservationField::TurnoverRate => &["turnover_rate_f", "turnover_rate"],
            ObservationField::TradeStatus => &["trade_status"],
            ObservationField::PeTtm => &["pe_ttm"],
            ObservationField::Pb => &["pb"],
            ObservationField::PsTtm => &["ps_ttm"],
            ObservationField::PcfTtm => &["pcf_ttm"],
        }
    }

    /// 供應商欄位別名，依優先順序排列
    pub fn vendor_aliases(&self) -> &'static [&'static str] {
        match self {
            ObservationField::Open => &["open", "open_price"],
            ObservationField::High => &["high", "high_price"],
            ObservationField::Low => &["low", "low_price"],
            ObservationField::Close => &["close", "close_price"],
            ObservationField::PreClose => &["preclose", "pre_close", "pre_close_price"],
            ObservationField::Volume => &["volume", "vol"],
            ObservationField::Amount => &["amount"],
            ObservationField::ChangePercent => &["pctChg", "pct_chg", "change_percent"],
            ObservationField::TurnoverRate => &["turn", "turnover_rate_f", "turnover_rate"],
            ObservationField::TradeStatus => &["tradestatus", "trade_status"],
            ObservationField::PeTtm => &["peTTM", "pe_ttm", "pe"],
            ObservationField::Pb => &["pbMRQ", "pb_mrq", "pb"],
            ObservationField::PsTtm => &["psTTM", "ps_ttm", "ps"],
            ObservationField::PcfTtm => &["pcfNcfTTM", "pcf_ttm", "pcf"],
        }
    }

    pub fn is_factor(&self) -> bool {
        Self::FACTORS.contains(self)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }
}

impl fmt::Display for ObservationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 規範化觀測記錄
///
/// 鍵欄位以 `Option` 表示，由儲存層在寫入前統一檢查。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub symbol: Option<InstrumentId>,
    pub trade_date: Option<NaiveDate>,
    values: BTreeMap<String, Decimal>,
}

impl ObservationRecord {
    pub fn new(symbol: InstrumentId, trade_date: NaiveDate) -> Self {
        Self {
            symbol: Some(symbol),
            trade_date: Some(trade_date),
            values: BTreeMap::new(),
        }
    }

    /// 設定規範欄位；`None` 表示缺省並移除既有值
    pub fn set(&mut self, field: ObservationField, value: Option<Decimal>) {
        self.set_named(field.name(), value);
    }

    /// 設定擴充欄位（不在規範欄位表中的欄位）
    pub fn set_named(&mut self, name: &str, value: Option<Decimal>) {
        match value {
            Some(v) => {
                self.values.insert(name.to_string(), v);
            }
            None => {
                self.values.remove(name);
            }
        }
    }

    pub fn with(mut self, field: ObservationField, value: Decimal) -> Self {
        self.set(field, Some(value));
        self
    }

    pub fn get(&self, field: ObservationField) -> Option<Decimal> {
        self.values.get(field.name()).copied()
    }

    pub fn get_named(&self, name: &str) -> Option<Decimal> {
        self.values.get(name).copied()
    }

    /// 所有已填值的欄位
    pub fn values(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn field_count(&self) -> usize {
        self.values.len()
    }

    /// 自然鍵；任一部分缺失時回傳 `None`
    pub fn key(&self) -> Option<(&InstrumentId, NaiveDate)> {
        match (&self.symbol, self.trade_date) {
            (Some(symbol), Some(date)) => Some((symbol, date)),
            _ => None,
        }
    }

    pub fn has_factor(&self) -> bool {
        ObservationField::FACTORS
            .iter()
            .any(|f| self.values.contains_key(f.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> ObservationRecord {
        ObservationRecord::new(
            InstrumentId::parse("sh600519").unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        )
    }

    #[test]
    fn test_absent_is_not_zero() {
        let record = sample().with(ObservationField::Close, dec!(1700.5));
        assert_eq!(record.get(ObservationField::Close), Some(dec!(1700.5)));
        assert_eq!(record.get(ObservationField::Open), None);
        assert_eq!(record.field_count(), 1);
    }

    #[test]
    fn test_set_none_removes_value() {
        let mut record = sample().with(ObservationField::Pb, dec!(8.1));
        assert!(record.has_factor());
        record.set(ObservationField::Pb, None);
        assert!(!record.has_factor());
    }

    #[test]
    fn test_key_requires_both_components() {
        let mut record = sample();
        assert!(record.key().is_some());
        record.trade_date = None;
        assert!(record.key().is_none());
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in ObservationField::ALL {
            assert_eq!(ObservationField::from_name(field.name()), Some(field));
            assert_eq!(field.column_candidates()[0], field.name());
        }
    }
}
